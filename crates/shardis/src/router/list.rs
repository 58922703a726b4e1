//! List commands, including the notification-backed blocking pops.

use std::time::Duration;

use bytes::Bytes;
use shardis_protocol::Frame;
use shardis_ring::Access;
use tracing::warn;

use super::Router;
use crate::cmd::{Cmd, IntoArg};
use crate::connection::Connector;
use crate::error::ClusterError;
use crate::notify::{await_key_of_interest, timeout_secs, ListChannel, NotificationChannel};

impl<C: Connector> Router<C> {
    /// Opens the notification list on the node its key resolves to.
    async fn notification_channel(&mut self) -> Result<ListChannel<'_, C::Conn>, ClusterError> {
        let key = self.notifications.key.clone();
        let ttl_secs = self.notifications.ttl_secs;
        let addr = self.resolve(&key, Access::Write)?;
        let conn = self.connection(&addr).await?;
        Ok(ListChannel::new(conn, addr, key, ttl_secs))
    }

    /// Pushes one notification per element added to `key`.
    async fn notify_pushed(&mut self, key: &str, count: usize) -> Result<(), ClusterError> {
        let mut channel = self.notification_channel().await?;
        for _ in 0..count {
            channel.push(key).await?;
        }
        Ok(())
    }

    async fn push_and_notify(
        &mut self,
        command: &'static str,
        key: &str,
        values: Vec<Bytes>,
    ) -> Result<Frame, ClusterError> {
        let count = values.len();
        let reply = self.call(Cmd::new(command, key).args(values)).await?;
        if reply.is_error() {
            return Ok(reply);
        }
        if let Err(e) = self.notify_pushed(key, count).await {
            warn!(key, error = %e, "elements pushed but notification failed");
            return Err(ClusterError::partial(
                command,
                format!("pushed to '{key}' but the notification failed: {e}"),
                Vec::new(),
            ));
        }
        Ok(reply)
    }

    /// LPUSH, then announces each new element on the notification list so
    /// a multi-key blocking pop can pick it up.
    pub async fn lpush<I>(&mut self, key: &str, values: I) -> Result<Frame, ClusterError>
    where
        I: IntoIterator,
        I::Item: IntoArg,
    {
        let values = values.into_iter().map(IntoArg::into_arg).collect();
        self.push_and_notify("LPUSH", key, values).await
    }

    /// RPUSH with notifications, as [`Router::lpush`].
    pub async fn rpush<I>(&mut self, key: &str, values: I) -> Result<Frame, ClusterError>
    where
        I: IntoIterator,
        I::Item: IntoArg,
    {
        let values = values.into_iter().map(IntoArg::into_arg).collect();
        self.push_and_notify("RPUSH", key, values).await
    }

    /// Pushes only if the list exists. Sends no notification.
    pub async fn lpushx(&mut self, key: &str, value: impl IntoArg) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("LPUSHX", key).arg(value)).await
    }

    pub async fn rpushx(&mut self, key: &str, value: impl IntoArg) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("RPUSHX", key).arg(value)).await
    }

    pub async fn lpop(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("LPOP", key)).await
    }

    pub async fn rpop(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("RPOP", key)).await
    }

    pub async fn llen(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("LLEN", key)).await
    }

    pub async fn lindex(&mut self, key: &str, index: i64) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("LINDEX", key).arg(index)).await
    }

    pub async fn lset(
        &mut self,
        key: &str,
        index: i64,
        value: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("LSET", key).arg(index).arg(value)).await
    }

    pub async fn lrange(
        &mut self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("LRANGE", key).arg(start).arg(stop)).await
    }

    pub async fn ltrim(&mut self, key: &str, start: i64, stop: i64) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("LTRIM", key).arg(start).arg(stop)).await
    }

    /// Removes up to `count` occurrences of `value` (all when 0, from the
    /// tail when negative).
    pub async fn lrem(
        &mut self,
        key: &str,
        count: i64,
        value: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("LREM", key).arg(count).arg(value)).await
    }

    pub async fn linsert(
        &mut self,
        key: &str,
        before: bool,
        pivot: impl IntoArg,
        value: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        let position = if before { "BEFORE" } else { "AFTER" };
        self.call(Cmd::new("LINSERT", key).arg(position).arg(pivot).arg(value))
            .await
    }

    /// Pops from the tail of `src` and pushes onto the head of `dst`.
    ///
    /// Across shards this is an RPOP followed by a routed LPUSH. If the
    /// push fails the popped element is lost and a partial failure naming
    /// it is returned.
    pub async fn rpoplpush(&mut self, src: &str, dst: &str) -> Result<Frame, ClusterError> {
        if self.shard_of(src)? == self.shard_of(dst)? {
            return self.call(Cmd::write("RPOPLPUSH", src).arg(dst)).await;
        }
        match self.rpop(src).await? {
            Frame::Bulk(element) => {
                self.push_moved("RPOPLPUSH", src, dst, element.clone()).await?;
                Ok(Frame::Bulk(element))
            }
            other => Ok(other),
        }
    }

    /// Blocking form of [`Router::rpoplpush`].
    ///
    /// Across shards the pop waits on the notification list like
    /// [`Router::brpop`] does, then pushes to `dst`.
    pub async fn brpoplpush(
        &mut self,
        src: &str,
        dst: &str,
        timeout: Duration,
    ) -> Result<Frame, ClusterError> {
        if self.shard_of(src)? == self.shard_of(dst)? {
            let cmd = Cmd::write("BRPOPLPUSH", src).arg(dst).arg(timeout_secs(timeout));
            return self.call(cmd).await;
        }
        match self.brpop(&[src], timeout).await? {
            Some((_, element)) => {
                self.push_moved("BRPOPLPUSH", src, dst, element.clone()).await?;
                Ok(Frame::Bulk(element))
            }
            None => Ok(Frame::Null),
        }
    }

    /// Second half of a cross-shard move: pushes an element already
    /// removed from `src`.
    async fn push_moved(
        &mut self,
        command: &'static str,
        src: &str,
        dst: &str,
        element: Bytes,
    ) -> Result<(), ClusterError> {
        let lost = |detail: String| {
            warn!(src, dst, "element popped but not pushed");
            ClusterError::partial(
                command,
                format!(
                    "popped {:?} from '{src}' but pushing it to '{dst}' failed: {detail}",
                    String::from_utf8_lossy(&element)
                ),
                Vec::new(),
            )
        };
        match self.lpush(dst, [element.clone()]).await {
            Ok(Frame::Error(msg)) => Err(lost(msg)),
            Ok(_) => Ok(()),
            // the element made it into dst; only its notification is missing
            Err(e) if e.is_partial_failure() => Err(e),
            Err(e) => Err(lost(e.to_string())),
        }
    }

    /// Pops from the head of whichever of `keys` is announced next on the
    /// notification list.
    ///
    /// Returns `None` on timeout, and also when the announced key is not
    /// one of `keys`: that notification is consumed and dropped.
    pub async fn blpop<K: AsRef<str>>(
        &mut self,
        keys: &[K],
        timeout: Duration,
    ) -> Result<Option<(String, Bytes)>, ClusterError> {
        self.blocking_pop("LPOP", keys, timeout).await
    }

    /// Tail-popping form of [`Router::blpop`].
    pub async fn brpop<K: AsRef<str>>(
        &mut self,
        keys: &[K],
        timeout: Duration,
    ) -> Result<Option<(String, Bytes)>, ClusterError> {
        self.blocking_pop("RPOP", keys, timeout).await
    }

    async fn blocking_pop<K: AsRef<str>>(
        &mut self,
        pop: &'static str,
        keys: &[K],
        timeout: Duration,
    ) -> Result<Option<(String, Bytes)>, ClusterError> {
        let announced = {
            let mut channel = self.notification_channel().await?;
            await_key_of_interest(&mut channel, keys, timeout).await?
        };
        let Some(key) = announced else {
            return Ok(None);
        };
        match Self::check(self.call(Cmd::write(pop, &key)).await?)? {
            Frame::Bulk(value) => Ok(Some((key, value))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::router;
    use super::*;

    fn bulk(s: &str) -> Frame {
        Frame::Bulk(Bytes::copy_from_slice(s.as_bytes()))
    }

    /// Two keys forced onto different shards.
    fn split(router: &mut Router<crate::memory::MemoryConnector>) -> (&'static str, &'static str) {
        let (a, b) = ("left", "right");
        let mut pins = (0..1000).map(|i| format!("pin{i}"));
        let first = pins.next().unwrap_or_default();
        let first_shard = router.ring().lookup(&first).unwrap().clone();
        let other = pins
            .find(|p| *router.ring().lookup(p).unwrap() != first_shard)
            .unwrap();
        router.set_hash_key_overrides([(a, first), (b, other)]);
        (a, b)
    }

    #[tokio::test]
    async fn list_basics() {
        let (mut router, _cluster) = router();
        assert_eq!(router.rpush("l", ["a", "b", "c"]).await.unwrap(), Frame::Integer(3));
        assert_eq!(router.lpushx("l", "z").await.unwrap(), Frame::Integer(4));
        assert_eq!(router.lpushx("nope", "z").await.unwrap(), Frame::Integer(0));
        assert_eq!(router.llen("l").await.unwrap(), Frame::Integer(4));
        assert_eq!(router.lindex("l", -1).await.unwrap(), bulk("c"));
        assert!(router.lset("l", 0, "y").await.unwrap().is_ok());
        assert_eq!(
            router.lrange("l", 0, 1).await.unwrap(),
            Frame::Array(vec![bulk("y"), bulk("a")])
        );
        assert_eq!(router.linsert("l", true, "c", "b2").await.unwrap(), Frame::Integer(5));
        assert_eq!(router.lrem("l", 0, "b2").await.unwrap(), Frame::Integer(1));
        assert!(router.ltrim("l", 1, -1).await.unwrap().is_ok());
        assert_eq!(router.lpop("l").await.unwrap(), bulk("a"));
        assert_eq!(router.rpop("l").await.unwrap(), bulk("c"));
    }

    #[tokio::test]
    async fn pushes_announce_each_element() {
        let (mut router, cluster) = router();
        router.lpush("jobs", ["1", "2"]).await.unwrap();
        let queue = router.resolve("redis:cluster:queue", Access::Write).unwrap();
        assert_eq!(
            cluster.execute(&queue, ["LLEN", "redis:cluster:queue"]),
            Frame::Integer(2)
        );
    }

    #[tokio::test]
    async fn failed_push_sends_no_notification() {
        let (mut router, cluster) = router();
        router.set("s", "string").await.unwrap();
        assert!(router.lpush("s", ["x"]).await.unwrap().is_error());
        let queue = router.resolve("redis:cluster:queue", Access::Write).unwrap();
        assert_eq!(
            cluster.execute(&queue, ["LLEN", "redis:cluster:queue"]),
            Frame::Integer(0)
        );
    }

    #[tokio::test]
    async fn brpop_across_shards() {
        let (mut router, _cluster) = router();
        let (left, right) = split(&mut router);
        router.lpush(left, ["job"]).await.unwrap();

        let popped = router.brpop(&[left, right], Duration::from_secs(1)).await.unwrap();
        assert_eq!(popped, Some((left.to_string(), Bytes::from_static(b"job"))));
        assert_eq!(router.brpop(&[left, right], Duration::from_secs(1)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn unrelated_notification_is_dropped() {
        let (mut router, _cluster) = router();
        router.rpush("elsewhere", ["x"]).await.unwrap();
        router.rpush("mine", ["y"]).await.unwrap();

        assert_eq!(router.blpop(&["mine"], Duration::from_secs(1)).await.unwrap(), None);
        let popped = router.blpop(&["mine"], Duration::from_secs(1)).await.unwrap();
        assert_eq!(popped, Some(("mine".to_string(), Bytes::from_static(b"y"))));
        // the element behind the dropped notification is still there
        assert_eq!(router.llen("elsewhere").await.unwrap(), Frame::Integer(1));
    }

    #[tokio::test]
    async fn rpoplpush_across_shards() {
        let (mut router, _cluster) = router();
        let (src, dst) = split(&mut router);
        router.rpush(src, ["a", "b"]).await.unwrap();

        assert_eq!(router.rpoplpush(src, dst).await.unwrap(), bulk("b"));
        assert_eq!(router.lrange(dst, 0, -1).await.unwrap(), Frame::Array(vec![bulk("b")]));
        assert_eq!(router.llen(src).await.unwrap(), Frame::Integer(1));
        assert_eq!(router.rpoplpush("empty", dst).await.unwrap(), Frame::Null);
    }

    #[tokio::test]
    async fn lost_element_is_a_partial_failure() {
        let (mut router, cluster) = router();
        let (src, dst) = split(&mut router);
        router.rpush(src, ["a"]).await.unwrap();
        let dst_master = router.resolve(dst, Access::Write).unwrap();
        cluster.set_down(&dst_master, true);

        let err = router.rpoplpush(src, dst).await.unwrap_err();
        assert!(err.is_partial_failure());
        assert!(err.to_string().contains("\"a\""));
    }

    #[tokio::test]
    async fn brpoplpush_same_shard_is_native() {
        let (mut router, _cluster) = router();
        router.set_hash_key_overrides([("from", "p"), ("to", "p")]);
        router.rpush("from", ["x"]).await.unwrap();
        assert_eq!(
            router.brpoplpush("from", "to", Duration::from_secs(1)).await.unwrap(),
            bulk("x")
        );
        assert_eq!(router.lpop("to").await.unwrap(), bulk("x"));
    }
}
