//! Set commands and cross-shard set algebra.

use bytes::Bytes;
use shardis_protocol::Frame;
use shardis_ring::Access;
use tracing::{debug, warn};

use super::Router;
use crate::algebra::SetOp;
use crate::cmd::{Cmd, IntoArg};
use crate::connection::Connector;
use crate::error::ClusterError;

impl<C: Connector> Router<C> {
    pub async fn sadd<I>(&mut self, key: &str, members: I) -> Result<Frame, ClusterError>
    where
        I: IntoIterator,
        I::Item: IntoArg,
    {
        self.call(Cmd::new("SADD", key).args(members)).await
    }

    pub async fn srem<I>(&mut self, key: &str, members: I) -> Result<Frame, ClusterError>
    where
        I: IntoIterator,
        I::Item: IntoArg,
    {
        self.call(Cmd::new("SREM", key).args(members)).await
    }

    pub async fn sismember(
        &mut self,
        key: &str,
        member: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("SISMEMBER", key).arg(member)).await
    }

    pub async fn scard(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("SCARD", key)).await
    }

    pub async fn smembers(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("SMEMBERS", key)).await
    }

    pub async fn spop(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("SPOP", key)).await
    }

    pub async fn srandmember(&mut self, key: &str) -> Result<Frame, ClusterError> {
        self.call(Cmd::new("SRANDMEMBER", key)).await
    }

    /// Moves `member` from `src` to `dst`.
    ///
    /// Across shards: checks membership, removes from `src`, then adds to
    /// `dst`. Returns 0 without touching anything when the member is
    /// absent.
    pub async fn smove(
        &mut self,
        src: &str,
        dst: &str,
        member: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        let member = member.into_arg();
        if self.shard_of(src)? == self.shard_of(dst)? {
            return self.call(Cmd::write("SMOVE", src).arg(dst).arg(member)).await;
        }

        let present = Self::integer(self.sismember(src, &member).await?)?;
        if present == 0 {
            return Ok(Frame::Integer(0));
        }
        let removed = Self::integer(self.srem(src, [&member]).await?)?;
        if removed == 0 {
            return Ok(Frame::Integer(0));
        }
        let lost = |detail: String| {
            warn!(src, dst, "member removed but not added");
            ClusterError::partial(
                "SMOVE",
                format!(
                    "removed {:?} from '{src}' but adding it to '{dst}' failed: {detail}",
                    String::from_utf8_lossy(&member)
                ),
                Vec::new(),
            )
        };
        match self.sadd(dst, [&member]).await {
            Ok(Frame::Error(msg)) => Err(lost(msg)),
            Ok(_) => Ok(Frame::Integer(1)),
            Err(e) => Err(lost(e.to_string())),
        }
    }

    pub async fn sinter<K: AsRef<str>>(&mut self, keys: &[K]) -> Result<Vec<Bytes>, ClusterError> {
        self.set_algebra(SetOp::Inter, keys).await
    }

    pub async fn sunion<K: AsRef<str>>(&mut self, keys: &[K]) -> Result<Vec<Bytes>, ClusterError> {
        self.set_algebra(SetOp::Union, keys).await
    }

    /// Members of the first set missing from every other.
    pub async fn sdiff<K: AsRef<str>>(&mut self, keys: &[K]) -> Result<Vec<Bytes>, ClusterError> {
        self.set_algebra(SetOp::Diff, keys).await
    }

    pub async fn sinterstore<K: AsRef<str>>(
        &mut self,
        dst: &str,
        keys: &[K],
    ) -> Result<i64, ClusterError> {
        self.set_algebra_store(SetOp::Inter, dst, keys).await
    }

    pub async fn sunionstore<K: AsRef<str>>(
        &mut self,
        dst: &str,
        keys: &[K],
    ) -> Result<i64, ClusterError> {
        self.set_algebra_store(SetOp::Union, dst, keys).await
    }

    pub async fn sdiffstore<K: AsRef<str>>(
        &mut self,
        dst: &str,
        keys: &[K],
    ) -> Result<i64, ClusterError> {
        self.set_algebra_store(SetOp::Diff, dst, keys).await
    }

    /// Computes a set operation, natively when every key shares a shard
    /// and from per-shard partial results otherwise.
    ///
    /// Partial results are fetched one shard at a time with no locking, so
    /// the combined result may mix states from different moments.
    pub async fn set_algebra<K: AsRef<str>>(
        &mut self,
        op: SetOp,
        keys: &[K],
    ) -> Result<Vec<Bytes>, ClusterError> {
        if keys.is_empty() {
            return Err(ClusterError::Reply(format!(
                "ERR wrong number of arguments for '{}' command",
                op.command().to_ascii_lowercase()
            )));
        }
        let groups = self.group_by_shard(keys)?;
        if groups.len() > 1 {
            debug!(op = op.command(), shards = groups.len(), "combining set partials client side");
        }

        let mut partials = Vec::with_capacity(groups.len());
        for (i, (_, group)) in groups.iter().enumerate() {
            let cmd = Cmd::read(op.fetch_command(i == 0), &group[0]).args(&group[1..]);
            let members = Self::members(self.call(cmd).await?)?;
            let empty = members.is_empty();
            partials.push(members);
            if empty && op.short_circuits_on_empty() {
                return Ok(Vec::new());
            }
        }
        Ok(op.combine(partials))
    }

    /// Stores a set operation's result in `dst`.
    ///
    /// When `dst` and every source share a shard the native store command
    /// runs there. Otherwise the result is computed with
    /// [`Router::set_algebra`] and written to `dst` with DEL + SADD inside
    /// one transaction on `dst`'s master. A failure while computing leaves
    /// `dst` untouched.
    pub async fn set_algebra_store<K: AsRef<str>>(
        &mut self,
        op: SetOp,
        dst: &str,
        keys: &[K],
    ) -> Result<i64, ClusterError> {
        let mut all: Vec<&str> = Vec::with_capacity(keys.len() + 1);
        all.push(dst);
        all.extend(keys.iter().map(|k| k.as_ref()));
        if !keys.is_empty() && self.group_by_shard(&all)?.len() == 1 {
            let cmd = Cmd::write(op.store_command(), dst).args(all[1..].iter().copied());
            return Self::integer(self.call(cmd).await?);
        }

        let members = self.set_algebra(op, keys).await?;
        let count = members.len();
        let mut commands = vec![vec![Bytes::from_static(b"DEL"), dst.into_arg()]];
        if !members.is_empty() {
            let mut sadd = vec![Bytes::from_static(b"SADD"), dst.into_arg()];
            sadd.extend(members);
            commands.push(sadd);
        }
        let addr = self.resolve(dst, Access::Write)?;
        let replies = self.transaction_on(&addr, &commands).await?.ok_or_else(|| {
            ClusterError::Reply(format!("transaction storing '{dst}' was aborted"))
        })?;
        if let Some(msg) = replies.iter().find_map(Frame::error_message) {
            return Err(ClusterError::Reply(msg.to_owned()));
        }
        Ok(count as i64)
    }

    fn members(frame: Frame) -> Result<Vec<Bytes>, ClusterError> {
        let frame = Self::check(frame)?;
        frame
            .into_bulk_list()
            .ok_or_else(|| ClusterError::Reply("expected a list of members".into()))
    }
}
