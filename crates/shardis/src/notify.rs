//! Cross-shard notification channel for blocking pops.
//!
//! A blocking pop over keys that live on different shards can't block on
//! all of their nodes at once. Instead every routed LPUSH/RPUSH also
//! appends the pushed key's name to one auxiliary list, and a multi-key
//! blocking pop blocks on that list. Whoever dequeues a name owns the
//! notification; it is never put back.

use std::time::Duration;

use bytes::Bytes;
use shardis_protocol::Frame;
use shardis_ring::NodeAddr;
use tracing::{debug, warn};

use crate::cmd::IntoArg;
use crate::connection::NodeConnection;
use crate::error::ClusterError;

/// A queue of key names that became non-empty.
#[allow(async_fn_in_trait)]
pub trait NotificationChannel {
    /// Announces that `key` received an element.
    async fn push(&mut self, key: &str) -> Result<(), ClusterError>;

    /// Waits for the next announced key. `Duration::ZERO` waits forever.
    /// Returns `None` on timeout.
    async fn blocking_pop(&mut self, timeout: Duration) -> Result<Option<String>, ClusterError>;
}

/// The notification list stored on one node.
pub struct ListChannel<'a, N> {
    conn: &'a mut N,
    addr: NodeAddr,
    key: String,
    ttl_secs: u64,
}

impl<'a, N: NodeConnection> ListChannel<'a, N> {
    /// `addr` is the node `conn` talks to, used in error reports.
    pub fn new(conn: &'a mut N, addr: NodeAddr, key: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            conn,
            addr,
            key: key.into(),
            ttl_secs,
        }
    }
}

impl<N: NodeConnection> NotificationChannel for ListChannel<'_, N> {
    async fn push(&mut self, key: &str) -> Result<(), ClusterError> {
        let commands = [
            vec![Bytes::from_static(b"LPUSH"), self.key.as_str().into_arg(), key.into_arg()],
            vec![
                Bytes::from_static(b"EXPIRE"),
                self.key.as_str().into_arg(),
                self.ttl_secs.into_arg(),
            ],
        ];
        let replies = self
            .conn
            .pipeline(&commands)
            .await
            .map_err(|e| ClusterError::connection(&self.addr, e))?;
        if let Some(msg) = replies.iter().find_map(Frame::error_message) {
            return Err(ClusterError::Reply(msg.to_owned()));
        }
        Ok(())
    }

    async fn blocking_pop(&mut self, timeout: Duration) -> Result<Option<String>, ClusterError> {
        let args = [
            Bytes::from_static(b"BRPOP"),
            self.key.as_str().into_arg(),
            timeout_secs(timeout).into_arg(),
        ];
        let reply = self
            .conn
            .call(&args)
            .await
            .map_err(|e| ClusterError::connection(&self.addr, e))?;
        match reply {
            Frame::Null => Ok(None),
            Frame::Array(mut items) if items.len() == 2 => match items.pop() {
                Some(name) => name
                    .as_str()
                    .map(|s| Some(s.to_owned()))
                    .ok_or_else(|| ClusterError::Reply(format!("unexpected BRPOP item: {name:?}"))),
                None => Ok(None),
            },
            Frame::Error(msg) => Err(ClusterError::Reply(msg)),
            other => Err(ClusterError::Reply(format!("unexpected BRPOP reply: {other:?}"))),
        }
    }
}

/// Blocking commands take whole seconds and treat 0 as "forever", so any
/// non-zero wait shorter than a second becomes one second.
pub(crate) fn timeout_secs(timeout: Duration) -> u64 {
    match timeout.as_secs() {
        0 if timeout.subsec_nanos() > 0 => 1,
        secs => secs,
    }
}

/// Waits for one notification and returns it if it names one of `keys`.
///
/// A notification for any other key is consumed and dropped: the call
/// returns `None` straight away instead of waiting for the next one.
pub async fn await_key_of_interest<N, K>(
    channel: &mut N,
    keys: &[K],
    timeout: Duration,
) -> Result<Option<String>, ClusterError>
where
    N: NotificationChannel,
    K: AsRef<str>,
{
    let Some(name) = channel.blocking_pop(timeout).await? else {
        debug!("blocking pop timed out");
        return Ok(None);
    };
    if keys.iter().any(|k| k.as_ref() == name) {
        Ok(Some(name))
    } else {
        warn!(key = %name, "dropped notification for a key nobody is waiting on here");
        Ok(None)
    }
}
