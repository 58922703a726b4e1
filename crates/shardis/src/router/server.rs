//! Server-wide commands, transactions guards and the operations a
//! sharded client can't offer.

use bytes::Bytes;
use rand::seq::IteratorRandom;
use shardis_protocol::Frame;
use shardis_ring::{Access, ShardId};

use super::{NodeReplies, Router};
use crate::cmd::IntoArg;
use crate::connection::Connector;
use crate::error::ClusterError;

impl<C: Connector> Router<C> {
    /// KEYS on every node. Slaves answer with their master's keys, so a
    /// key usually shows up more than once across the replies.
    pub async fn keys(&mut self, pattern: &str) -> Result<NodeReplies, ClusterError> {
        self.broadcast(&["KEYS".into_arg(), pattern.into_arg()]).await
    }

    pub async fn dbsize(&mut self) -> Result<NodeReplies, ClusterError> {
        self.broadcast(&[Bytes::from_static(b"DBSIZE")]).await
    }

    pub async fn info(&mut self, section: Option<&str>) -> Result<NodeReplies, ClusterError> {
        let mut args = vec![Bytes::from_static(b"INFO")];
        args.extend(section.map(IntoArg::into_arg));
        self.broadcast(&args).await
    }

    pub async fn config_get(&mut self, pattern: &str) -> Result<NodeReplies, ClusterError> {
        self.broadcast(&["CONFIG".into_arg(), "GET".into_arg(), pattern.into_arg()])
            .await
    }

    pub async fn config_set(
        &mut self,
        name: &str,
        value: impl IntoArg,
    ) -> Result<NodeReplies, ClusterError> {
        let args = [
            "CONFIG".into_arg(),
            "SET".into_arg(),
            name.into_arg(),
            value.into_arg(),
        ];
        self.broadcast(&args).await
    }

    pub async fn config_resetstat(&mut self) -> Result<NodeReplies, ClusterError> {
        self.broadcast(&["CONFIG".into_arg(), "RESETSTAT".into_arg()])
            .await
    }

    pub async fn lastsave(&mut self) -> Result<NodeReplies, ClusterError> {
        self.broadcast(&[Bytes::from_static(b"LASTSAVE")]).await
    }

    /// A random key from a randomly chosen shard. Null when that shard is
    /// empty, even if others are not.
    pub async fn randomkey(&mut self) -> Result<Frame, ClusterError> {
        let shard: ShardId = self
            .registry
            .ids()
            .choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| ClusterError::Configuration("no shards configured".into()))?;
        let addr = self.registry.resolve(&shard, Access::Read)?.clone();
        self.call_on(&addr, &[Bytes::from_static(b"RANDOMKEY")]).await
    }

    /// WATCH each key on its shard's master.
    ///
    /// The watches only take effect for a transaction batch that uses the
    /// same connections, and a transaction batch spans one node, so keys
    /// watched on other shards never abort it.
    pub async fn watch<K: AsRef<str>>(&mut self, keys: &[K]) -> Result<(), ClusterError> {
        for key in keys {
            let key = key.as_ref();
            let addr = self.resolve(key, Access::Write)?;
            Self::check(self.call_on(&addr, &["WATCH".into_arg(), key.into_arg()]).await?)?;
        }
        Ok(())
    }

    /// UNWATCH on every open connection.
    pub async fn unwatch(&mut self) -> Result<(), ClusterError> {
        for addr in self.connected_nodes() {
            Self::check(self.call_on(&addr, &[Bytes::from_static(b"UNWATCH")]).await?)?;
        }
        Ok(())
    }

    pub fn publish(
        &mut self,
        _channel: &str,
        _message: impl IntoArg,
    ) -> Result<Frame, ClusterError> {
        Err(ClusterError::Unsupported("PUBLISH"))
    }

    pub fn subscribe(&mut self, _channels: &[&str]) -> Result<Frame, ClusterError> {
        Err(ClusterError::Unsupported("SUBSCRIBE"))
    }

    pub fn eval(
        &mut self,
        _script: &str,
        _keys: &[&str],
        _args: &[&str],
    ) -> Result<Frame, ClusterError> {
        Err(ClusterError::Unsupported("EVAL"))
    }

    pub fn evalsha(
        &mut self,
        _sha: &str,
        _keys: &[&str],
        _args: &[&str],
    ) -> Result<Frame, ClusterError> {
        Err(ClusterError::Unsupported("EVALSHA"))
    }

    pub fn script(&mut self, _subcommand: &str, _args: &[&str]) -> Result<Frame, ClusterError> {
        Err(ClusterError::Unsupported("SCRIPT"))
    }

    /// There is no single "last error" across many connections.
    pub fn last_error(&self) -> Result<Option<String>, ClusterError> {
        Err(ClusterError::Unsupported("last error"))
    }

    /// Key prefixes would change which shard a key hashes to.
    pub fn set_prefix(&mut self, _prefix: &str) -> Result<(), ClusterError> {
        Err(ClusterError::Unsupported("key prefix"))
    }

    pub fn unserialize(&self, _payload: &[u8]) -> Result<Frame, ClusterError> {
        Err(ClusterError::Unsupported("unserialize"))
    }
}
