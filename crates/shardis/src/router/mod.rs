//! Key routing and cross-shard emulation.
//!
//! [`Router`] maps each key to a shard through the hash ring, picks the
//! shard's master or one of its slaves depending on whether the command
//! writes, and forwards the command over a cached per-node connection.
//! Commands that touch several keys either run natively when all their
//! keys share a shard or fall back to a client-side protocol; those
//! protocols are not atomic across shards.
//!
//! The per-command methods live in submodules grouped by data type.

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use bytes::Bytes;
use shardis_protocol::Frame;
use shardis_ring::{Access, HashRing, HasherKind, NodeAddr, ShardEndpoints, ShardId, ShardRegistry};
use tracing::{debug, info};

use crate::cmd::{Cmd, IntoArg};
use crate::config::{ClusterConfig, NotificationConfig};
use crate::connection::{Connector, NodeConnection};
use crate::error::ClusterError;

mod hash;
mod keys;
mod list;
mod server;
mod set;
mod string;
mod zset;

pub use keys::SortOptions;
pub use zset::{Aggregate, ZStoreOptions};

/// Per-node replies of a broadcast command, keyed by `host:port`.
pub type NodeReplies = BTreeMap<String, Frame>;

/// Result of moving one key between nodes with MIGRATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Migrated {
    Moved,
    /// The source node didn't have the key.
    NoKey,
}

/// Routes commands to the shards of a cluster.
///
/// Every dispatching method takes `&mut self`: the router owns its
/// connection cache and runs each operation to completion before the
/// next one starts.
pub struct Router<C: Connector> {
    ring: HashRing<HasherKind>,
    registry: ShardRegistry,
    overrides: HashMap<String, String>,
    connector: C,
    connections: HashMap<NodeAddr, C::Conn>,
    migrate_timeout: Duration,
    notifications: NotificationConfig,
}

impl<C: Connector> Router<C> {
    pub fn new(ring: HashRing<HasherKind>, registry: ShardRegistry, connector: C) -> Self {
        Self {
            ring,
            registry,
            overrides: HashMap::new(),
            connector,
            connections: HashMap::new(),
            migrate_timeout: Duration::from_millis(5000),
            notifications: NotificationConfig::default(),
        }
    }

    /// Builds the ring and registry described by `config`.
    pub fn from_config(config: &ClusterConfig, connector: C) -> Result<Self, ClusterError> {
        config.validate()?;
        let ring = config.ring()?;
        Ok(Self::new(ring, config.registry(), connector)
            .with_migrate_timeout(config.migrate_timeout())
            .with_notifications(config.notifications.clone()))
    }

    pub fn with_migrate_timeout(mut self, timeout: Duration) -> Self {
        self.migrate_timeout = timeout;
        self
    }

    pub fn with_notifications(mut self, notifications: NotificationConfig) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn ring(&self) -> &HashRing<HasherKind> {
        &self.ring
    }

    pub fn registry(&self) -> &ShardRegistry {
        &self.registry
    }

    pub fn migrate_timeout(&self) -> Duration {
        self.migrate_timeout
    }

    /// Adds a shard to the ring and the registry.
    ///
    /// Keys whose ring position moves to the new shard are not migrated.
    pub fn add_shard(
        &mut self,
        id: impl Into<ShardId>,
        endpoints: ShardEndpoints,
    ) -> Result<(), ClusterError> {
        let id = id.into();
        if endpoints.master.is_none() {
            return Err(ClusterError::Configuration(format!(
                "shard '{id}' has no master configured"
            )));
        }
        self.ring.add_target(id.clone())?;
        info!(shard = %id, "shard added to ring");
        self.registry.insert(id, endpoints);
        Ok(())
    }

    /// Removes a shard from the ring and the registry, returning its
    /// endpoints. Cached connections to its nodes stay open.
    pub fn remove_shard(&mut self, id: &str) -> Result<ShardEndpoints, ClusterError> {
        self.ring.remove_target(id)?;
        info!(shard = %id, "shard removed from ring");
        self.registry
            .remove(id)
            .ok_or_else(|| ClusterError::Configuration(format!("unknown shard '{id}'")))
    }

    /// Replaces every hash-key override.
    ///
    /// A key with an override is placed on the ring by the override's
    /// value instead of its own name, so keys sharing an override always
    /// land on the same shard.
    pub fn set_hash_key_overrides<I, K, V>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.overrides = overrides
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
    }

    /// Sets or replaces the override for one key.
    pub fn set_hash_key_override(&mut self, key: impl Into<String>, hash_key: impl Into<String>) {
        self.overrides.insert(key.into(), hash_key.into());
    }

    /// The string used to place `key` on the ring.
    pub fn hash_key<'a>(&'a self, key: &'a str) -> &'a str {
        self.overrides.get(key).map_or(key, String::as_str)
    }

    pub fn shard_of(&self, key: &str) -> Result<ShardId, ClusterError> {
        Ok(self.ring.lookup(self.hash_key(key))?.clone())
    }

    /// The node that should serve `key` for the given access mode.
    pub fn resolve(&self, key: &str, access: Access) -> Result<NodeAddr, ClusterError> {
        let shard = self.shard_of(key)?;
        let addr = self.registry.resolve(&shard, access)?.clone();
        debug!(key, shard = %shard, node = %addr, ?access, "resolved key");
        Ok(addr)
    }

    pub(crate) fn master(&self, shard: &ShardId) -> Result<NodeAddr, ClusterError> {
        Ok(self.registry.master(shard)?.clone())
    }

    /// Groups keys by shard. Groups come in order of first appearance
    /// and keep the keys' relative order.
    pub(crate) fn group_by_shard<K: AsRef<str>>(
        &self,
        keys: &[K],
    ) -> Result<Vec<(ShardId, Vec<String>)>, ClusterError> {
        let mut groups: Vec<(ShardId, Vec<String>)> = Vec::new();
        for key in keys {
            let key = key.as_ref();
            let shard = self.shard_of(key)?;
            match groups.iter_mut().find(|(id, _)| *id == shard) {
                Some((_, members)) => members.push(key.to_owned()),
                None => groups.push((shard, vec![key.to_owned()])),
            }
        }
        Ok(groups)
    }

    /// Returns the one shard holding every key, or a cross-shard error
    /// naming the first two shards found.
    pub(crate) fn require_colocated<K: AsRef<str>>(
        &self,
        command: &'static str,
        keys: &[K],
    ) -> Result<ShardId, ClusterError> {
        let mut groups = self.group_by_shard(keys)?.into_iter();
        let Some((first, _)) = groups.next() else {
            return Err(ClusterError::Reply(format!(
                "ERR wrong number of arguments for '{}' command",
                command.to_ascii_lowercase()
            )));
        };
        match groups.next() {
            Some((second, _)) => Err(ClusterError::CrossShard {
                command,
                first: first.to_string(),
                second: second.to_string(),
            }),
            None => Ok(first),
        }
    }

    /// Returns the cached connection to `addr`, opening it on first use.
    pub(crate) async fn connection(
        &mut self,
        addr: &NodeAddr,
    ) -> Result<&mut C::Conn, ClusterError> {
        match self.connections.entry(addr.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let conn = self
                    .connector
                    .connect(addr)
                    .await
                    .map_err(|e| ClusterError::connection(addr, e))?;
                debug!(node = %addr, "opened node connection");
                Ok(entry.insert(conn))
            }
        }
    }

    /// Nodes with an open connection.
    pub fn connected_nodes(&self) -> Vec<NodeAddr> {
        let mut nodes: Vec<NodeAddr> = self.connections.keys().cloned().collect();
        nodes.sort();
        nodes
    }

    /// Routes one command by its key and access mode.
    pub async fn call(&mut self, cmd: Cmd) -> Result<Frame, ClusterError> {
        let addr = self.resolve(cmd.key(), cmd.access())?;
        self.call_on(&addr, cmd.as_args()).await
    }

    /// Sends one command to a specific node.
    ///
    /// Connections stay cached for the router's lifetime. One that fails
    /// keeps failing; the router never reconnects on its own.
    pub async fn call_on(
        &mut self,
        addr: &NodeAddr,
        args: &[Bytes],
    ) -> Result<Frame, ClusterError> {
        let conn = self.connection(addr).await?;
        conn.call(args).await.map_err(|e| ClusterError::connection(addr, e))
    }

    pub(crate) async fn pipeline_on(
        &mut self,
        addr: &NodeAddr,
        commands: &[Vec<Bytes>],
    ) -> Result<Vec<Frame>, ClusterError> {
        let conn = self.connection(addr).await?;
        conn.pipeline(commands).await.map_err(|e| ClusterError::connection(addr, e))
    }

    pub(crate) async fn transaction_on(
        &mut self,
        addr: &NodeAddr,
        commands: &[Vec<Bytes>],
    ) -> Result<Option<Vec<Frame>>, ClusterError> {
        let conn = self.connection(addr).await?;
        conn.transaction(commands).await.map_err(|e| ClusterError::connection(addr, e))
    }

    /// Sends one command to every configured node, masters and slaves.
    pub async fn broadcast(&mut self, args: &[Bytes]) -> Result<NodeReplies, ClusterError> {
        let nodes: Vec<NodeAddr> = self.registry.all_nodes().into_iter().cloned().collect();
        let mut replies = NodeReplies::new();
        for addr in nodes {
            let reply = self.call_on(&addr, args).await?;
            replies.insert(addr.to_string(), reply);
        }
        Ok(replies)
    }

    /// Moves `key` from one node to another with MIGRATE.
    pub(crate) async fn migrate(
        &mut self,
        from: &NodeAddr,
        to: &NodeAddr,
        key: &str,
        replace: bool,
    ) -> Result<Migrated, ClusterError> {
        let mut args = vec![
            Bytes::from_static(b"MIGRATE"),
            to.host.as_str().into_arg(),
            u32::from(to.port).into_arg(),
            key.into_arg(),
            Bytes::from_static(b"0"),
            (self.migrate_timeout.as_millis() as u64).into_arg(),
        ];
        if replace {
            args.push(Bytes::from_static(b"REPLACE"));
        }
        debug!(key, from = %from, to = %to, "migrating key");
        match self.call_on(from, &args).await? {
            Frame::Simple(s) if s == "NOKEY" => Ok(Migrated::NoKey),
            Frame::Error(msg) => Err(ClusterError::Reply(msg)),
            _ => Ok(Migrated::Moved),
        }
    }

    /// Fails with [`ClusterError::Reply`] if a node answered with an error.
    pub(crate) fn check(frame: Frame) -> Result<Frame, ClusterError> {
        match frame {
            Frame::Error(msg) => Err(ClusterError::Reply(msg)),
            other => Ok(other),
        }
    }

    pub(crate) fn integer(frame: Frame) -> Result<i64, ClusterError> {
        let frame = Self::check(frame)?;
        frame
            .as_integer()
            .ok_or_else(|| ClusterError::Reply(format!("expected an integer reply, got {frame:?}")))
    }
}

impl<C: Connector> std::fmt::Debug for Router<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("ring", &self.ring.to_string())
            .field("shards", &self.registry.len())
            .field("overrides", &self.overrides.len())
            .field("connections", &self.connections.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::connection::{ConnectionError, NodeConnection};
    use crate::memory::{MemoryCluster, MemoryConnection, MemoryConnector};

    pub(crate) fn addr(port: u16) -> NodeAddr {
        NodeAddr::new("mem", port)
    }

    /// Two shards: `a` on :1 with replica :2, `b` on :3.
    fn topology() -> (HashRing<HasherKind>, ShardRegistry) {
        let mut registry = ShardRegistry::new();
        registry.insert("a", ShardEndpoints::master(addr(1)).with_slave(addr(2)));
        registry.insert("b", ShardEndpoints::master(addr(3)));
        let mut ring = HashRing::with_hasher(HasherKind::Crc32, 64);
        ring.add_targets(["a", "b"]).unwrap();
        (ring, registry)
    }

    pub(crate) fn router() -> (Router<MemoryConnector>, MemoryCluster) {
        let (ring, registry) = topology();
        let cluster = MemoryCluster::for_registry(&registry);
        (Router::new(ring, registry, cluster.connector()), cluster)
    }

    /// In-memory nodes, except that `node` answers every `command` with an
    /// error reply.
    pub(crate) struct RefusingConnector {
        inner: MemoryConnector,
        node: NodeAddr,
        command: &'static str,
    }

    pub(crate) struct RefusingConnection {
        inner: MemoryConnection,
        refuse: Option<&'static str>,
    }

    impl NodeConnection for RefusingConnection {
        async fn call(&mut self, args: &[Bytes]) -> Result<Frame, ConnectionError> {
            if let (Some(command), Some(name)) = (self.refuse, args.first()) {
                if name.eq_ignore_ascii_case(command.as_bytes()) {
                    return Ok(Frame::Error(format!("ERR {command} refused")));
                }
            }
            self.inner.call(args).await
        }
    }

    impl Connector for RefusingConnector {
        type Conn = RefusingConnection;

        async fn connect(&self, addr: &NodeAddr) -> Result<RefusingConnection, ConnectionError> {
            Ok(RefusingConnection {
                inner: self.inner.connect(addr).await?,
                refuse: (*addr == self.node).then_some(self.command),
            })
        }
    }

    /// A second router over `cluster` with the same shards as [`router`],
    /// whose `node` refuses `command`.
    pub(crate) fn refusing_router(
        cluster: &MemoryCluster,
        node: &NodeAddr,
        command: &'static str,
    ) -> Router<RefusingConnector> {
        let (ring, registry) = topology();
        let connector = RefusingConnector {
            inner: cluster.connector(),
            node: node.clone(),
            command,
        };
        Router::new(ring, registry, connector)
    }

    #[tokio::test]
    async fn refusing_connector_only_hits_its_node() {
        let cluster = MemoryCluster::for_registry(&topology().1);
        let mut router = refusing_router(&cluster, &addr(1), "SET");
        let set = ["SET".into_arg(), "k".into_arg(), "v".into_arg()];
        assert!(router.call_on(&addr(1), &set).await.unwrap().is_error());
        assert!(router.call_on(&addr(3), &set).await.unwrap().is_ok());
        assert!(!cluster.has_key(&addr(1), "k"));
    }

    #[tokio::test]
    async fn overrides_place_keys() {
        let (mut router, _cluster) = router();
        router.set_hash_key_overrides([("x", "a"), ("y", "a")]);
        assert_eq!(router.hash_key("x"), "a");
        assert_eq!(router.hash_key("z"), "z");
        assert_eq!(router.shard_of("x").unwrap(), router.shard_of("y").unwrap());

        router.set_hash_key_overrides([("y", "b")]);
        assert_eq!(router.hash_key("x"), "x");
        router.set_hash_key_override("x", "b");
        assert_eq!(router.shard_of("x").unwrap(), router.shard_of("y").unwrap());
    }

    #[tokio::test]
    async fn reads_go_to_slave_and_writes_to_master() {
        let (mut router, cluster) = router();
        let key = "k";
        router.set_hash_key_override(key, "pin");
        let shard = router.shard_of(key).unwrap();
        let master = router.master(&shard).unwrap();

        router.call(Cmd::new("SET", key).arg("v")).await.unwrap();
        let reply = router.call(Cmd::new("GET", key)).await.unwrap();
        assert_eq!(reply, Frame::Bulk(Bytes::from_static(b"v")));

        let read_node = router.resolve(key, Access::Read).unwrap();
        assert_eq!(cluster.commands_sent(&master)[0], "SET k v");
        assert_eq!(cluster.commands_sent(&read_node).last().unwrap(), "GET k");
        if shard.as_str() == "a" {
            assert_eq!(read_node, addr(2));
        } else {
            assert_eq!(read_node, addr(3));
        }
    }

    #[tokio::test]
    async fn connections_are_cached() {
        let (mut router, cluster) = router();
        for i in 0..20 {
            router.call(Cmd::new("SET", format!("k{i}")).arg(i)).await.unwrap();
        }
        assert_eq!(cluster.connects(), 2);
        assert_eq!(router.connected_nodes(), vec![addr(1), addr(3)]);
    }

    #[tokio::test]
    async fn unreachable_node_fails_the_call() {
        let (mut router, cluster) = router();
        router.set_hash_key_override("k", "x");
        let master = router.resolve("k", Access::Write).unwrap();
        cluster.set_down(&master, true);
        let err = router.call(Cmd::new("SET", "k").arg("v")).await.unwrap_err();
        assert!(matches!(err, ClusterError::Connection { .. }));

        cluster.set_down(&master, false);
        assert!(router.call(Cmd::new("SET", "k").arg("v")).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn failed_connection_is_not_reopened() {
        let (mut router, cluster) = router();
        let master = router.resolve("k", Access::Write).unwrap();
        router.call(Cmd::new("SET", "k").arg("v")).await.unwrap();
        cluster.set_down(&master, true);
        assert!(router.call(Cmd::new("SET", "k").arg("v")).await.is_err());
        assert_eq!(router.connected_nodes(), [master.clone()]);

        cluster.set_down(&master, false);
        let err = router.call(Cmd::new("SET", "k").arg("w")).await.unwrap_err();
        assert!(matches!(err, ClusterError::Connection { ref addr, .. } if *addr == master));
        assert_eq!(cluster.connects(), 1);
    }

    #[tokio::test]
    async fn shard_membership() {
        let (mut router, cluster) = router();
        cluster.add_node(addr(5));
        router.add_shard("c", ShardEndpoints::master(addr(5))).unwrap();
        assert_eq!(router.ring().len(), 3);
        assert!(router.add_shard("c", ShardEndpoints::master(addr(5))).is_err());
        assert!(router
            .add_shard("d", ShardEndpoints::default())
            .unwrap_err()
            .is_configuration());

        let removed = router.remove_shard("c").unwrap();
        assert_eq!(removed.master, Some(addr(5)));
        assert!(router.remove_shard("c").is_err());
    }

    #[tokio::test]
    async fn colocation_check() {
        let (mut router, _cluster) = router();
        router.set_hash_key_overrides([("x", "pin"), ("y", "pin")]);
        assert!(router.require_colocated("BITOP", &["x", "y"]).is_ok());

        let a = (0..100).map(|i| format!("k{i}")).find(|k| router.shard_of(k).unwrap().as_str() == "a").unwrap();
        let b = (0..100).map(|i| format!("k{i}")).find(|k| router.shard_of(k).unwrap().as_str() == "b").unwrap();
        let err = router.require_colocated("BITOP", &[a.as_str(), b.as_str()]).unwrap_err();
        assert!(matches!(err, ClusterError::CrossShard { command: "BITOP", .. }));
    }

    #[tokio::test]
    async fn broadcast_reaches_every_node() {
        let (mut router, _cluster) = router();
        let replies = router.broadcast(&[Bytes::from_static(b"DBSIZE")]).await.unwrap();
        let nodes: Vec<&str> = replies.keys().map(String::as_str).collect();
        assert_eq!(nodes, ["mem:1", "mem:2", "mem:3"]);
        assert!(replies.values().all(|f| *f == Frame::Integer(0)));
    }
}
