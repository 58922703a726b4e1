//! In-process store nodes.
//!
//! [`MemoryCluster`] holds a set of nodes that speak the subset of the
//! store's command surface the router relies on, including `MIGRATE`
//! between nodes of the same cluster. A replica address is an alias that
//! reads its master's data and refuses writes, which is enough to observe
//! read/write routing. Nodes can be marked down to exercise connection
//! failures. The most recent commands each node received are recorded so
//! tests can check where traffic went.
//!
//! Blocking pops never wait: they answer immediately, with null when
//! every list is empty, the same as a timeout.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use shardis_protocol::Frame;
use shardis_ring::{Access, NodeAddr, ShardRegistry};
use tracing::debug;

use crate::cmd::access_for;
use crate::connection::{ConnectionError, Connector, NodeConnection};

mod keyspace;

use keyspace::{bulk, glob_match, key, now_ms, ok, parse_int, upper, Keyspace};

/// Keyless commands a replica answers even though they aren't reads.
const REPLICA_SAFE: &[&str] = &["KEYS", "DBSIZE", "PING", "ECHO"];

/// Command lines kept across all nodes; older ones are dropped first.
const LOG_LIMIT: usize = 10_000;

#[derive(Debug)]
struct Node {
    keyspace: Keyspace,
    config: BTreeMap<String, String>,
    commands_processed: u64,
    last_save: u64,
}

impl Node {
    fn new() -> Self {
        let config = [("maxmemory", "0"), ("timeout", "0"), ("appendonly", "no")]
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Self {
            keyspace: Keyspace::default(),
            config,
            commands_processed: 0,
            last_save: now_ms() / 1000,
        }
    }
}

#[derive(Debug, Default)]
struct ClusterState {
    nodes: HashMap<NodeAddr, Node>,
    /// replica address -> master address
    replicas: HashMap<NodeAddr, NodeAddr>,
    down: HashSet<NodeAddr>,
    /// recent commands received, by the address they were sent to
    log: VecDeque<(NodeAddr, String)>,
    connects: usize,
}

impl ClusterState {
    fn is_known(&self, addr: &NodeAddr) -> bool {
        self.nodes.contains_key(addr) || self.replicas.contains_key(addr)
    }

    fn master_of<'a>(&'a self, addr: &'a NodeAddr) -> &'a NodeAddr {
        self.replicas.get(addr).unwrap_or(addr)
    }

    fn node_mut(&mut self, addr: &NodeAddr) -> Option<&mut Node> {
        let master = self.master_of(addr).clone();
        self.nodes.get_mut(&master)
    }

    /// Runs one command as received by `addr`.
    fn dispatch(&mut self, addr: &NodeAddr, args: &[Bytes]) -> Frame {
        let Some(first) = args.first() else {
            return Frame::Error("ERR empty command".into());
        };
        let name = upper(first);
        let rest = &args[1..];

        let line: Vec<String> = args.iter().map(key).collect();
        if self.log.len() == LOG_LIMIT {
            self.log.pop_front();
        }
        self.log.push_back((addr.clone(), line.join(" ")));

        let is_replica = self.replicas.contains_key(addr);
        let result = match name.as_str() {
            "PING" => Ok(rest
                .first()
                .map_or_else(|| Frame::Simple("PONG".into()), |m| Frame::Bulk(m.clone()))),
            "ECHO" if rest.len() == 1 => Ok(Frame::Bulk(rest[0].clone())),
            "AUTH" | "SELECT" | "WATCH" | "UNWATCH" | "MULTI" => Ok(ok()),
            "INFO" => Ok(self.info(addr, is_replica)),
            "CONFIG" => self.config(addr, rest),
            "LASTSAVE" => Ok(self
                .node_mut(addr)
                .map_or(Frame::Integer(0), |n| Frame::Integer(n.last_save as i64))),
            "MIGRATE" if is_replica => Err(readonly()),
            "MIGRATE" => self.migrate(addr, rest),
            _ if is_replica
                && access_for(&name) == Access::Write
                && !REPLICA_SAFE.contains(&name.as_str()) =>
            {
                Err(readonly())
            }
            _ => match self.node_mut(addr) {
                Some(node) => node.keyspace.execute(&name, rest),
                None => Err("ERR node is not part of the cluster".into()),
            },
        };

        if let Some(node) = self.node_mut(addr) {
            node.commands_processed += 1;
        }
        result.unwrap_or_else(Frame::Error)
    }

    fn info(&mut self, addr: &NodeAddr, is_replica: bool) -> Frame {
        let role = if is_replica { "slave" } else { "master" };
        let Some(node) = self.node_mut(addr) else {
            return Frame::Error("ERR node is not part of the cluster".into());
        };
        let keys = node.keyspace.len();
        let text = format!(
            "# Server\r\nrole:{role}\r\ntcp_port:{}\r\n\r\n# Stats\r\ntotal_commands_processed:{}\r\n\r\n# Keyspace\r\ndb0:keys={keys},expires=0\r\n",
            addr.port, node.commands_processed
        );
        bulk(&text)
    }

    /// CONFIG GET pattern | CONFIG SET name value | CONFIG RESETSTAT
    fn config(&mut self, addr: &NodeAddr, args: &[Bytes]) -> Result<Frame, String> {
        let Some(node) = self.node_mut(addr) else {
            return Err("ERR node is not part of the cluster".into());
        };
        let sub = args.first().map(upper).unwrap_or_default();
        match (sub.as_str(), args.len()) {
            ("GET", 2) => {
                let mut out = Vec::new();
                for (name, value) in &node.config {
                    if glob_match(&args[1], name.as_bytes()) {
                        out.push(bulk(name));
                        out.push(bulk(value));
                    }
                }
                Ok(Frame::Array(out))
            }
            ("SET", 3) => {
                node.config.insert(key(&args[1]), key(&args[2]));
                Ok(ok())
            }
            ("RESETSTAT", 1) => {
                node.commands_processed = 0;
                Ok(ok())
            }
            _ => Err("ERR syntax error in CONFIG command".into()),
        }
    }

    /// MIGRATE host port key db timeout [COPY] [REPLACE]
    fn migrate(&mut self, from: &NodeAddr, args: &[Bytes]) -> Result<Frame, String> {
        if args.len() < 5 {
            return Err("ERR wrong number of arguments for 'migrate' command".into());
        }
        let port = u16::try_from(parse_int(&args[1])?).map_err(|_| "ERR invalid port")?;
        let target = NodeAddr::new(key(&args[0]), port);
        let name = key(&args[2]);
        parse_int(&args[4])?;

        let mut copy = false;
        let mut replace = false;
        for opt in &args[5..] {
            match upper(opt).as_str() {
                "COPY" => copy = true,
                "REPLACE" => replace = true,
                _ => return Err(keyspace::SYNTAX.into()),
            }
        }

        let target = self.master_of(&target).clone();
        if !self.nodes.contains_key(&target) || self.down.contains(&target) {
            return Err("IOERR error or timeout connecting to the client".into());
        }
        let source = self.master_of(from).clone();
        if source == target {
            return Err("ERR Target instance replied with error: source and target are the same node".into());
        }

        let Some(entry) = self.node_mut(&source).and_then(|n| n.keyspace.take(&name)) else {
            return Ok(Frame::Simple("NOKEY".into()));
        };
        let Some(dst) = self.nodes.get_mut(&target) else {
            return Err("IOERR error or timeout connecting to the client".into());
        };
        if !replace && dst.keyspace.contains(&name) {
            if let Some(src) = self.nodes.get_mut(&source) {
                src.keyspace.restore(&name, entry);
            }
            return Err("BUSYKEY Target key name already exists.".into());
        }
        dst.keyspace.restore(&name, entry.clone());
        if copy {
            if let Some(src) = self.nodes.get_mut(&source) {
                src.keyspace.restore(&name, entry);
            }
        }
        Ok(ok())
    }
}

fn readonly() -> String {
    "READONLY You can't write against a read only replica.".into()
}

/// A set of in-process store nodes. Cloning shares the same nodes.
#[derive(Debug, Clone, Default)]
pub struct MemoryCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a cluster with one node per master in the registry. Every
    /// slave becomes a replica of its shard's master.
    pub fn for_registry(registry: &ShardRegistry) -> Self {
        let cluster = Self::new();
        for id in registry.ids() {
            let Some(endpoints) = registry.get(id.as_str()) else {
                continue;
            };
            if let Some(master) = &endpoints.master {
                cluster.add_node(master.clone());
                for slave in &endpoints.slaves {
                    cluster.add_replica(slave.clone(), master.clone());
                }
            }
        }
        cluster
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Adds an empty node. Adding an existing address is a no-op.
    pub fn add_node(&self, addr: NodeAddr) {
        self.lock().nodes.entry(addr).or_insert_with(Node::new);
    }

    /// Makes `replica` an alias serving `master`'s data read-only.
    pub fn add_replica(&self, replica: NodeAddr, master: NodeAddr) {
        let mut state = self.lock();
        state.nodes.entry(master.clone()).or_insert_with(Node::new);
        state.replicas.insert(replica, master);
    }

    /// Marks a node unreachable (or reachable again). Open connections to
    /// it fail their next command.
    pub fn set_down(&self, addr: &NodeAddr, down: bool) {
        let mut state = self.lock();
        if down {
            state.down.insert(addr.clone());
        } else {
            state.down.remove(addr);
        }
    }

    pub fn connector(&self) -> MemoryConnector {
        MemoryConnector {
            cluster: self.clone(),
        }
    }

    /// Runs a command directly on a node, bypassing the router.
    pub fn execute<I, T>(&self, addr: &NodeAddr, args: I) -> Frame
    where
        I: IntoIterator<Item = T>,
        T: crate::cmd::IntoArg,
    {
        let args: Vec<Bytes> = args.into_iter().map(|a| a.into_arg()).collect();
        self.lock().dispatch(addr, &args)
    }

    /// Returns true if the node (or its master, for a replica) holds `key`.
    pub fn has_key(&self, addr: &NodeAddr, name: &str) -> bool {
        let mut state = self.lock();
        state
            .node_mut(addr)
            .is_some_and(|n| n.keyspace.contains(name))
    }

    /// Recent command lines received at `addr`, oldest first.
    pub fn commands_sent(&self, addr: &NodeAddr) -> Vec<String> {
        self.lock()
            .log
            .iter()
            .filter(|(a, _)| a == addr)
            .map(|(_, line)| line.clone())
            .collect()
    }

    /// Clears the command log.
    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    /// Number of successful connects so far.
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    fn run(&self, addr: &NodeAddr, args: &[Bytes]) -> Result<Frame, ConnectionError> {
        let mut state = self.lock();
        if state.down.contains(addr) {
            return Err(ConnectionError::Disconnected);
        }
        Ok(state.dispatch(addr, args))
    }

    /// Runs queued commands back to back under one lock, as EXEC does.
    fn run_all(
        &self,
        addr: &NodeAddr,
        commands: &[Vec<Bytes>],
    ) -> Result<Vec<Frame>, ConnectionError> {
        let mut state = self.lock();
        if state.down.contains(addr) {
            return Err(ConnectionError::Disconnected);
        }
        Ok(commands.iter().map(|args| state.dispatch(addr, args)).collect())
    }
}

/// Opens [`MemoryConnection`]s to the nodes of one [`MemoryCluster`].
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    cluster: MemoryCluster,
}

impl Connector for MemoryConnector {
    type Conn = MemoryConnection;

    async fn connect(&self, addr: &NodeAddr) -> Result<MemoryConnection, ConnectionError> {
        {
            let mut state = self.cluster.lock();
            if !state.is_known(addr) || state.down.contains(addr) {
                return Err(ConnectionError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    format!("{addr} refused the connection"),
                )));
            }
            state.connects += 1;
        }
        debug!(node = %addr, "memory node connected");
        Ok(MemoryConnection {
            cluster: self.cluster.clone(),
            addr: addr.clone(),
            queued: None,
            broken: false,
        })
    }
}

/// A connection to one in-process node.
///
/// Tracks MULTI state per connection. Queued commands run together on
/// EXEC; a command that fails at run time leaves an error at its position
/// and the rest still apply, as on a real node.
///
/// Like a dropped socket, a connection that saw its node go down stays
/// unusable even after the node comes back.
#[derive(Debug)]
pub struct MemoryConnection {
    cluster: MemoryCluster,
    addr: NodeAddr,
    queued: Option<Vec<Vec<Bytes>>>,
    broken: bool,
}

impl NodeConnection for MemoryConnection {
    async fn call(&mut self, args: &[Bytes]) -> Result<Frame, ConnectionError> {
        if self.broken {
            return Err(ConnectionError::Disconnected);
        }
        let reply = self.dispatch(args);
        if reply.is_err() {
            self.broken = true;
        }
        reply
    }
}

impl MemoryConnection {
    fn dispatch(&mut self, args: &[Bytes]) -> Result<Frame, ConnectionError> {
        let name = args.first().map(upper).unwrap_or_default();
        let in_multi = self.queued.is_some();
        match (name.as_str(), in_multi) {
            ("MULTI", true) => Ok(Frame::Error("ERR MULTI calls can not be nested".into())),
            ("MULTI", false) => {
                self.cluster.run(&self.addr, args)?;
                self.queued = Some(Vec::new());
                Ok(ok())
            }
            ("EXEC", false) => Ok(Frame::Error("ERR EXEC without MULTI".into())),
            ("EXEC", true) => {
                let queued = self.queued.take().unwrap_or_default();
                let results = self.cluster.run_all(&self.addr, &queued)?;
                Ok(Frame::Array(results))
            }
            ("DISCARD", false) => Ok(Frame::Error("ERR DISCARD without MULTI".into())),
            ("DISCARD", true) => {
                self.queued = None;
                Ok(ok())
            }
            ("WATCH", true) => Ok(Frame::Error("ERR WATCH inside MULTI is not allowed".into())),
            (_, true) => {
                if let Some(queue) = self.queued.as_mut() {
                    queue.push(args.to_vec());
                }
                Ok(Frame::Simple("QUEUED".into()))
            }
            (_, false) => self.cluster.run(&self.addr, args),
        }
    }
}
