//! Pipelines and transactions spanning several nodes.
//!
//! A batch is an owned [`BatchContext`]: [`Router::begin_batch`] creates
//! it, [`Router::queue`] adds commands and [`Router::exec`] or
//! [`Router::discard`] consume it. Commands are buffered per node and only
//! sent on exec, each node receiving its own commands in call order.
//! Replies come back per node and are put back into call order by
//! matching each node's keys against the global call log.
//!
//! A transaction is atomic per node only. Replies are matched by key, so
//! one key must reach a single node within a batch. Mixing a read of a key
//! that goes to a slave with a write of it that goes to the master breaks
//! this, as does changing an override mid-batch. Either makes the reply
//! order ambiguous and is unsupported.

use bytes::Bytes;
use shardis_protocol::Frame;
use shardis_ring::NodeAddr;
use tracing::{debug, warn};

use crate::cmd::Cmd;
use crate::connection::Connector;
use crate::error::ClusterError;
use crate::router::Router;

/// How armed nodes run their buffered commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// Commands are written back to back; no isolation.
    Pipeline,
    /// Each node wraps its commands in MULTI/EXEC.
    Transaction,
}

#[derive(Debug)]
struct ArmedNode {
    addr: NodeAddr,
    keys: Vec<String>,
    commands: Vec<Vec<Bytes>>,
}

/// An open batch. See the module docs.
#[derive(Debug)]
pub struct BatchContext {
    mode: BatchMode,
    /// Hash key of every queued command, in call order.
    calls: Vec<String>,
    /// Nodes in the order they were first touched.
    nodes: Vec<ArmedNode>,
}

impl BatchContext {
    fn new(mode: BatchMode) -> Self {
        Self {
            mode,
            calls: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn mode(&self) -> BatchMode {
        self.mode
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Nodes with at least one queued command, in arm order.
    pub fn armed_nodes(&self) -> impl Iterator<Item = &NodeAddr> {
        self.nodes.iter().map(|n| &n.addr)
    }

    fn push(&mut self, addr: NodeAddr, key: String, args: Vec<Bytes>) {
        let node = match self.nodes.iter().position(|n| n.addr == addr) {
            Some(i) => &mut self.nodes[i],
            None => {
                debug!(node = %addr, "armed node for batch");
                self.nodes.push(ArmedNode {
                    addr,
                    keys: Vec::new(),
                    commands: Vec::new(),
                });
                let last = self.nodes.len() - 1;
                &mut self.nodes[last]
            }
        };
        node.keys.push(key.clone());
        node.commands.push(args);
        self.calls.push(key);
    }
}

/// Puts per-node results back into call order.
///
/// Each node's results are walked in step with the keys it was sent;
/// every (key, result) pair fills the first still-empty slot holding that
/// key in `calls`. Slots nothing matched are left null.
pub(crate) fn reassemble(calls: &[String], per_node: Vec<(Vec<String>, Vec<Frame>)>) -> Vec<Frame> {
    let mut slots: Vec<Option<Frame>> = vec![None; calls.len()];
    for (keys, results) in per_node {
        for (key, result) in keys.iter().zip(results) {
            let slot = calls
                .iter()
                .zip(slots.iter())
                .position(|(call, slot)| call == key && slot.is_none());
            if let Some(i) = slot {
                slots[i] = Some(result);
            }
        }
    }
    slots
        .into_iter()
        .map(|slot| slot.unwrap_or(Frame::Null))
        .collect()
}

impl<C: Connector> Router<C> {
    /// Opens a batch. No node is touched until a command is queued.
    pub fn begin_batch(&self, mode: BatchMode) -> BatchContext {
        BatchContext::new(mode)
    }

    /// Adds a command to the batch, opening its node's connection if
    /// needed.
    ///
    /// An error rejects only this command; the batch stays usable.
    pub async fn queue(&mut self, batch: &mut BatchContext, cmd: Cmd) -> Result<(), ClusterError> {
        let addr = self.resolve(cmd.key(), cmd.access())?;
        self.connection(&addr).await?;
        let key = self.hash_key(cmd.key()).to_owned();
        batch.push(addr, key, cmd.into_args());
        Ok(())
    }

    /// Runs every armed node's commands and returns the replies in the
    /// order the commands were queued.
    ///
    /// A node whose transaction was aborted by WATCH answers null at each
    /// of its positions. A node that can't be reached answers with an
    /// error frame at each of its positions; the other nodes still run.
    pub async fn exec(&mut self, batch: BatchContext) -> Result<Vec<Frame>, ClusterError> {
        let BatchContext { mode, calls, nodes } = batch;
        let mut per_node = Vec::with_capacity(nodes.len());
        for node in nodes {
            let results = match mode {
                BatchMode::Pipeline => self.pipeline_on(&node.addr, &node.commands).await,
                BatchMode::Transaction => self
                    .transaction_on(&node.addr, &node.commands)
                    .await
                    .map(|replies| {
                        replies.unwrap_or_else(|| {
                            debug!(node = %node.addr, "transaction aborted by a watched key");
                            vec![Frame::Null; node.commands.len()]
                        })
                    }),
            };
            let results = match results {
                Ok(results) => results,
                Err(e) => {
                    warn!(node = %node.addr, error = %e, "batch failed on node");
                    vec![Frame::Error(format!("ERR {e}")); node.commands.len()]
                }
            };
            per_node.push((node.keys, results));
        }
        Ok(reassemble(&calls, per_node))
    }

    /// Drops the batch. Nothing was sent for it, so no node needs telling.
    pub fn discard(&mut self, batch: BatchContext) {
        debug!(commands = batch.len(), "discarded batch");
    }

    /// Queues every command into a fresh pipeline and runs it. Any
    /// resolution error aborts the whole call before anything is sent.
    pub(crate) async fn run_pipeline(
        &mut self,
        commands: impl IntoIterator<Item = Cmd>,
    ) -> Result<Vec<Frame>, ClusterError> {
        let mut batch = self.begin_batch(BatchMode::Pipeline);
        for cmd in commands {
            if let Err(e) = self.queue(&mut batch, cmd).await {
                self.discard(batch);
                return Err(e);
            }
        }
        self.exec(batch).await
    }
}
