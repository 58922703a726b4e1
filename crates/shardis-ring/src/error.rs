//! Error types for ring and registry operations.

use crate::ShardId;

/// Errors raised by ring mutations and lookups.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    /// `add_target` was called with an id that is already on the ring.
    #[error("target '{0}' already exists")]
    TargetExists(ShardId),

    /// `remove_target` was called with an id that is not on the ring.
    #[error("target '{0}' does not exist")]
    TargetMissing(ShardId),

    /// A lookup was attempted on a ring with no targets.
    #[error("no targets exist")]
    Empty,

    /// `lookup_list` was asked for zero targets.
    #[error("invalid count requested")]
    InvalidCount,
}

/// Errors raised while resolving a shard to a node address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The ring named a shard that the registry doesn't know.
    #[error("shard '{0}' is not in the registry")]
    UnknownShard(ShardId),

    /// A write was routed to a shard with no master configured.
    #[error("shard '{0}' has no master configured")]
    NoMaster(ShardId),

    /// An address string didn't parse as `host:port`.
    #[error("invalid node address '{0}': expected host:port")]
    InvalidAddr(String),
}
