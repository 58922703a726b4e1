//! shardis-ring: consistent hashing and shard membership.
//!
//! The ring decides which shard owns a key; the registry decides which
//! node of that shard a command should go to.
//!
//! # Quick Start
//!
//! ```
//! use shardis_ring::{Access, HashRing, NodeAddr, ShardEndpoints, ShardRegistry};
//!
//! let mut ring = HashRing::new();
//! ring.add_targets(["alpha", "beta"]).unwrap();
//!
//! let mut registry = ShardRegistry::new();
//! registry.insert("alpha", ShardEndpoints::master(NodeAddr::new("10.0.0.1", 6379)));
//! registry.insert("beta", ShardEndpoints::master(NodeAddr::new("10.0.0.2", 6379)));
//!
//! let shard = ring.lookup("user:42").unwrap();
//! let node = registry.resolve(shard, Access::Write).unwrap();
//! assert_eq!(node.port, 6379);
//! ```

mod error;
mod hasher;
mod registry;
mod ring;

pub use error::{RegistryError, RingError};
pub use hasher::{Crc32Hasher, HasherKind, Md5Hasher, RingHasher};
pub use registry::{Access, NodeAddr, ShardEndpoints, ShardId, ShardRegistry};
pub use ring::{HashRing, DEFAULT_REPLICAS};
