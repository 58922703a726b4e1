//! shardis: client-side sharding for a fleet of independent Redis-style
//! store nodes.
//!
//! Keys are placed on shards by a consistent-hash ring, each shard is a
//! master with optional read slaves, and the [`Router`] forwards every
//! command to the right node. Multi-key commands whose keys span shards
//! are emulated on the client (set algebra, sorted-set union and
//! intersection, renames, list moves) and are not atomic.
//!
//! # Quick Start
//!
//! ```no_run
//! use shardis::{ClusterConfig, Router};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClusterConfig::from_file("shardis.toml")?;
//! let mut router = Router::from_config(&config, config.tcp_connector())?;
//!
//! router.set("user:1", "ada").await?;
//! let name = router.get("user:1").await?;
//! println!("{name:?}");
//! # Ok(())
//! # }
//! ```
//!
//! [`MemoryCluster`] provides in-process store nodes that speak the same
//! command surface, for tests and demos.

pub mod algebra;
pub mod batch;
pub mod cmd;
pub mod config;
pub mod connection;
pub mod error;
pub mod memory;
pub mod notify;
pub mod router;

pub use algebra::SetOp;
pub use batch::{BatchContext, BatchMode};
pub use cmd::{access_for, Cmd, IntoArg};
pub use config::{ClusterConfig, ConfigError, NotificationConfig, DEFAULT_NOTIFICATION_KEY};
pub use connection::{Connection, ConnectionError, Connector, NodeConnection, TcpConnector};
pub use error::{ClusterError, StrandedKey};
pub use memory::{MemoryCluster, MemoryConnection, MemoryConnector};
pub use notify::{await_key_of_interest, ListChannel, NotificationChannel};
pub use router::{Aggregate, NodeReplies, Router, SortOptions, ZStoreOptions};

pub use shardis_protocol::Frame;
pub use shardis_ring::{
    Access, HashRing, HasherKind, NodeAddr, RingHasher, ShardEndpoints, ShardId, ShardRegistry,
};
