//! Shard registry: which nodes back each shard.
//!
//! A shard has at most one master (reads and writes) and any number of
//! read-only slaves. The registry knows nothing about hashing; the ring
//! picks a shard id and the registry turns it into a node address.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rand::prelude::IndexedRandom;
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Opaque name of one logical shard.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShardId(String);

impl ShardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ShardId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ShardId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&ShardId> for ShardId {
    fn from(id: &ShardId) -> Self {
        id.clone()
    }
}

impl std::borrow::Borrow<str> for ShardId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Address of one store node, rendered as `host:port`.
///
/// Kept as a host string rather than a `SocketAddr` so hostnames are
/// resolved by the connector at connect time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeAddr {
    pub host: String,
    pub port: u16,
}

impl NodeAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeAddr {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RegistryError::InvalidAddr(s.to_owned());
        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;
        Ok(Self::new(host, port))
    }
}

impl Serialize for NodeAddr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeAddr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Whether a command reads or mutates its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Goes to a random slave, or the master if the shard has none.
    Read,
    /// Always goes to the master.
    Write,
}

/// The nodes backing one shard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardEndpoints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master: Option<NodeAddr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slaves: Vec<NodeAddr>,
}

impl ShardEndpoints {
    /// A shard served by a single master.
    pub fn master(addr: NodeAddr) -> Self {
        Self {
            master: Some(addr),
            slaves: Vec::new(),
        }
    }

    /// Adds a read-only slave.
    pub fn with_slave(mut self, addr: NodeAddr) -> Self {
        self.slaves.push(addr);
        self
    }
}

/// Every shard known to the router.
#[derive(Debug, Clone, Default)]
pub struct ShardRegistry {
    shards: BTreeMap<ShardId, ShardEndpoints>,
}

impl ShardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a shard.
    pub fn insert(&mut self, id: impl Into<ShardId>, endpoints: ShardEndpoints) {
        self.shards.insert(id.into(), endpoints);
    }

    /// Removes a shard, returning its endpoints.
    pub fn remove(&mut self, id: &str) -> Option<ShardEndpoints> {
        self.shards.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&ShardEndpoints> {
        self.shards.get(id)
    }

    /// Shard ids in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &ShardId> {
        self.shards.keys()
    }

    pub fn len(&self) -> usize {
        self.shards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Returns the master address of a shard.
    pub fn master(&self, id: &ShardId) -> Result<&NodeAddr, RegistryError> {
        let endpoints = self
            .shards
            .get(id)
            .ok_or_else(|| RegistryError::UnknownShard(id.clone()))?;
        endpoints
            .master
            .as_ref()
            .ok_or_else(|| RegistryError::NoMaster(id.clone()))
    }

    /// Returns the node a command with the given access mode should use.
    ///
    /// Reads pick a slave uniformly at random and fall back to the master
    /// when the shard has no slaves.
    pub fn resolve(&self, id: &ShardId, access: Access) -> Result<&NodeAddr, RegistryError> {
        if access == Access::Read {
            let endpoints = self
                .shards
                .get(id)
                .ok_or_else(|| RegistryError::UnknownShard(id.clone()))?;
            if let Some(slave) = endpoints.slaves.choose(&mut rand::rng()) {
                return Ok(slave);
            }
        }
        self.master(id)
    }

    /// Every configured node, masters and slaves, without duplicates.
    pub fn all_nodes(&self) -> Vec<&NodeAddr> {
        let mut nodes: Vec<&NodeAddr> = Vec::new();
        for endpoints in self.shards.values() {
            for addr in endpoints.master.iter().chain(endpoints.slaves.iter()) {
                if !nodes.contains(&addr) {
                    nodes.push(addr);
                }
            }
        }
        nodes
    }
}

impl FromIterator<(ShardId, ShardEndpoints)> for ShardRegistry {
    fn from_iter<T: IntoIterator<Item = (ShardId, ShardEndpoints)>>(iter: T) -> Self {
        Self {
            shards: iter.into_iter().collect(),
        }
    }
}
