//! Error types for routed operations.

use shardis_ring::{NodeAddr, RegistryError, RingError};

use crate::connection::ConnectionError;

/// A key left behind on a node it doesn't belong on by a cross-shard
/// protocol that stopped half way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrandedKey {
    /// Name the value is currently stored under.
    pub key: String,
    /// Node currently holding it.
    pub node: NodeAddr,
}

impl std::fmt::Display for StrandedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.key, self.node)
    }
}

/// Errors that can occur while routing a command through the cluster.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// Resolution failed: unknown shard, missing master, bad config.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A command needing every key on one node got keys from several shards.
    #[error("{command} keys span shards {first} and {second}; set a hash key override to colocate them")]
    CrossShard {
        command: &'static str,
        first: String,
        second: String,
    },

    /// Ring lookup or membership change failed.
    #[error(transparent)]
    Ring(#[from] RingError),

    /// The resolved node could not be reached.
    #[error("node {addr}: {source}")]
    Connection {
        addr: NodeAddr,
        #[source]
        source: ConnectionError,
    },

    /// The operation has no cluster-wide meaning and is not emulated.
    #[error("{0} is not supported by the cluster router")]
    Unsupported(&'static str),

    /// A node answered with an error reply inside a multi-step operation.
    #[error("{0}")]
    Reply(String),

    /// A multi-phase protocol stopped after mutating some shards.
    #[error(
        "{operation} partially applied: {detail}{}",
        stranded_suffix(.stranded)
    )]
    PartialFailure {
        operation: &'static str,
        detail: String,
        stranded: Vec<StrandedKey>,
    },
}

fn stranded_suffix(stranded: &[StrandedKey]) -> String {
    if stranded.is_empty() {
        return String::new();
    }
    let keys: Vec<String> = stranded.iter().map(ToString::to_string).collect();
    format!(" (stranded: {})", keys.join(", "))
}

impl ClusterError {
    /// Creates a connection error for the given node.
    pub fn connection(addr: &NodeAddr, source: ConnectionError) -> Self {
        ClusterError::Connection {
            addr: addr.clone(),
            source,
        }
    }

    /// Creates a partial-failure error.
    pub fn partial(
        operation: &'static str,
        detail: impl Into<String>,
        stranded: Vec<StrandedKey>,
    ) -> Self {
        ClusterError::PartialFailure {
            operation,
            detail: detail.into(),
            stranded,
        }
    }

    /// Returns true for errors caused by cluster setup rather than by a
    /// node: resolution failures and cross-shard key sets.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ClusterError::Configuration(_) | ClusterError::CrossShard { .. } | ClusterError::Ring(_)
        )
    }

    /// Returns true if a multi-phase protocol left the cluster half-changed.
    pub fn is_partial_failure(&self) -> bool {
        matches!(self, ClusterError::PartialFailure { .. })
    }

    /// Keys stranded by a partial failure. Empty for every other error.
    pub fn stranded(&self) -> &[StrandedKey] {
        match self {
            ClusterError::PartialFailure { stranded, .. } => stranded,
            _ => &[],
        }
    }
}

impl From<RegistryError> for ClusterError {
    fn from(e: RegistryError) -> Self {
        ClusterError::Configuration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_failure_lists_stranded_keys() {
        let err = ClusterError::partial(
            "ZUNIONSTORE",
            "migrate back failed",
            vec![StrandedKey {
                key: "scores:for:zunion:tmp".into(),
                node: NodeAddr::new("10.0.0.2", 6379),
            }],
        );
        assert!(err.is_partial_failure());
        assert_eq!(
            err.to_string(),
            "ZUNIONSTORE partially applied: migrate back failed \
             (stranded: scores:for:zunion:tmp@10.0.0.2:6379)"
        );
        assert_eq!(err.stranded().len(), 1);
    }

    #[test]
    fn registry_errors_are_configuration() {
        let err: ClusterError = RegistryError::NoMaster("a".into()).into();
        assert!(err.is_configuration());
        assert_eq!(
            err.to_string(),
            "configuration error: shard 'a' has no master configured"
        );
    }

    #[test]
    fn cross_shard_is_configuration() {
        let err = ClusterError::CrossShard {
            command: "BITOP",
            first: "alpha".into(),
            second: "beta".into(),
        };
        assert!(err.is_configuration());
        assert!(!err.is_partial_failure());
        assert!(err.stranded().is_empty());
    }

    #[test]
    fn unsupported_message() {
        assert_eq!(
            ClusterError::Unsupported("PUBLISH").to_string(),
            "PUBLISH is not supported by the cluster router"
        );
    }
}
