//! Cluster configuration loaded from TOML.
//!
//! ```toml
//! replicas = 64
//! hasher = "crc32"
//! migrate_timeout_ms = 5000
//!
//! [notifications]
//! key = "redis:cluster:queue"
//! ttl_secs = 3600
//!
//! [shards.alpha]
//! master = "10.0.0.1:6379"
//! slaves = ["10.0.0.2:6379"]
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shardis_ring::{
    HashRing, HasherKind, NodeAddr, RingError, ShardEndpoints, ShardId, ShardRegistry,
    DEFAULT_REPLICAS,
};

use crate::connection::TcpConnector;
use crate::error::ClusterError;

/// Default auxiliary list used as the blocking-pop notification channel.
pub const DEFAULT_NOTIFICATION_KEY: &str = "redis:cluster:queue";

/// Errors raised while loading or checking a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<ConfigError> for ClusterError {
    fn from(e: ConfigError) -> Self {
        ClusterError::Configuration(e.to_string())
    }
}

/// Settings for the cross-shard notification list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_notification_key")]
    pub key: String,
    /// Expiry refreshed on the list after every push.
    #[serde(default = "default_notification_ttl")]
    pub ttl_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            key: default_notification_key(),
            ttl_secs: default_notification_ttl(),
        }
    }
}

fn default_notification_key() -> String {
    DEFAULT_NOTIFICATION_KEY.to_owned()
}

fn default_notification_ttl() -> u64 {
    3600
}

fn default_replicas() -> usize {
    DEFAULT_REPLICAS
}

fn default_migrate_timeout_ms() -> u64 {
    5000
}

/// Everything needed to build a router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Virtual nodes per shard on the hash ring.
    #[serde(default = "default_replicas")]
    pub replicas: usize,

    #[serde(default)]
    pub hasher: HasherKind,

    /// Timeout passed to MIGRATE by cross-shard renames and stores.
    #[serde(default = "default_migrate_timeout_ms")]
    pub migrate_timeout_ms: u64,

    /// Sent with AUTH on every new node connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub shards: BTreeMap<ShardId, ShardEndpoints>,
}

impl Default for ClusterConfig {
    /// A two-shard template pointing at local nodes.
    fn default() -> Self {
        let local = |port| NodeAddr::new("127.0.0.1", port);
        let mut shards = BTreeMap::new();
        shards.insert(
            ShardId::from("alpha"),
            ShardEndpoints::master(local(6379)).with_slave(local(6380)),
        );
        shards.insert(ShardId::from("beta"), ShardEndpoints::master(local(6381)));

        Self {
            replicas: DEFAULT_REPLICAS,
            hasher: HasherKind::default(),
            migrate_timeout_ms: default_migrate_timeout_ms(),
            password: None,
            connect_timeout_ms: Some(2000),
            notifications: NotificationConfig::default(),
            shards,
        }
    }
}

impl ClusterConfig {
    /// Reads, parses and validates a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks the settings a router can't work without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shards.is_empty() {
            return Err(ConfigError::Invalid("at least one shard is required".into()));
        }
        if self.replicas == 0 {
            return Err(ConfigError::Invalid("replicas must be at least 1".into()));
        }
        if self.notifications.key.is_empty() {
            return Err(ConfigError::Invalid("notifications.key must not be empty".into()));
        }

        let mut seen: HashSet<&NodeAddr> = HashSet::new();
        for (id, endpoints) in &self.shards {
            let Some(master) = &endpoints.master else {
                return Err(ConfigError::Invalid(format!(
                    "shard '{id}' has no master"
                )));
            };
            for addr in std::iter::once(master).chain(&endpoints.slaves) {
                if !seen.insert(addr) {
                    return Err(ConfigError::Invalid(format!(
                        "node {addr} is listed more than once"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn registry(&self) -> ShardRegistry {
        self.shards
            .iter()
            .map(|(id, endpoints)| (id.clone(), endpoints.clone()))
            .collect()
    }

    /// A ring holding every configured shard, in id order.
    pub fn ring(&self) -> Result<HashRing<HasherKind>, RingError> {
        let mut ring = HashRing::with_hasher(self.hasher, self.replicas.max(1));
        ring.add_targets(self.shards.keys())?;
        Ok(ring)
    }

    pub fn migrate_timeout(&self) -> Duration {
        Duration::from_millis(self.migrate_timeout_ms)
    }

    /// A TCP connector carrying the configured password and timeout.
    pub fn tcp_connector(&self) -> TcpConnector {
        let mut connector = TcpConnector::new();
        if let Some(password) = &self.password {
            connector = connector.with_password(password.clone());
        }
        if let Some(ms) = self.connect_timeout_ms {
            connector = connector.with_connect_timeout(Duration::from_millis(ms));
        }
        connector
    }
}
