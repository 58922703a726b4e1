//! Test harness: a three-shard in-memory cluster behind a router.

use bytes::Bytes;
use shardis::{Access, ClusterConfig, Frame, MemoryCluster, MemoryConnector, NodeAddr, Router};

const CONFIG: &str = r#"
replicas = 64
hasher = "crc32"
migrate_timeout_ms = 1000

[notifications]
key = "test:queue"
ttl_secs = 30

[shards.alpha]
master = "mem:7001"
slaves = ["mem:7002"]

[shards.beta]
master = "mem:7003"

[shards.gamma]
master = "mem:7004"
"#;

/// A router over `alpha` (with one slave), `beta` and `gamma`.
pub struct TestCluster {
    pub router: Router<MemoryConnector>,
    pub nodes: MemoryCluster,
}

impl TestCluster {
    pub fn start() -> Self {
        let config = ClusterConfig::from_toml_str(CONFIG)
            .unwrap_or_else(|e| panic!("test config rejected: {e}"));
        let nodes = MemoryCluster::for_registry(&config.registry());
        let router = Router::from_config(&config, nodes.connector())
            .unwrap_or_else(|e| panic!("router setup failed: {e}"));
        Self { router, nodes }
    }

    /// Overrides `key`'s hash key so it lands on `shard`.
    pub fn pin(&mut self, key: &str, shard: &str) {
        let hash_key = (0..10_000)
            .map(|i| format!("{shard}-{i}"))
            .find(|h| {
                self.router
                    .ring()
                    .lookup(h)
                    .is_ok_and(|s| s.as_str() == shard)
            })
            .unwrap_or_else(|| panic!("no hash key maps to shard {shard}"));
        self.router.set_hash_key_override(key, hash_key);
    }

    pub fn master_of(&self, key: &str) -> NodeAddr {
        self.router
            .resolve(key, Access::Write)
            .unwrap_or_else(|e| panic!("cannot resolve {key}: {e}"))
    }

    /// Masters other than `key`'s own that hold `name`.
    pub fn stray_copies(&self, key: &str, name: &str) -> Vec<NodeAddr> {
        let home = self.master_of(key);
        ["mem:7001", "mem:7003", "mem:7004"]
            .iter()
            .filter_map(|a| a.parse::<NodeAddr>().ok())
            .filter(|a| *a != home && self.nodes.has_key(a, name))
            .collect()
    }
}

pub fn bulk(s: &str) -> Frame {
    Frame::Bulk(Bytes::copy_from_slice(s.as_bytes()))
}

/// Members as sorted strings, for order-insensitive comparisons.
pub fn sorted(members: Vec<Bytes>) -> Vec<String> {
    let mut out: Vec<String> = members
        .iter()
        .map(|m| String::from_utf8_lossy(m).into_owned())
        .collect();
    out.sort();
    out
}
