//! Key placement, replica reads and membership changes.

use std::collections::HashMap;

use shardis::{Access, ClusterError, NodeAddr, ShardEndpoints};

use crate::helpers::{bulk, TestCluster};

#[tokio::test]
async fn keys_spread_over_every_shard() {
    let cluster = TestCluster::start();
    let mut per_shard: HashMap<String, usize> = HashMap::new();
    for i in 0..1000 {
        let shard = cluster.router.shard_of(&format!("user:{i}")).unwrap();
        *per_shard.entry(shard.to_string()).or_default() += 1;
    }
    assert_eq!(per_shard.len(), 3);
    assert!(per_shard.values().all(|&n| n > 100), "skewed placement: {per_shard:?}");
}

#[tokio::test]
async fn placement_is_stable_across_routers() {
    let a = TestCluster::start();
    let b = TestCluster::start();
    for i in 0..200 {
        let key = format!("session:{i}");
        assert_eq!(a.router.shard_of(&key).unwrap(), b.router.shard_of(&key).unwrap());
    }
}

#[tokio::test]
async fn slave_serves_reads_master_takes_writes() {
    let mut cluster = TestCluster::start();
    cluster.pin("profile", "alpha");

    cluster.router.set("profile", "v1").await.unwrap();
    assert_eq!(cluster.router.get("profile").await.unwrap(), bulk("v1"));

    let master: NodeAddr = "mem:7001".parse().unwrap();
    let slave: NodeAddr = "mem:7002".parse().unwrap();
    assert_eq!(cluster.nodes.commands_sent(&master), ["SET profile v1"]);
    assert_eq!(cluster.nodes.commands_sent(&slave), ["GET profile"]);
}

#[tokio::test]
async fn adding_and_removing_a_shard_restores_routing() {
    let mut cluster = TestCluster::start();
    let keys: Vec<String> = (0..500).map(|i| format!("k{i}")).collect();
    let before: Vec<_> = keys.iter().map(|k| cluster.router.shard_of(k).unwrap()).collect();

    let addr: NodeAddr = "mem:7005".parse().unwrap();
    cluster.nodes.add_node(addr.clone());
    cluster
        .router
        .add_shard("delta", ShardEndpoints::master(addr))
        .unwrap();
    let moved = keys
        .iter()
        .filter(|k| cluster.router.shard_of(k).unwrap().as_str() == "delta")
        .count();
    assert!(moved > 0);

    // keys that didn't move to the new shard keep their owner
    for (key, old) in keys.iter().zip(&before) {
        let now = cluster.router.shard_of(key).unwrap();
        assert!(now == *old || now.as_str() == "delta");
    }

    cluster.router.remove_shard("delta").unwrap();
    let after: Vec<_> = keys.iter().map(|k| cluster.router.shard_of(k).unwrap()).collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn down_node_only_fails_its_keys() {
    let mut cluster = TestCluster::start();
    cluster.pin("up", "beta");
    cluster.pin("down", "gamma");
    let gamma = cluster.master_of("down");
    cluster.nodes.set_down(&gamma, true);

    let err = cluster.router.set("down", "x").await.unwrap_err();
    assert!(matches!(err, ClusterError::Connection { ref addr, .. } if *addr == gamma));
    assert!(cluster.router.set("up", "x").await.unwrap().is_ok());
}

#[tokio::test]
async fn removed_shard_is_unknown_to_registry() {
    let mut cluster = TestCluster::start();
    cluster.router.remove_shard("gamma").unwrap();
    for i in 0..100 {
        let key = format!("k{i}");
        assert_ne!(cluster.router.shard_of(&key).unwrap().as_str(), "gamma");
        assert!(cluster.router.resolve(&key, Access::Write).is_ok());
    }
}
