//! Multi-key string commands.

use shardis::{ClusterError, Frame};

use crate::helpers::{bulk, TestCluster};

#[tokio::test]
async fn mset_then_mget_keeps_call_order() {
    let mut cluster = TestCluster::start();
    let pairs: Vec<(String, String)> = (0..30).map(|i| (format!("k{i}"), format!("v{i}"))).collect();
    let replies = cluster.router.mset(pairs.iter().map(|(k, v)| (k, v))).await.unwrap();
    assert_eq!(replies.len(), 30);
    assert!(replies.iter().all(Frame::is_ok));

    let keys: Vec<&str> = pairs.iter().rev().map(|(k, _)| k.as_str()).collect();
    let values = cluster.router.mget(&keys).await.unwrap();
    let expected: Vec<Frame> = pairs.iter().rev().map(|(_, v)| bulk(v)).collect();
    assert_eq!(values, expected);
}

#[tokio::test]
async fn repeated_key_in_mset_keeps_last_write() {
    let mut cluster = TestCluster::start();
    cluster.pin("a", "alpha");
    cluster.pin("b", "beta");
    cluster
        .router
        .mset([("a", "1"), ("b", "1"), ("a", "2"), ("b", "2"), ("a", "3")])
        .await
        .unwrap();
    assert_eq!(cluster.router.get("a").await.unwrap(), bulk("3"));
    assert_eq!(cluster.router.get("b").await.unwrap(), bulk("2"));
}

#[tokio::test]
async fn msetnx_is_per_key_across_shards() {
    let mut cluster = TestCluster::start();
    cluster.pin("a", "alpha");
    cluster.pin("b", "beta");
    cluster.router.set("a", "old").await.unwrap();
    let replies = cluster.router.msetnx([("a", "new"), ("b", "new")]).await.unwrap();
    assert_eq!(replies, [Frame::Integer(0), Frame::Integer(1)]);
    assert_eq!(cluster.router.get("a").await.unwrap(), bulk("old"));
}

#[tokio::test]
async fn bitop_needs_colocated_keys() {
    let mut cluster = TestCluster::start();
    cluster.pin("x", "beta");
    cluster.pin("y", "beta");
    cluster.pin("dst", "beta");
    cluster.pin("far", "gamma");

    cluster.router.setbit("x", 0, true).await.unwrap();
    cluster.router.setbit("y", 1, true).await.unwrap();
    assert_eq!(cluster.router.bitop("OR", "dst", &["x", "y"]).await.unwrap(), Frame::Integer(1));
    assert_eq!(cluster.router.bitcount("dst", None).await.unwrap(), Frame::Integer(2));

    let err = cluster.router.bitop("AND", "dst", &["x", "far"]).await.unwrap_err();
    assert!(matches!(err, ClusterError::CrossShard { command: "BITOP", .. }));
    let err = cluster.router.bitop("AND", "far", &["x", "y"]).await.unwrap_err();
    assert!(matches!(err, ClusterError::CrossShard { .. }));
}
