//! Broadcast commands and fail-fast operations.

use shardis::{ClusterError, Frame};

use crate::helpers::TestCluster;

#[tokio::test]
async fn dbsize_reports_every_node() {
    let mut cluster = TestCluster::start();
    cluster.pin("a", "alpha");
    cluster.pin("b", "beta");
    cluster.router.mset([("a", "1"), ("b", "2")]).await.unwrap();

    let sizes = cluster.router.dbsize().await.unwrap();
    let nodes: Vec<&str> = sizes.keys().map(String::as_str).collect();
    assert_eq!(nodes, ["mem:7001", "mem:7002", "mem:7003", "mem:7004"]);
    assert_eq!(sizes["mem:7001"], Frame::Integer(1));
    // the slave mirrors its master
    assert_eq!(sizes["mem:7002"], Frame::Integer(1));
    assert_eq!(sizes["mem:7003"], Frame::Integer(1));
    assert_eq!(sizes["mem:7004"], Frame::Integer(0));
}

#[tokio::test]
async fn keys_pattern_per_node() {
    let mut cluster = TestCluster::start();
    cluster.pin("user:1", "beta");
    cluster.pin("user:2", "gamma");
    cluster.router.mset([("user:1", "a"), ("user:2", "b"), ("other", "c")]).await.unwrap();
    let found = cluster.router.keys("user:*").await.unwrap();
    assert_eq!(found["mem:7003"], Frame::Array(vec![Frame::Bulk("user:1".into())]));
    assert_eq!(found["mem:7004"], Frame::Array(vec![Frame::Bulk("user:2".into())]));
}

#[tokio::test]
async fn info_comes_from_each_role() {
    let mut cluster = TestCluster::start();
    let info = cluster.router.info(None).await.unwrap();
    let slave = info["mem:7002"].as_str().unwrap();
    assert!(slave.contains("role:slave"));
    let master = info["mem:7004"].as_str().unwrap();
    assert!(master.contains("role:master"));
}

#[tokio::test]
async fn down_node_fails_the_broadcast() {
    let mut cluster = TestCluster::start();
    cluster.nodes.set_down(&"mem:7003".parse().unwrap(), true);
    let err = cluster.router.lastsave().await.unwrap_err();
    assert!(matches!(err, ClusterError::Connection { .. }));
}

#[test]
fn scripting_and_pubsub_are_refused() {
    let mut cluster = TestCluster::start();
    assert!(matches!(
        cluster.router.eval("return 1", &["k"], &[]),
        Err(ClusterError::Unsupported("EVAL"))
    ));
    assert!(matches!(
        cluster.router.subscribe(&["news"]),
        Err(ClusterError::Unsupported(_))
    ));
}
