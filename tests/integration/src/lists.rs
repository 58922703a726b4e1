//! List moves between shards and push notifications.

use shardis::Frame;

use crate::helpers::{bulk, TestCluster};

#[tokio::test]
async fn rpoplpush_across_shards() {
    let mut cluster = TestCluster::start();
    cluster.pin("jobs", "alpha");
    cluster.pin("working", "gamma");
    cluster.router.rpush("jobs", ["j1", "j2"]).await.unwrap();

    assert_eq!(cluster.router.rpoplpush("jobs", "working").await.unwrap(), bulk("j2"));
    assert_eq!(cluster.router.lrange("jobs", 0, -1).await.unwrap(), Frame::Array(vec![bulk("j1")]));
    assert_eq!(cluster.router.lindex("working", 0).await.unwrap(), bulk("j2"));

    cluster.pin("empty", "beta");
    assert_eq!(cluster.router.rpoplpush("empty", "working").await.unwrap(), Frame::Null);
    assert_eq!(cluster.router.llen("working").await.unwrap(), Frame::Integer(1));
}

#[tokio::test]
async fn every_pushed_element_is_announced() {
    let mut cluster = TestCluster::start();
    cluster.router.lpush("inbox", ["a", "b", "c"]).await.unwrap();
    cluster.router.rpush("outbox", ["d"]).await.unwrap();

    let queue = cluster.master_of("test:queue");
    let pushes: Vec<String> = cluster
        .nodes
        .commands_sent(&queue)
        .into_iter()
        .filter(|l| l.starts_with("LPUSH test:queue"))
        .collect();
    assert_eq!(
        pushes,
        [
            "LPUSH test:queue inbox",
            "LPUSH test:queue inbox",
            "LPUSH test:queue inbox",
            "LPUSH test:queue outbox",
        ]
    );
    let ttl = cluster.nodes.execute(&queue, ["TTL", "test:queue"]).as_integer().unwrap();
    assert!((1..=30).contains(&ttl));
}

#[tokio::test]
async fn pushx_does_not_announce() {
    let mut cluster = TestCluster::start();
    cluster.router.rpush("l", ["x"]).await.unwrap();
    cluster.nodes.clear_log();
    assert_eq!(cluster.router.rpushx("l", "y").await.unwrap(), Frame::Integer(2));
    assert_eq!(cluster.router.lpushx("missing", "y").await.unwrap(), Frame::Integer(0));
    let queue = cluster.master_of("test:queue");
    assert!(!cluster.nodes.commands_sent(&queue).iter().any(|l| l.contains("test:queue")));
}

#[tokio::test]
async fn list_edits() {
    let mut cluster = TestCluster::start();
    cluster.router.rpush("l", ["a", "b", "a", "c"]).await.unwrap();
    assert_eq!(cluster.router.lrem("l", 0, "a").await.unwrap(), Frame::Integer(2));
    assert_eq!(cluster.router.linsert("l", true, "c", "b2").await.unwrap(), Frame::Integer(3));
    assert!(cluster.router.lset("l", 0, "first").await.unwrap().is_ok());
    assert!(cluster.router.ltrim("l", 0, 1).await.unwrap().is_ok());
    assert_eq!(
        cluster.router.lrange("l", 0, -1).await.unwrap(),
        Frame::Array(vec![bulk("first"), bulk("b2")])
    );
}
