//! Renames and SORT ... STORE across shards.

use shardis::{Access, ClusterError, Frame, SortOptions};

use crate::helpers::{bulk, TestCluster};

#[tokio::test]
async fn rename_moves_value_and_ttl() {
    let mut cluster = TestCluster::start();
    cluster.pin("old", "alpha");
    cluster.pin("new", "gamma");
    cluster.router.hset("old", "f", "v").await.unwrap();
    cluster.router.expire("old", 300).await.unwrap();

    assert!(cluster.router.rename("old", "new").await.unwrap().is_ok());
    assert_eq!(cluster.router.hget("new", "f").await.unwrap(), bulk("v"));
    assert_eq!(cluster.router.exists("old").await.unwrap(), Frame::Integer(0));
    let ttl = cluster.router.ttl("new").await.unwrap().as_integer().unwrap();
    assert!((1..=300).contains(&ttl));
    assert!(cluster.stray_copies("new", "new").is_empty());
}

#[tokio::test]
async fn rename_overwrites_existing_destination() {
    let mut cluster = TestCluster::start();
    cluster.pin("old", "beta");
    cluster.pin("new", "gamma");
    cluster.router.set("old", "fresh").await.unwrap();
    cluster.router.set("new", "stale").await.unwrap();
    assert!(cluster.router.rename("old", "new").await.unwrap().is_ok());
    assert_eq!(cluster.router.get("new").await.unwrap(), bulk("fresh"));
}

#[tokio::test]
async fn renamenx_leaves_both_keys_when_destination_exists() {
    let mut cluster = TestCluster::start();
    cluster.pin("old", "beta");
    cluster.pin("new", "gamma");
    cluster.router.set("old", "1").await.unwrap();
    cluster.router.set("new", "2").await.unwrap();

    assert_eq!(cluster.router.renamenx("old", "new").await.unwrap(), Frame::Integer(0));
    assert_eq!(cluster.router.get("old").await.unwrap(), bulk("1"));
    assert_eq!(cluster.router.get("new").await.unwrap(), bulk("2"));
    assert!(cluster.stray_copies("old", "old").is_empty());
}

#[tokio::test]
async fn rename_to_down_node_fails_without_moving() {
    let mut cluster = TestCluster::start();
    cluster.pin("old", "beta");
    cluster.pin("new", "gamma");
    cluster.router.set("old", "1").await.unwrap();
    let gamma = cluster.master_of("new");
    cluster.nodes.set_down(&gamma, true);

    let err = cluster.router.rename("old", "new").await.unwrap_err();
    assert!(matches!(err, ClusterError::Reply(ref msg) if msg.starts_with("IOERR")));
    cluster.nodes.set_down(&gamma, false);
    assert_eq!(cluster.router.get("old").await.unwrap(), bulk("1"));
}

#[tokio::test]
async fn sort_store_lands_on_store_shard() {
    let mut cluster = TestCluster::start();
    cluster.pin("scores", "alpha");
    cluster.pin("ranked", "beta");
    cluster.router.rpush("scores", ["30", "10", "20"]).await.unwrap();

    let options = SortOptions::default().store("ranked");
    assert_eq!(cluster.router.sort("scores", &options).await.unwrap(), Frame::Integer(3));
    assert_eq!(
        cluster.router.lrange("ranked", 0, -1).await.unwrap(),
        Frame::Array(vec![bulk("10"), bulk("20"), bulk("30")])
    );
    assert!(cluster.stray_copies("ranked", "ranked").is_empty());

    // a plain sort is a read and may be served by the slave
    let names = cluster.router.sort("scores", &SortOptions::default().desc().limit(0, 1)).await;
    assert_eq!(names.unwrap(), Frame::Array(vec![bulk("30")]));
    let read = cluster.router.resolve("scores", Access::Read).unwrap();
    assert!(cluster.nodes.commands_sent(&read).last().unwrap().starts_with("SORT scores"));
}

#[tokio::test]
async fn del_and_expiry_across_shards() {
    let mut cluster = TestCluster::start();
    cluster.pin("a", "alpha");
    cluster.pin("b", "beta");
    cluster.pin("c", "gamma");
    cluster.router.mset([("a", "1"), ("b", "2"), ("c", "3")]).await.unwrap();
    assert_eq!(cluster.router.pexpire("b", 60_000).await.unwrap(), Frame::Integer(1));
    assert!(cluster.router.pttl("b").await.unwrap().as_integer().unwrap() > 0);
    assert_eq!(cluster.router.del(&["a", "b", "c", "d"]).await.unwrap(), 3);
}
