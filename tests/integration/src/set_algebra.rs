//! Set algebra and SMOVE with members spread across shards.

use shardis::{ClusterError, Frame, SetOp};

use crate::helpers::{sorted, TestCluster};

/// `s1` on alpha, `s2` on beta, `s3` on gamma.
async fn three_sets() -> TestCluster {
    let mut cluster = TestCluster::start();
    cluster.pin("s1", "alpha");
    cluster.pin("s2", "beta");
    cluster.pin("s3", "gamma");
    cluster.router.sadd("s1", ["a", "b", "c", "d"]).await.unwrap();
    cluster.router.sadd("s2", ["b", "c", "e"]).await.unwrap();
    cluster.router.sadd("s3", ["c", "f"]).await.unwrap();
    cluster
}

#[tokio::test]
async fn inter_union_diff_across_three_shards() {
    let mut cluster = three_sets().await;
    let keys = ["s1", "s2", "s3"];
    assert_eq!(sorted(cluster.router.sinter(&keys).await.unwrap()), ["c"]);
    assert_eq!(
        sorted(cluster.router.sunion(&keys).await.unwrap()),
        ["a", "b", "c", "d", "e", "f"]
    );
    assert_eq!(sorted(cluster.router.sdiff(&keys).await.unwrap()), ["a", "d"]);
}

#[tokio::test]
async fn missing_key_counts_as_empty() {
    let mut cluster = three_sets().await;
    cluster.pin("nothing", "beta");
    assert!(cluster.router.sinter(&["s1", "nothing"]).await.unwrap().is_empty());
    assert_eq!(cluster.router.sunion(&["nothing", "s3"]).await.unwrap().len(), 2);
    assert!(cluster.router.sdiff(&["nothing", "s1"]).await.unwrap().is_empty());
}

#[tokio::test]
async fn store_replaces_destination_on_its_own_shard() {
    let mut cluster = three_sets().await;
    cluster.pin("out", "gamma");
    cluster.router.sadd("out", ["stale"]).await.unwrap();

    let count = cluster.router.sunionstore("out", &["s1", "s2"]).await.unwrap();
    assert_eq!(count, 5);
    let members = cluster.router.smembers("out").await.unwrap().into_bulk_list().unwrap();
    assert_eq!(sorted(members), ["a", "b", "c", "d", "e"]);
    assert!(cluster.stray_copies("out", "out").is_empty());

    assert_eq!(cluster.router.sinterstore("out", &["s2", "s3"]).await.unwrap(), 1);
    assert_eq!(cluster.router.sdiffstore("out", &["s2", "s1"]).await.unwrap(), 1);
    assert_eq!(cluster.router.sismember("out", "e").await.unwrap(), Frame::Integer(1));
}

#[tokio::test]
async fn empty_store_result_deletes_destination() {
    let mut cluster = three_sets().await;
    cluster.pin("out", "alpha");
    cluster.router.sadd("out", ["stale"]).await.unwrap();
    let count = cluster
        .router
        .set_algebra_store(SetOp::Diff, "out", &["s3", "s1", "s2"])
        .await
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(cluster.router.sinterstore("out", &["s1", "s3", "s2"]).await.unwrap(), 1);

    cluster.pin("void", "beta");
    assert_eq!(cluster.router.sinterstore("out", &["s1", "void"]).await.unwrap(), 0);
    assert_eq!(cluster.router.exists("out").await.unwrap(), Frame::Integer(0));
}

#[tokio::test]
async fn smove_between_shards() {
    let mut cluster = three_sets().await;
    assert_eq!(cluster.router.smove("s1", "s3", "a").await.unwrap(), Frame::Integer(1));
    assert_eq!(cluster.router.sismember("s1", "a").await.unwrap(), Frame::Integer(0));
    assert_eq!(cluster.router.sismember("s3", "a").await.unwrap(), Frame::Integer(1));
    assert_eq!(cluster.router.smove("s1", "s3", "zzz").await.unwrap(), Frame::Integer(0));
}

#[tokio::test]
async fn wrong_type_surfaces_as_error() {
    let mut cluster = three_sets().await;
    cluster.pin("str", "beta");
    cluster.router.set("str", "x").await.unwrap();
    let err = cluster.router.sunion(&["s1", "str"]).await.unwrap_err();
    assert!(matches!(err, ClusterError::Reply(ref msg) if msg.starts_with("WRONGTYPE")));
}
