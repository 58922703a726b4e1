//! ZUNIONSTORE / ZINTERSTORE with sources staged in from other shards.

use shardis::{Aggregate, Frame, ZStoreOptions};

use crate::helpers::{bulk, TestCluster};

async fn scored() -> TestCluster {
    let mut cluster = TestCluster::start();
    cluster.pin("z1", "alpha");
    cluster.pin("z2", "beta");
    cluster.pin("dst", "gamma");
    cluster.router.zadd("z1", [(1.0, "a"), (2.0, "b")]).await.unwrap();
    cluster.router.zadd("z2", [(10.0, "b"), (20.0, "c")]).await.unwrap();
    cluster
}

#[tokio::test]
async fn union_lands_on_destination_shard() {
    let mut cluster = scored().await;
    let count = cluster
        .router
        .zunionstore("dst", &["z1", "z2"], &ZStoreOptions::default())
        .await
        .unwrap();
    assert_eq!(count, 3);
    assert_eq!(
        cluster.router.zrange("dst", 0, -1, true).await.unwrap(),
        Frame::Array(vec![bulk("a"), bulk("1"), bulk("b"), bulk("12"), bulk("c"), bulk("20")])
    );

    // sources are back home and nothing temporary is left behind
    assert_eq!(cluster.router.zcard("z1").await.unwrap(), Frame::Integer(2));
    assert_eq!(cluster.router.zscore("z2", "c").await.unwrap(), bulk("20"));
    assert!(cluster.stray_copies("z1", "z1").is_empty());
    assert!(cluster.stray_copies("z2", "z2").is_empty());
    for node in ["mem:7001", "mem:7003", "mem:7004"] {
        let addr = node.parse().unwrap();
        for name in ["z1:for:zunion:tmp", "z2:for:zunion:tmp"] {
            assert!(!cluster.nodes.has_key(&addr, name), "{name} left on {node}");
        }
    }
}

#[tokio::test]
async fn intersection_with_weights_and_aggregate() {
    let mut cluster = scored().await;
    let options = ZStoreOptions::default()
        .weights([2.0, 1.0])
        .aggregate(Aggregate::Min);
    let count = cluster.router.zinterstore("dst", &["z1", "z2"], &options).await.unwrap();
    assert_eq!(count, 1);
    assert_eq!(cluster.router.zscore("dst", "b").await.unwrap(), bulk("4"));
}

#[tokio::test]
async fn colocated_sources_run_natively() {
    let mut cluster = TestCluster::start();
    for key in ["x", "y", "out"] {
        cluster.pin(key, "beta");
    }
    cluster.router.zadd("x", [(1.0, "m")]).await.unwrap();
    cluster.router.zadd("y", [(2.0, "m")]).await.unwrap();
    let options = ZStoreOptions::default().aggregate(Aggregate::Max);
    assert_eq!(cluster.router.zunionstore("out", &["x", "y"], &options).await.unwrap(), 1);

    let beta = cluster.master_of("out");
    let sent = cluster.nodes.commands_sent(&beta);
    assert!(sent.iter().any(|l| l == "ZUNIONSTORE out 2 x y AGGREGATE MAX"));
    assert!(!sent.iter().any(|l| l.starts_with("MIGRATE")));
}

#[tokio::test]
async fn range_queries() {
    let mut cluster = scored().await;
    assert_eq!(cluster.router.zcount("z2", 0, 15).await.unwrap(), Frame::Integer(1));
    assert_eq!(cluster.router.zrank("z1", "b").await.unwrap(), Frame::Integer(1));
    assert_eq!(
        cluster.router.zrevrangebyscore("z2", "+inf", "-inf", false, Some((0, 1))).await.unwrap(),
        Frame::Array(vec![bulk("c")])
    );
    assert_eq!(cluster.router.zincrby("z1", 5.0, "a").await.unwrap(), bulk("6"));
    assert_eq!(cluster.router.zremrangebyscore("z1", 0, 3).await.unwrap(), Frame::Integer(1));
}
