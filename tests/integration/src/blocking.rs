//! Blocking pops driven by the notification queue.

use std::time::Duration;

use shardis::Frame;

use crate::helpers::{bulk, TestCluster};

#[tokio::test]
async fn pop_from_whichever_list_was_pushed() {
    let mut cluster = TestCluster::start();
    cluster.pin("left", "alpha");
    cluster.pin("right", "gamma");
    cluster.router.rpush("right", ["r1", "r2"]).await.unwrap();

    let popped = cluster
        .router
        .blpop(&["left", "right"], Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(popped, Some(("right".to_owned(), "r1".into())));

    let popped = cluster
        .router
        .brpop(&["left", "right"], Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(popped, Some(("right".to_owned(), "r2".into())));
}

#[tokio::test]
async fn empty_queue_times_out() {
    let mut cluster = TestCluster::start();
    let popped = cluster
        .router
        .brpop(&["nothing"], Duration::from_millis(200))
        .await
        .unwrap();
    assert_eq!(popped, None);
}

#[tokio::test]
async fn notification_for_other_key_is_dropped() {
    let mut cluster = TestCluster::start();
    cluster.router.rpush("unrelated", ["x"]).await.unwrap();
    let popped = cluster
        .router
        .blpop(&["wanted"], Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(popped, None);
    // the element itself stays put
    assert_eq!(cluster.router.llen("unrelated").await.unwrap(), Frame::Integer(1));
}

#[tokio::test]
async fn brpoplpush_across_shards() {
    let mut cluster = TestCluster::start();
    cluster.pin("src", "beta");
    cluster.pin("dst", "alpha");
    cluster.router.rpush("src", ["task"]).await.unwrap();

    let moved = cluster
        .router
        .brpoplpush("src", "dst", Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(moved, bulk("task"));
    assert_eq!(cluster.router.lindex("dst", 0).await.unwrap(), bulk("task"));
    assert_eq!(cluster.router.llen("src").await.unwrap(), Frame::Integer(0));
}
