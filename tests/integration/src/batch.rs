//! Pipelines and transactions over several shards.

use shardis::{BatchMode, Cmd, Frame};

use crate::helpers::{bulk, TestCluster};

#[tokio::test]
async fn pipeline_replies_come_back_in_call_order() {
    let mut cluster = TestCluster::start();
    cluster.pin("a", "alpha");
    cluster.pin("b", "beta");
    cluster.pin("c", "gamma");

    let mut batch = cluster.router.begin_batch(BatchMode::Pipeline);
    for cmd in [
        Cmd::new("SET", "c").arg("3"),
        Cmd::new("INCR", "a"),
        Cmd::new("SET", "b").arg("2"),
        Cmd::new("INCR", "a"),
        Cmd::new("GET", "c"),
    ] {
        cluster.router.queue(&mut batch, cmd).await.unwrap();
    }
    assert_eq!(batch.armed_nodes().count(), 3);

    let replies = cluster.router.exec(batch).await.unwrap();
    assert!(replies[0].is_ok());
    assert_eq!(replies[1], Frame::Integer(1));
    assert!(replies[2].is_ok());
    assert_eq!(replies[3], Frame::Integer(2));
    assert_eq!(replies[4], bulk("3"));
}

#[tokio::test]
async fn transaction_wraps_each_node() {
    let mut cluster = TestCluster::start();
    cluster.pin("a", "alpha");
    cluster.pin("b", "beta");

    let mut batch = cluster.router.begin_batch(BatchMode::Transaction);
    cluster.router.queue(&mut batch, Cmd::new("SET", "a").arg("1")).await.unwrap();
    cluster.router.queue(&mut batch, Cmd::new("SET", "b").arg("2")).await.unwrap();
    let replies = cluster.router.exec(batch).await.unwrap();
    assert!(replies.iter().all(Frame::is_ok));

    let alpha = cluster.master_of("a");
    assert_eq!(cluster.nodes.commands_sent(&alpha), ["MULTI", "SET a 1"]);
}

#[tokio::test]
async fn discarded_batch_sends_nothing() {
    let mut cluster = TestCluster::start();
    let mut batch = cluster.router.begin_batch(BatchMode::Pipeline);
    cluster.router.queue(&mut batch, Cmd::new("SET", "k").arg("v")).await.unwrap();
    cluster.router.discard(batch);
    let master = cluster.master_of("k");
    assert!(cluster.nodes.commands_sent(&master).is_empty());
    assert_eq!(cluster.router.get("k").await.unwrap(), Frame::Null);
}

#[tokio::test]
async fn down_node_errors_only_its_slots() {
    let mut cluster = TestCluster::start();
    cluster.pin("ok", "alpha");
    cluster.pin("lost", "gamma");

    let mut batch = cluster.router.begin_batch(BatchMode::Pipeline);
    cluster.router.queue(&mut batch, Cmd::new("SET", "lost").arg("1")).await.unwrap();
    cluster.router.queue(&mut batch, Cmd::new("SET", "ok").arg("1")).await.unwrap();
    let gamma = cluster.master_of("lost");
    cluster.nodes.set_down(&gamma, true);

    let replies = cluster.router.exec(batch).await.unwrap();
    assert!(replies[0].is_error());
    assert!(replies[1].is_ok());
}
