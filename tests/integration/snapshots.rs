//! Snapshot transfer between replicas

use std::sync::Arc;
use std::time::Duration;

use guardia_cluster::cluster::AssignmentCommand;
use pretty_assertions::assert_eq;

use super::helpers::{MockWorker, context, host_names, repository_with, spawn_node};

#[tokio::test]
async fn test_lagging_replica_catches_up_from_snapshot() {
    let worker = Arc::new(MockWorker::new(Duration::from_millis(10)));
    let ctx = context(repository_with("web", host_names(2), 0, 1), worker);

    let leader = spawn_node("node-b", ctx.clone());
    let follower = spawn_node("node-a", ctx);

    leader.replica.submit(&AssignmentCommand::assign("node-a", "web")).await.unwrap();
    leader.replica.submit(&AssignmentCommand::assign("node-b", "db")).await.unwrap();
    leader.replica.submit(&AssignmentCommand::assign("node-c", "cache")).await.unwrap();

    let snapshot = leader.replica.snapshot().await.unwrap();
    let spawned = follower.replica.restore(snapshot.data().to_vec()).await.unwrap();

    assert_eq!(spawned, 1);
    assert_eq!(follower.store.dump(), leader.store.dump());
    assert_eq!(follower.loops.running(), vec!["web".to_string()]);

    assert_eq!(follower.loops.shutdown(Duration::from_secs(5)).await, 0);
    assert_eq!(leader.loops.shutdown(Duration::from_secs(5)).await, 0);
}

#[tokio::test]
async fn test_restore_replaces_existing_loops() {
    let worker = Arc::new(MockWorker::new(Duration::from_millis(10)));
    let ctx = context(repository_with("web", host_names(2), 0, 1), worker);
    let node = spawn_node("node-a", ctx);

    node.replica.submit(&AssignmentCommand::assign("node-a", "web")).await.unwrap();
    let old_token = node.store.token("node-a", "web").unwrap();

    let spawned = node.replica.restore(b"null".to_vec()).await.unwrap();

    assert_eq!(spawned, 0);
    assert!(node.store.is_empty());
    assert!(old_token.is_cancelled());

    let snapshot = node.replica.snapshot().await.unwrap();
    assert_eq!(snapshot.data(), b"{}");

    assert_eq!(node.loops.shutdown(Duration::from_secs(5)).await, 0);
}

#[tokio::test]
async fn test_malformed_snapshot_keeps_state() {
    let worker = Arc::new(MockWorker::new(Duration::from_millis(10)));
    let ctx = context(repository_with("web", host_names(1), 0, 1), worker);
    let node = spawn_node("node-b", ctx);

    node.replica.submit(&AssignmentCommand::assign("node-a", "web")).await.unwrap();

    assert!(node.replica.restore(b"[1, 2".to_vec()).await.is_err());
    assert_eq!(node.store.list("node-a"), vec!["web".to_string()]);
}
