//! Replicated assignment across a three node cluster
//!
//! Every replica applies the same committed entries in the same order; only
//! the node named by an assignment runs its dispatch loop.

use std::sync::Arc;
use std::time::Duration;

use guardia_cluster::cluster::{ApplyOutcome, AssignmentCommand, LogEntry};
use guardia_cluster::config::{FetcherConfig, ParsingConfig};
use pretty_assertions::assert_eq;

use super::helpers::{MockWorker, TestNode, context, host_names, repository_with, spawn_node, wait_until};

const NODES: [&str; 3] = ["node-a", "node-b", "node-c"];

fn cluster() -> (Vec<TestNode>, Arc<MockWorker>) {
    let repository = repository_with("web-latency", host_names(3), 0, 1);
    repository.insert_parsing(
        "db",
        ParsingConfig {
            groups: vec!["db".to_string()],
            host_fetcher: Some(FetcherConfig::Predefined {
                clusters: [("db".to_string(), vec!["db-1".to_string()])].into(),
            }),
            iteration_duration: 1,
            ..Default::default()
        },
    );

    let worker = Arc::new(MockWorker::new(Duration::from_millis(10)));
    let ctx = context(repository, worker.clone());
    let nodes = NODES.iter().map(|name| spawn_node(name, ctx.clone())).collect();

    (nodes, worker)
}

async fn replicate(nodes: &[TestNode], index: u64, command: AssignmentCommand) -> Vec<ApplyOutcome> {
    let entry = LogEntry::from_command(index, 1, &command).unwrap();

    let mut outcomes = vec![];
    for node in nodes {
        outcomes.push(node.replica.apply(entry.clone()).await.unwrap());
    }
    outcomes
}

#[tokio::test]
async fn test_only_target_node_runs_the_loop() {
    let (nodes, worker) = cluster();

    let outcomes = replicate(&nodes, 1, AssignmentCommand::assign("node-a", "web-latency")).await;

    let spawned: Vec<bool> = outcomes
        .iter()
        .map(|outcome| match outcome {
            ApplyOutcome::Assigned { spawned, .. } => *spawned,
            other => panic!("unexpected outcome {other:?}"),
        })
        .collect();
    assert_eq!(spawned, vec![true, false, false]);

    for node in &nodes {
        assert_eq!(node.store.list("node-a"), vec!["web-latency".to_string()]);
    }
    assert_eq!(nodes[0].loops.running(), vec!["web-latency".to_string()]);
    assert!(nodes[1].loops.running().is_empty());
    assert!(nodes[2].loops.running().is_empty());

    // the loop actually dispatches
    assert!(wait_until(Duration::from_secs(5), || worker.parsed() >= 3).await);
    assert_eq!(nodes[0].observer.len(), 1);
    assert!(nodes[1].observer.is_empty());

    assert_eq!(nodes[0].loops.shutdown(Duration::from_secs(5)).await, 0);
}

#[tokio::test]
async fn test_remove_stops_only_that_loop() {
    let (nodes, _worker) = cluster();

    replicate(&nodes, 1, AssignmentCommand::assign("node-a", "web-latency")).await;
    replicate(&nodes, 2, AssignmentCommand::assign("node-a", "db")).await;
    assert_eq!(
        nodes[0].loops.running(),
        vec!["db".to_string(), "web-latency".to_string()]
    );

    let outcomes = replicate(&nodes, 3, AssignmentCommand::remove("node-a", "web-latency")).await;
    assert!(outcomes
        .iter()
        .all(|outcome| matches!(outcome, ApplyOutcome::Removed { .. })));

    let node_a = &nodes[0];
    assert!(
        wait_until(Duration::from_secs(2), || node_a.loops.running() == vec!["db".to_string()])
            .await
    );
    assert!(node_a.observer.snapshot().contains_key("db"));
    assert!(!node_a.observer.snapshot().contains_key("web-latency"));

    for node in &nodes {
        assert_eq!(node.store.list("node-a"), vec!["db".to_string()]);
    }

    assert_eq!(node_a.loops.shutdown(Duration::from_secs(5)).await, 0);
}

#[tokio::test]
async fn test_reassignment_moves_the_loop() {
    let (nodes, _worker) = cluster();

    replicate(&nodes, 1, AssignmentCommand::assign("node-a", "web-latency")).await;
    replicate(&nodes, 2, AssignmentCommand::remove("node-a", "web-latency")).await;
    replicate(&nodes, 3, AssignmentCommand::assign("node-b", "web-latency")).await;

    assert!(wait_until(Duration::from_secs(2), || nodes[0].loops.running().is_empty()).await);
    assert_eq!(nodes[1].loops.running(), vec!["web-latency".to_string()]);

    for node in &nodes {
        assert_eq!(
            node.store.distribution(),
            vec![("node-b".to_string(), 1)]
        );
    }

    assert_eq!(nodes[1].loops.shutdown(Duration::from_secs(5)).await, 0);
}

#[tokio::test]
async fn test_repeated_assignment_keeps_one_live_token() {
    let (nodes, _worker) = cluster();

    replicate(&nodes, 1, AssignmentCommand::assign("node-a", "web-latency")).await;
    let first = nodes[0].store.token("node-a", "web-latency").unwrap();

    replicate(&nodes, 2, AssignmentCommand::assign("node-a", "web-latency")).await;
    let second = nodes[0].store.token("node-a", "web-latency").unwrap();

    assert!(first.is_cancelled());
    assert!(!second.is_cancelled());
    assert!(
        wait_until(Duration::from_secs(2), || nodes[0].loops.running_count() == 1).await
    );

    assert_eq!(nodes[0].loops.shutdown(Duration::from_secs(5)).await, 0);
}

#[tokio::test]
async fn test_garbage_entries_are_ignored() {
    let (nodes, _worker) = cluster();

    let garbage = LogEntry::new(1, 1, br#"{"type":"Rebalance","host":"node-a","config":"web"}"#.to_vec());
    let outcome = nodes[0].replica.apply(garbage).await.unwrap();

    assert!(matches!(outcome, ApplyOutcome::Ignored { .. }));
    assert!(nodes[0].store.is_empty());

    // the replica keeps applying afterwards
    let outcomes = replicate(&nodes, 2, AssignmentCommand::assign("node-c", "db")).await;
    assert!(matches!(outcomes[2], ApplyOutcome::Assigned { spawned: true, .. }));

    assert_eq!(nodes[2].loops.shutdown(Duration::from_secs(5)).await, 0);
}
