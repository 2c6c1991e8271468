//! Integration tests for the stats API
//!
//! The server is bound to a random port and queried over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use guardia_cluster::api::{ApiConfig, ApiState, spawn_api_server};
use guardia_cluster::cluster::AssignmentCommand;
use serde_json::Value;

use super::helpers::{MockWorker, TestNode, context, host_names, repository_with, spawn_node, wait_until};

async fn spawn_test_api(node: &TestNode, name: &str) -> SocketAddr {
    let state = ApiState::new(
        name,
        node.store.clone(),
        node.observer.clone(),
        node.loops.clone(),
    );

    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
    };

    spawn_api_server(config, state).await.unwrap()
}

async fn get_json(addr: SocketAddr, path: &str) -> (u16, Value) {
    let response = reqwest::get(format!("http://{addr}{path}")).await.unwrap();
    let status = response.status().as_u16();
    let body = response.json().await.unwrap();
    (status, body)
}

#[tokio::test]
async fn test_api_reports_running_loops() {
    let worker = Arc::new(MockWorker::new(Duration::from_millis(10)));
    let ctx = context(repository_with("web", host_names(2), 0, 1), worker.clone());
    let node = spawn_node("node-a", ctx);
    let addr = spawn_test_api(&node, "node-a").await;

    node.replica.submit(&AssignmentCommand::assign("node-a", "web")).await.unwrap();
    node.replica.submit(&AssignmentCommand::assign("node-b", "db")).await.unwrap();
    assert!(wait_until(Duration::from_secs(5), || worker.parsed() >= 2).await);

    let (status, health) = get_json(addr, "/api/v1/health").await;
    assert_eq!(status, 200);
    assert_eq!(health["node"], "node-a");

    let (_, stats) = get_json(addr, "/api/v1/stats").await;
    assert_eq!(stats["running"], serde_json::json!(["web"]));
    assert!(stats["configs"]["web"]["success_parsing"].as_u64().unwrap() >= 1);

    let (_, distribution) = get_json(addr, "/api/v1/distribution").await;
    assert_eq!(distribution["hosts"].as_array().unwrap().len(), 2);

    let (status, assignments) = get_json(addr, "/api/v1/assignments/node-b").await;
    assert_eq!(status, 200);
    assert_eq!(assignments["configs"], serde_json::json!(["db"]));

    let (status, _) = get_json(addr, "/api/v1/assignments/node-x").await;
    assert_eq!(status, 404);

    assert_eq!(node.loops.shutdown(Duration::from_secs(5)).await, 0);
}
