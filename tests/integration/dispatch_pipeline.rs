//! Parse and aggregate phases against mock workers

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use guardia_cluster::dispatch::Dispatcher;
use guardia_cluster::error::DispatchError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::helpers::{
    FlakyResolver, MockWorker, context, context_with_resolver, host_names, repository_with,
};

fn dispatcher(
    hosts: Vec<String>,
    parallel: usize,
    iteration: u64,
    worker: &Arc<MockWorker>,
) -> Dispatcher {
    let repository = repository_with("web", hosts, parallel, iteration);
    Dispatcher::new(context(repository, worker.clone()), CancellationToken::new())
}

#[tokio::test(start_paused = true)]
async fn test_parsing_concurrency_is_bounded() {
    let worker = Arc::new(MockWorker::new(Duration::from_millis(100)));
    let dispatcher = dispatcher(host_names(10), 3, 60, &worker);

    let report = dispatcher.dispatch("web", None, false).await.unwrap();

    assert_eq!(report.parsing_result.len(), 10);
    assert_eq!(worker.max_in_flight(), 3);
    assert_eq!(dispatcher.stats().success_parsing(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_failed_parsings_do_not_abort_siblings() {
    let worker = Arc::new(MockWorker::failing_for(
        Duration::from_millis(10),
        &["web-2", "web-5"],
    ));
    let dispatcher = dispatcher(host_names(6), 0, 60, &worker);

    let report = dispatcher.dispatch("web", None, false).await.unwrap();

    assert_eq!(report.parsing_result.len(), 4);
    assert!(!report.parsing_result.contains_key("web-2"));

    let stats = dispatcher.stats().snapshot();
    assert_eq!(stats.success_parsing, 4);
    assert_eq!(stats.failed_parsing, 2);
    assert_eq!(stats.success_aggregate, 2);

    let aggregated = worker.aggregated();
    assert_eq!(aggregated.len(), 2);
    assert!(aggregated.iter().all(|task| task.parsing_result.len() == 4));
    assert!(Arc::ptr_eq(&aggregated[0].parsing_result, &aggregated[1].parsing_result));
}

#[tokio::test(start_paused = true)]
async fn test_unresolvable_tasks_count_as_failures() {
    let worker = Arc::new(
        MockWorker::new(Duration::from_millis(10)).with_failing_aggregations(&["errors"]),
    );
    let resolver = Arc::new(FlakyResolver::new(worker.clone(), 3, false));
    let repository = repository_with("web", host_names(8), 0, 60);
    let dispatcher = Dispatcher::new(
        context_with_resolver(repository, resolver),
        CancellationToken::new(),
    );

    let report = dispatcher.dispatch("web", None, false).await.unwrap();

    assert_eq!(report.parsing_result.len(), 5);
    assert_eq!(worker.parsed(), 5);

    let stats = dispatcher.stats().snapshot();
    assert_eq!(stats.success_parsing, 5);
    assert_eq!(stats.failed_parsing, 3);
    assert_eq!(stats.success_aggregate, 1);
    assert_eq!(stats.failed_aggregate, 1);

    // the sibling aggregation still ran with the partial result
    let aggregated = worker.aggregated();
    assert_eq!(aggregated.len(), 1);
    assert_eq!(aggregated[0].config, "p99");
    assert_eq!(aggregated[0].parsing_result.len(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_unresolvable_aggregations_are_counted() {
    let worker = Arc::new(MockWorker::new(Duration::from_millis(10)));
    let resolver = Arc::new(FlakyResolver::new(worker.clone(), 0, true));
    let repository = repository_with("web", host_names(3), 0, 60);
    let dispatcher = Dispatcher::new(
        context_with_resolver(repository, resolver),
        CancellationToken::new(),
    );

    let report = dispatcher.dispatch("web", None, false).await.unwrap();

    assert_eq!(report.parsing_result.len(), 3);
    assert!(worker.aggregated().is_empty());

    let stats = dispatcher.stats().snapshot();
    assert_eq!(stats.success_parsing, 3);
    assert_eq!(stats.success_aggregate, 0);
    assert_eq!(stats.failed_aggregate, 2);
}

#[tokio::test(start_paused = true)]
async fn test_wait_holds_until_iteration_deadline() {
    let worker = Arc::new(MockWorker::new(Duration::from_millis(10)));
    let dispatcher = dispatcher(host_names(2), 0, 5, &worker);

    let start = Instant::now();
    dispatcher.dispatch("web", None, true).await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(5));

    let start = Instant::now();
    dispatcher.dispatch("web", None, false).await.unwrap();
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_parsing_stragglers_are_left_behind() {
    // 5s iteration: parsing closes after 4s, the second batch would need 6s
    let worker = Arc::new(MockWorker::new(Duration::from_secs(3)));
    let dispatcher = dispatcher(host_names(4), 2, 5, &worker);

    let start = Instant::now();
    let report = dispatcher.dispatch("web", None, false).await.unwrap();

    assert!(start.elapsed() < Duration::from_secs(5));
    assert_eq!(report.parsing_result.len(), 2);
    assert!(worker
        .aggregated()
        .iter()
        .all(|task| task.parsing_result.len() == 2));

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(worker.parsed(), 4);

    let stats = dispatcher.stats().snapshot();
    assert_eq!(stats.success_parsing, 2);
    assert_eq!(stats.failed_parsing, 2);
}

#[tokio::test]
async fn test_empty_host_set_fails_iteration() {
    let worker = Arc::new(MockWorker::new(Duration::ZERO));
    let dispatcher = dispatcher(vec![], 0, 60, &worker);

    assert_matches!(
        dispatcher.dispatch("web", None, false).await,
        Err(DispatchError::NoHosts { .. })
    );
    assert_eq!(worker.parsed(), 0);
}
