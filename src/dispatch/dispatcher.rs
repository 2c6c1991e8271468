//! One parse-then-aggregate iteration for a config
//!
//! ## Message Flow
//!
//! ```text
//! update_session_params ─→ parsing phase ──────────────→ aggregation phase ─→ wait
//!                           │ semaphore(k)                │ one unit per config
//!                           │ unit: resolve → do_parsing  │ unit: resolve → do_aggregating
//!                           │ merge into shared result    │
//!                           └─ parsing deadline           └─ whole deadline
//! ```
//!
//! Units are spawned tasks. When a phase deadline passes, the units still in
//! flight are detached rather than aborted; whatever they return afterwards is
//! dropped and counted as a failure.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{Instant, sleep_until, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::DispatchError;
use crate::hosts::FetcherLoader;
use crate::repository::Repository;
use crate::tasks::{AggregationTask, ParsingResult, ParsingTask, TimeFrame};
use crate::util::generate_session_id;
use crate::worker::{AGGREGATE, PARSING, Resolver};

use super::session::update_session_params;
use super::stats::ClientStats;

/// Collaborators shared by every dispatch loop of a node
pub struct Context {
    pub repository: Arc<dyn Repository>,
    pub fetchers: Arc<dyn FetcherLoader>,
    pub resolver: Arc<dyn Resolver>,

    /// Candidate hosts for worker resolution
    pub worker_hosts: Vec<String>,

    /// Pause before retrying a failed iteration
    pub retry_delay: Duration,
}

/// Outcome of a completed iteration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationReport {
    pub id: String,

    /// Merged result of the parsing calls that finished in time
    pub parsing_result: Arc<ParsingResult>,

    /// Number of aggregation tasks submitted
    pub aggregations: usize,
}

/// Parsing output shared by the units of one phase
///
/// Once sealed, late units must not touch `result`.
#[derive(Default)]
struct PhaseResult {
    sealed: bool,
    result: ParsingResult,
}

pub struct Dispatcher {
    id: String,
    ctx: Arc<Context>,
    stats: Arc<ClientStats>,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(ctx: Arc<Context>, cancel: CancellationToken) -> Self {
        Self {
            id: generate_session_id(),
            ctx,
            stats: Arc::new(ClientStats::new()),
            cancel,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stats(&self) -> &Arc<ClientStats> {
        &self.stats
    }

    /// Run one iteration for `config`
    ///
    /// With `should_wait`, returns no earlier than the end of the iteration
    /// budget unless the dispatcher is cancelled meanwhile.
    #[instrument(skip(self, iteration_id), fields(client = %self.id))]
    pub async fn dispatch(
        &self,
        config: &str,
        iteration_id: Option<String>,
        should_wait: bool,
    ) -> Result<IterationReport, DispatchError> {
        let id = iteration_id.unwrap_or_else(generate_session_id);

        if self.ctx.worker_hosts.is_empty() {
            error!(session = %id, "unable to get the list of worker hosts");
            return Err(DispatchError::NoWorkers);
        }

        let params = update_session_params(
            config,
            self.ctx.repository.as_ref(),
            self.ctx.fetchers.as_ref(),
        )
        .await
        .inspect_err(|e| error!(session = %id, "unable to update session parameters: {e}"))?;

        let start = Instant::now();
        let whole_deadline = start + params.whole_time;
        let parsing_deadline = start + params.parsing_time;

        let previous = Utc::now().timestamp();
        let frame = TimeFrame {
            previous,
            current: previous + params.whole_time.as_secs() as i64,
        };

        info!(session = %id, "start new iteration");
        let workers = Arc::new(self.ctx.worker_hosts.clone());

        let parsing_result = Arc::new(
            self.parsing_phase(
                &id,
                frame,
                params.parsing_tasks,
                params.parallel_parsings,
                parsing_deadline,
                &workers,
            )
            .await,
        );
        info!(session = %id, "parsing finished for {} hosts", parsing_result.len());

        let aggregations = params.aggregation_tasks.len();
        self.aggregation_phase(
            &id,
            frame,
            params.aggregation_tasks,
            &parsing_result,
            whole_deadline,
            &workers,
        )
        .await;
        info!(session = %id, "aggregation has finished");

        if should_wait {
            tokio::select! {
                _ = sleep_until(whole_deadline) => {}
                _ = self.cancel.cancelled() => {
                    debug!(session = %id, "cancelled while waiting for the next iteration");
                }
            }
        }

        debug!(session = %id, "go to the next iteration");

        Ok(IterationReport {
            id,
            parsing_result,
            aggregations,
        })
    }

    async fn parsing_phase(
        &self,
        id: &str,
        frame: TimeFrame,
        tasks: Vec<ParsingTask>,
        parallel: usize,
        deadline: Instant,
        workers: &Arc<Vec<String>>,
    ) -> ParsingResult {
        let total = tasks.len();
        let shared = Arc::new(Mutex::new(PhaseResult::default()));
        let semaphore = Arc::new(Semaphore::new(parallel.max(1)));
        let mut submitted = 0;

        let phase = async {
            let mut units = Vec::with_capacity(total);
            for (i, mut task) in tasks.into_iter().enumerate() {
                task.id = id.to_string();
                task.frame = frame;

                let Ok(permit) = semaphore.clone().acquire_owned().await else {
                    break;
                };

                debug!(session = %id, "send task number {}/{total} to parsing", i + 1);
                trace!(session = %id, "parsing task content {task:?}");

                units.push(tokio::spawn(parsing_unit(
                    self.ctx.resolver.clone(),
                    workers.clone(),
                    self.stats.clone(),
                    shared.clone(),
                    task,
                    permit,
                )));
                submitted += 1;
            }
            join_all(units).await;
        };

        if timeout_at(deadline, phase).await.is_err() {
            warn!(session = %id, "parsing deadline elapsed, continuing with partial result");
        }

        // Tasks that never got a slot before the deadline
        for _ in submitted..total {
            self.stats.add_failed_parsing();
        }

        let mut shared = shared.lock();
        shared.sealed = true;
        std::mem::take(&mut shared.result)
    }

    async fn aggregation_phase(
        &self,
        id: &str,
        frame: TimeFrame,
        tasks: Vec<AggregationTask>,
        parsing_result: &Arc<ParsingResult>,
        deadline: Instant,
        workers: &Arc<Vec<String>>,
    ) {
        let total = tasks.len();
        let mut units = Vec::with_capacity(total);

        for (i, mut task) in tasks.into_iter().enumerate() {
            task.id = id.to_string();
            task.frame = frame;
            task.parsing_result = parsing_result.clone();

            debug!(session = %id, "send task number {}/{total} to aggregate", i + 1);

            units.push(tokio::spawn(aggregation_unit(
                self.ctx.resolver.clone(),
                workers.clone(),
                self.stats.clone(),
                task,
            )));
        }

        if timeout_at(deadline, join_all(units)).await.is_err() {
            warn!(session = %id, "iteration deadline elapsed during aggregation");
        }
    }
}

async fn parsing_unit(
    resolver: Arc<dyn Resolver>,
    workers: Arc<Vec<String>>,
    stats: Arc<ClientStats>,
    shared: Arc<Mutex<PhaseResult>>,
    task: ParsingTask,
    _permit: OwnedSemaphorePermit,
) {
    let worker = match resolver.resolve(PARSING, &workers).await {
        Ok(worker) => worker,
        Err(e) => {
            error!(session = %task.id, host = %task.host, "unable to send task: {e}");
            stats.add_failed_parsing();
            return;
        }
    };

    let result = match worker.do_parsing(&task).await {
        Ok(result) => result,
        Err(e) => {
            error!(
                session = %task.id,
                host = %task.host,
                worker = %worker.footprint(),
                "parsing task failed: {e}"
            );
            stats.add_failed_parsing();
            return;
        }
    };

    let merged = {
        let mut shared = shared.lock();
        if !shared.sealed {
            shared.result.extend(result);
        }
        !shared.sealed
    };

    if merged {
        debug!(session = %task.id, host = %task.host, worker = %worker.footprint(), "parsing task done");
        stats.add_success_parsing();
    } else {
        warn!(session = %task.id, host = %task.host, "parsing result arrived after the deadline");
        stats.add_failed_parsing();
    }
}

async fn aggregation_unit(
    resolver: Arc<dyn Resolver>,
    workers: Arc<Vec<String>>,
    stats: Arc<ClientStats>,
    task: AggregationTask,
) {
    let worker = match resolver.resolve(AGGREGATE, &workers).await {
        Ok(worker) => worker,
        Err(e) => {
            error!(session = %task.id, config = %task.config, "unable to send task: {e}");
            stats.add_failed_aggregate();
            return;
        }
    };

    match worker.do_aggregating(&task).await {
        Ok(()) => {
            debug!(session = %task.id, config = %task.config, worker = %worker.footprint(), "aggregation task done");
            stats.add_success_aggregate();
        }
        Err(e) => {
            error!(
                session = %task.id,
                config = %task.config,
                worker = %worker.footprint(),
                "aggregation task failed: {e}"
            );
            stats.add_failed_aggregate();
        }
    }
}
