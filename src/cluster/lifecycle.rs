//! Ownership of the dispatch loops spawned by the state machine

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ClusterError, ClusterResult};

struct RunningLoop {
    id: u64,
    config: String,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Keeps a join handle per spawned loop
///
/// Finished loops are reaped lazily whenever a new loop is spawned or the
/// running set is queried.
#[derive(Default)]
pub struct LoopManager {
    loops: Mutex<Vec<RunningLoop>>,
    next_id: AtomicU64,
}

impl LoopManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task` on the current runtime, bound to `token`
    pub fn spawn<F>(&self, config: &str, token: CancellationToken, task: F) -> ClusterResult<u64>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = Handle::try_current().map_err(|_| ClusterError::NoRuntime {
            config: config.to_string(),
        })?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = runtime.spawn(task);

        let mut loops = self.loops.lock();
        loops.retain(|running| !running.handle.is_finished());
        loops.push(RunningLoop {
            id,
            config: config.to_string(),
            token,
            handle,
        });

        debug!(config, id, "spawned dispatch loop");
        Ok(id)
    }

    /// Configs with a loop that has not finished yet
    pub fn running(&self) -> Vec<String> {
        let mut loops = self.loops.lock();
        loops.retain(|running| !running.handle.is_finished());

        let mut configs: Vec<String> = loops.iter().map(|running| running.config.clone()).collect();
        configs.sort();
        configs
    }

    pub fn running_count(&self) -> usize {
        self.running().len()
    }

    /// Cancel every loop and wait up to `grace` for them to finish
    ///
    /// Loops still running after the grace period are aborted and returned as
    /// the leak count.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let loops = std::mem::take(&mut *self.loops.lock());
        for running in &loops {
            running.token.cancel();
        }

        let deadline = Instant::now() + grace;
        let mut leaked = 0;

        for mut running in loops {
            match timeout_at(deadline, &mut running.handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(config = %running.config, id = running.id, "dispatch loop failed: {e}");
                }
                Err(_) => {
                    warn!(config = %running.config, id = running.id, "dispatch loop did not stop in time");
                    running.handle.abort();
                    leaked += 1;
                }
            }
        }

        leaked
    }
}
