//! Config assignment state machine
//!
//! The consensus layer hands every committed entry to [`ConfigStateMachine::apply`]
//! one at a time and in log order, on every replica. Applying an entry mutates
//! the [`AssignmentStore`]; only the replica whose node name matches the
//! command's host starts a dispatch loop for it.
//!
//! ```text
//! AssignConfig{host, config} → store.put → token ──(host == node)──→ spawn loop(token)
//! RemoveConfig{host, config} → store.remove → token.cancel() → loop stops
//! ```

use std::io::{Read, Write};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::error::{ClusterError, ClusterResult};

use super::command::{AssignmentCommand, CommandType, LogEntry};
use super::lifecycle::LoopManager;
use super::store::{AssignmentStore, AssignmentTable};

/// Builds the dispatch loop for a config assigned to this node
///
/// The returned future must finish soon after `token` is cancelled.
pub trait LoopLauncher: Send + Sync {
    fn launch(&self, config: String, token: CancellationToken) -> BoxFuture<'static, ()>;
}

/// What applying one log entry did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Assigned {
        host: String,
        config: String,
        /// A local dispatch loop was started
        spawned: bool,
    },
    Removed {
        host: String,
        config: String,
    },
    /// The entry was skipped; the state machine keeps going
    Ignored { reason: String },
}

/// Serialized assignment table, ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    data: Vec<u8>,
}

impl Snapshot {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn persist<W: Write>(&self, sink: &mut W) -> ClusterResult<()> {
        sink.write_all(&self.data)?;
        sink.flush()?;
        Ok(())
    }
}

pub struct ConfigStateMachine {
    node: String,
    store: Arc<AssignmentStore>,
    loops: Arc<LoopManager>,
    launcher: Arc<dyn LoopLauncher>,
}

impl ConfigStateMachine {
    pub fn new(
        node: impl Into<String>,
        store: Arc<AssignmentStore>,
        loops: Arc<LoopManager>,
        launcher: Arc<dyn LoopLauncher>,
    ) -> Self {
        Self {
            node: node.into(),
            store,
            loops,
            launcher,
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn store(&self) -> &Arc<AssignmentStore> {
        &self.store
    }

    pub fn loops(&self) -> &Arc<LoopManager> {
        &self.loops
    }

    /// Apply one committed entry
    ///
    /// Never fails: undecodable entries and faults while applying are logged
    /// and reported as [`ApplyOutcome::Ignored`].
    #[instrument(skip_all, fields(node = %self.node, index = entry.index))]
    pub fn apply(&self, entry: &LogEntry) -> ApplyOutcome {
        match self.try_apply(&entry.data) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("fsm: unable to apply log entry: {e}");
                ApplyOutcome::Ignored {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn try_apply(&self, data: &[u8]) -> ClusterResult<ApplyOutcome> {
        let AssignmentCommand { kind, host, config } = AssignmentCommand::decode(data)?;
        info!("fsm: apply {kind:?} {config} → {host}");

        match kind {
            CommandType::AssignConfig => {
                let spawned = self.install(&host, &config)?;
                Ok(ApplyOutcome::Assigned {
                    host,
                    config,
                    spawned,
                })
            }
            CommandType::RemoveConfig => {
                self.store.remove(&host, &config);
                Ok(ApplyOutcome::Removed { host, config })
            }
        }
    }

    /// Install the assignment and start its loop if it belongs to this node
    fn install(&self, host: &str, config: &str) -> ClusterResult<bool> {
        let token = self.store.put(host, config);
        if host != self.node {
            return Ok(false);
        }

        let task = self.launcher.launch(config.to_string(), token.clone());
        self.loops.spawn(config, token, task)?;
        Ok(true)
    }

    /// Serialize the assignment table (tokens are local state and not included)
    pub fn snapshot(&self) -> ClusterResult<Snapshot> {
        info!("fsm: make snapshot");
        let data = serde_json::to_vec(&self.store.dump()).map_err(ClusterError::Encode)?;
        Ok(Snapshot { data })
    }

    /// Replace the table with a snapshot, starting loops as live replication would
    ///
    /// The snapshot is fully decoded before the current table is touched, so a
    /// malformed snapshot leaves the state machine unchanged. Returns the number
    /// of local loops started. A loop that fails to start keeps its table entry,
    /// exactly as in [`ConfigStateMachine::apply`].
    pub fn restore<R: Read>(&self, mut source: R) -> ClusterResult<usize> {
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;

        let table: AssignmentTable = if data.iter().all(u8::is_ascii_whitespace) {
            AssignmentTable::new()
        } else {
            serde_json::from_slice::<Option<AssignmentTable>>(&data)
                .map_err(ClusterError::Snapshot)?
                .unwrap_or_default()
        };

        info!("fsm: restore {} hosts from snapshot", table.len());
        self.store.clear();

        let mut spawned = 0;
        for (host, configs) in &table {
            for config in configs {
                match self.install(host, config) {
                    Ok(true) => spawned += 1,
                    Ok(false) => {}
                    Err(e) => error!("fsm: unable to restore {config} → {host}: {e}"),
                }
            }
        }

        debug!("fsm: restored with {spawned} local loops");
        Ok(spawned)
    }
}
