//! ReplicaActor - applies committed log entries one at a time
//!
//! The consensus layer (or, on a standalone node, [`ReplicaHandle::submit`])
//! feeds entries through a single mpsc channel. The actor owns the state
//! machine and is the only caller of `apply`, so commands are applied strictly
//! sequentially and in delivery order.
//!
//! ## Message Flow
//!
//! ```text
//! consensus → Apply(entry) → ReplicaActor → ConfigStateMachine::apply → ApplyOutcome
//!                 ↑
//!                 └─── Commands (Snapshot, Restore, Shutdown)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, trace, warn};

use crate::error::{ClusterError, ClusterResult};

use super::command::{AssignmentCommand, LogEntry};
use super::fsm::{ApplyOutcome, ConfigStateMachine, Snapshot};

/// Commands that can be sent to a ReplicaActor
#[derive(Debug)]
pub enum ReplicaCommand {
    /// Apply one committed entry
    Apply {
        entry: LogEntry,
        respond_to: oneshot::Sender<ApplyOutcome>,
    },

    /// Serialize the current assignment table
    Snapshot {
        respond_to: oneshot::Sender<ClusterResult<Snapshot>>,
    },

    /// Replace the assignment table with a snapshot
    Restore {
        data: Vec<u8>,
        respond_to: oneshot::Sender<ClusterResult<usize>>,
    },

    /// Stop applying entries; running loops are left to the loop manager
    Shutdown,
}

pub struct ReplicaActor {
    fsm: Arc<ConfigStateMachine>,

    command_rx: mpsc::Receiver<ReplicaCommand>,
}

impl ReplicaActor {
    pub fn new(fsm: Arc<ConfigStateMachine>, command_rx: mpsc::Receiver<ReplicaCommand>) -> Self {
        Self { fsm, command_rx }
    }

    #[instrument(skip(self), fields(node = %self.fsm.node()))]
    pub async fn run(mut self) {
        debug!("starting replica actor");

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                ReplicaCommand::Apply { entry, respond_to } => {
                    trace!("applying entry {}", entry.index);
                    let outcome = self.fsm.apply(&entry);
                    let _ = respond_to.send(outcome);
                }

                ReplicaCommand::Snapshot { respond_to } => {
                    let _ = respond_to.send(self.fsm.snapshot());
                }

                ReplicaCommand::Restore { data, respond_to } => {
                    let result = self.fsm.restore(data.as_slice());
                    if let Err(e) = &result {
                        warn!("restore failed: {e}");
                    }
                    let _ = respond_to.send(result);
                }

                ReplicaCommand::Shutdown => {
                    debug!("received shutdown command");
                    break;
                }
            }
        }

        debug!("replica actor stopped");
    }
}

/// Handle for feeding a ReplicaActor
///
/// Cheap to clone. `submit` stands in for the consensus layer on a standalone
/// node: it numbers commands itself and applies them directly.
#[derive(Clone)]
pub struct ReplicaHandle {
    sender: mpsc::Sender<ReplicaCommand>,
    next_index: Arc<AtomicU64>,
}

impl ReplicaHandle {
    pub fn spawn(fsm: Arc<ConfigStateMachine>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        let actor = ReplicaActor::new(fsm, cmd_rx);
        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            next_index: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Apply a committed entry and wait for its outcome
    pub async fn apply(&self, entry: LogEntry) -> ClusterResult<ApplyOutcome> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ReplicaCommand::Apply {
                entry,
                respond_to: tx,
            })
            .await
            .map_err(|_| ClusterError::ReplicaClosed)?;

        rx.await.map_err(|_| ClusterError::ReplicaClosed)
    }

    /// Append `command` to the local log and apply it
    pub async fn submit(&self, command: &AssignmentCommand) -> ClusterResult<ApplyOutcome> {
        let index = self.next_index.fetch_add(1, Ordering::SeqCst);
        self.apply(LogEntry::from_command(index, 1, command)?).await
    }

    pub async fn snapshot(&self) -> ClusterResult<Snapshot> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ReplicaCommand::Snapshot { respond_to: tx })
            .await
            .map_err(|_| ClusterError::ReplicaClosed)?;

        rx.await.map_err(|_| ClusterError::ReplicaClosed)?
    }

    pub async fn restore(&self, data: Vec<u8>) -> ClusterResult<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ReplicaCommand::Restore {
                data,
                respond_to: tx,
            })
            .await
            .map_err(|_| ClusterError::ReplicaClosed)?;

        rx.await.map_err(|_| ClusterError::ReplicaClosed)?
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(ReplicaCommand::Shutdown).await;
    }
}
