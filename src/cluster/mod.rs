//! Replicated config assignment
//!
//! Every config is owned by exactly one cluster node at a time. Ownership
//! changes travel through the replicated log as [`AssignmentCommand`]s; each
//! replica applies them to its own [`AssignmentStore`] and starts or stops the
//! dispatch loops that belong to its node.
//!
//! ```text
//!   consensus layer (committed entries, total order)
//!            │
//!   ┌────────▼────────┐
//!   │  ReplicaActor   │  one entry at a time
//!   └────────┬────────┘
//!   ┌────────▼────────────┐      ┌──────────────┐
//!   │ ConfigStateMachine  │─────►│ LoopManager  │── spawn(config, token)
//!   └────────┬────────────┘      └──────────────┘
//!   ┌────────▼────────┐
//!   │ AssignmentStore │  host → config → CancellationToken
//!   └─────────────────┘
//! ```

pub mod command;
pub mod fsm;
pub mod lifecycle;
pub mod replica;
pub mod store;

pub use command::{AssignmentCommand, CommandType, LogEntry};
pub use fsm::{ApplyOutcome, ConfigStateMachine, LoopLauncher, Snapshot};
pub use lifecycle::LoopManager;
pub use replica::ReplicaHandle;
pub use store::{AssignmentStore, AssignmentTable};
