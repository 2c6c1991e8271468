//! Dispatch loops for the configs assigned to this node
//!
//! Each assigned config gets one loop ([`run_session_loop`]) driving a
//! [`Dispatcher`]. Every iteration reloads its [`SessionParams`], fans parsing
//! tasks out to workers under a concurrency cap, then hands the merged result to
//! one aggregation task per aggregation config.
//!
//! Running loops are visible through the [`ObserverRegistry`].

mod dispatcher;
mod observer;
mod runner;
mod session;
mod stats;

pub use dispatcher::{Context, Dispatcher, IterationReport};
pub use observer::ObserverRegistry;
pub use runner::{SessionLauncher, run_session_loop};
pub use session::{SessionParams, update_session_params};
pub use stats::{ClientStats, StatsSnapshot};
