//! API shared state

use std::sync::Arc;

use crate::cluster::{AssignmentStore, LoopManager};
use crate::dispatch::ObserverRegistry;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Name of this node
    pub node: String,

    /// Replicated assignment table
    pub store: Arc<AssignmentStore>,

    /// Counters of the loops running here
    pub observer: Arc<ObserverRegistry>,

    pub loops: Arc<LoopManager>,
}

impl ApiState {
    pub fn new(
        node: impl Into<String>,
        store: Arc<AssignmentStore>,
        observer: Arc<ObserverRegistry>,
        loops: Arc<LoopManager>,
    ) -> Self {
        Self {
            node: node.into(),
            store,
            observer,
            loops,
        }
    }
}
