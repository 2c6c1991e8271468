//! Registry of the dispatch loops running on this node

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;

use super::stats::{ClientStats, StatsSnapshot};

/// Running loops keyed by config name
///
/// Constructed once per node and shared by reference with every loop.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    clients: RwLock<HashMap<String, Arc<ClientStats>>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, config: &str, stats: Arc<ClientStats>) {
        trace!(config, "register dispatch loop");
        self.clients.write().insert(config.to_string(), stats);
    }

    /// Drop `config`, but only if `stats` is still the registered instance
    ///
    /// A replacement loop may have registered itself before the old one
    /// finished unwinding.
    pub fn unregister(&self, config: &str, stats: &Arc<ClientStats>) {
        let mut clients = self.clients.write();
        if clients
            .get(config)
            .is_some_and(|current| Arc::ptr_eq(current, stats))
        {
            trace!(config, "unregister dispatch loop");
            clients.remove(config);
        }
    }

    pub fn snapshot(&self) -> BTreeMap<String, StatsSnapshot> {
        self.clients
            .read()
            .iter()
            .map(|(config, stats)| (config.clone(), stats.snapshot()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
