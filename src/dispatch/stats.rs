//! Per-phase call counters

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Success/failure counters of one dispatch loop
#[derive(Debug, Default)]
pub struct ClientStats {
    success_parsing: AtomicU64,
    failed_parsing: AtomicU64,
    success_aggregate: AtomicU64,
    failed_aggregate: AtomicU64,
}

impl ClientStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_success_parsing(&self) {
        self.success_parsing.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_failed_parsing(&self) {
        self.failed_parsing.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_success_aggregate(&self) {
        self.success_aggregate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_failed_aggregate(&self) {
        self.failed_aggregate.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success_parsing(&self) -> u64 {
        self.success_parsing.load(Ordering::Relaxed)
    }

    pub fn failed_parsing(&self) -> u64 {
        self.failed_parsing.load(Ordering::Relaxed)
    }

    pub fn success_aggregate(&self) -> u64 {
        self.success_aggregate.load(Ordering::Relaxed)
    }

    pub fn failed_aggregate(&self) -> u64 {
        self.failed_aggregate.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            success_parsing: self.success_parsing(),
            failed_parsing: self.failed_parsing(),
            success_aggregate: self.success_aggregate(),
            failed_aggregate: self.failed_aggregate(),
        }
    }
}

/// Point-in-time copy of [`ClientStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub success_parsing: u64,
    pub failed_parsing: u64,
    pub success_aggregate: u64,
    pub failed_aggregate: u64,
}
