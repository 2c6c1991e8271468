//! Host → config → cancellation token table
//!
//! Every running dispatch loop holds a clone of exactly one token that is (or
//! was) a member of this table. Cancelling that token is the only way a loop is
//! told to stop, so replacing or removing an entry always cancels the old token.

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Exported table shape: host → assigned config names
///
/// An empty table is exported as an empty map, never as null.
pub type AssignmentTable = BTreeMap<String, Vec<String>>;

#[derive(Debug, Default)]
pub struct AssignmentStore {
    hosts: RwLock<HashMap<String, HashMap<String, CancellationToken>>>,
}

impl AssignmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `config` to `host`, returning the token of the new assignment
    ///
    /// A previous token for the same pair is cancelled first, which stops the
    /// loop it belonged to.
    pub fn put(&self, host: &str, config: &str) -> CancellationToken {
        let token = CancellationToken::new();
        let mut hosts = self.hosts.write();

        let previous = hosts
            .entry(host.to_string())
            .or_default()
            .insert(config.to_string(), token.clone());

        if let Some(previous) = previous {
            trace!(host, config, "replacing assignment, stopping previous loop");
            previous.cancel();
        }

        token
    }

    /// Drop the assignment, cancelling its token; no-op if absent
    pub fn remove(&self, host: &str, config: &str) {
        let mut hosts = self.hosts.write();

        let Some(configs) = hosts.get_mut(host) else {
            return;
        };

        if let Some(token) = configs.remove(config) {
            token.cancel();
        }

        if configs.is_empty() {
            hosts.remove(host);
        }
    }

    /// Config names currently assigned to `host`, in no particular order
    pub fn list(&self, host: &str) -> Vec<String> {
        self.hosts
            .read()
            .get(host)
            .map(|configs| configs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Token of the current assignment, if any
    pub fn token(&self, host: &str, config: &str) -> Option<CancellationToken> {
        self.hosts
            .read()
            .get(host)
            .and_then(|configs| configs.get(config))
            .cloned()
    }

    /// Export the table without tokens
    pub fn dump(&self) -> AssignmentTable {
        self.hosts
            .read()
            .iter()
            .filter(|(_, configs)| !configs.is_empty())
            .map(|(host, configs)| {
                let mut names: Vec<String> = configs.keys().cloned().collect();
                names.sort();
                (host.clone(), names)
            })
            .collect()
    }

    /// Cancel every assignment and install `table` with fresh tokens
    pub fn replace(&self, table: &AssignmentTable) {
        let mut hosts = self.hosts.write();
        cancel_all(&mut hosts);

        for (host, configs) in table {
            for config in configs {
                hosts
                    .entry(host.clone())
                    .or_default()
                    .insert(config.clone(), CancellationToken::new());
            }
        }
    }

    /// Cancel and drop every assignment
    pub fn clear(&self) {
        cancel_all(&mut self.hosts.write());
    }

    /// Number of configs assigned to every host
    pub fn distribution(&self) -> Vec<(String, usize)> {
        let mut distribution: Vec<(String, usize)> = self
            .hosts
            .read()
            .iter()
            .map(|(host, configs)| (host.clone(), configs.len()))
            .collect();
        distribution.sort();
        distribution
    }

    /// Total number of assignments
    pub fn len(&self) -> usize {
        self.hosts.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cancel_all(hosts: &mut HashMap<String, HashMap<String, CancellationToken>>) {
    for (_, configs) in hosts.drain() {
        for (_, token) in configs {
            token.cancel();
        }
    }
}
