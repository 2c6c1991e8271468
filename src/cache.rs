//! Expiring cache with staged eviction
//!
//! A value moves through three stages after it was written:
//!
//! ```text
//! [0, ttl)                      fresh, served
//! [ttl, ttl + cleanup_after)    stale, still served
//! [ttl + cleanup_after, ...)    expired, refetched on access and removed by the sweep
//! ```
//!
//! Serving stale values keeps callers working while the fetch source (an
//! inventory service, for instance) is briefly unavailable.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval};
use tracing::{debug, trace};

use crate::config::CacheConfig;

/// Freshness of a cached value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Fresh,
    Stale,
}

struct Entry<V> {
    value: V,
    written: Instant,
}

struct CacheStore<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    ttl: Duration,
    cleanup_after: Duration,
}

impl<V> CacheStore<V> {
    fn state_of(&self, entry: &Entry<V>, now: Instant) -> Option<EntryState> {
        let age = now.saturating_duration_since(entry.written);
        if age < self.ttl {
            Some(EntryState::Fresh)
        } else if age < self.ttl + self.cleanup_after {
            Some(EntryState::Stale)
        } else {
            None
        }
    }

    async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| self.state_of(entry, now).is_some());
        before - entries.len()
    }
}

/// Cache with a background sweep task
///
/// Must be created inside a tokio runtime. The sweep task only holds a weak
/// reference and is aborted when the cache is dropped.
pub struct TtlCache<V> {
    store: Arc<CacheStore<V>>,
    sweeper: JoinHandle<()>,
}

impl<V> TtlCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, cleanup_interval: Duration, cleanup_after: Duration) -> Self {
        let store = Arc::new(CacheStore {
            entries: RwLock::new(HashMap::new()),
            ttl,
            cleanup_after,
        });

        let sweeper = tokio::spawn(sweep_loop(
            Arc::downgrade(&store),
            cleanup_interval.max(Duration::from_millis(1)),
        ));

        Self { store, sweeper }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.ttl(),
            config.cleanup_interval(),
            config.cleanup_after(),
        )
    }

    /// Return the cached value for `key`, calling `fetch` only if there is none
    ///
    /// Stale values are returned as-is. Concurrent misses for the same key may
    /// each call their `fetch`; fetch functions are expected to be idempotent.
    /// A failed fetch is not cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, namespace: &str, key: &str, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        {
            let entries = self.store.entries.read().await;
            if let Some(entry) = entries.get(key) {
                match self.store.state_of(entry, Instant::now()) {
                    Some(EntryState::Fresh) => {
                        trace!(namespace, key, "cache hit");
                        return Ok(entry.value.clone());
                    }
                    Some(EntryState::Stale) => {
                        trace!(namespace, key, "serving stale value");
                        return Ok(entry.value.clone());
                    }
                    None => {}
                }
            }
        }

        trace!(namespace, key, "cache miss, fetching");
        let value = fetch().await?;

        self.store.entries.write().await.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                written: Instant::now(),
            },
        );

        Ok(value)
    }

    /// Drop `key` regardless of its age
    pub async fn delete(&self, key: &str) {
        self.store.entries.write().await.remove(key);
    }

    /// Freshness of `key`, `None` if absent or expired
    pub async fn state(&self, key: &str) -> Option<EntryState> {
        let entries = self.store.entries.read().await;
        entries
            .get(key)
            .and_then(|entry| self.store.state_of(entry, Instant::now()))
    }

    /// Number of stored entries, including expired ones not yet swept
    pub async fn len(&self) -> usize {
        self.store.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<V> Drop for TtlCache<V> {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}

async fn sweep_loop<V>(store: Weak<CacheStore<V>>, period: Duration) {
    let mut ticker = interval(period);
    // first tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let Some(store) = store.upgrade() else {
            break;
        };

        let removed = store.sweep().await;
        if removed > 0 {
            debug!("cache sweep removed {removed} expired entries");
        }
    }
}
