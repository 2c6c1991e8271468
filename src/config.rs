use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

/// How the hosts of a parsing config's groups are discovered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FetcherConfig {
    /// Static group → hosts table
    Predefined {
        #[serde(default)]
        clusters: HashMap<String, Vec<String>>,
    },

    /// HTTP endpoint returning one hostname per line
    Http {
        /// URL template, `{group}` is replaced with the group name
        url: String,
    },
}

/// Cache tuning for memoized host lookups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Seconds a value is considered fresh
    #[serde(default = "default_cache_ttl")]
    pub ttl: u64,

    /// Seconds between two sweeps
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval: u64,

    /// Seconds a stale value is still served after `ttl`
    #[serde(default = "default_cleanup_after")]
    pub cleanup_after: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: default_cache_ttl(),
            cleanup_interval: default_cleanup_interval(),
            cleanup_after: default_cleanup_after(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval)
    }

    pub fn cleanup_after(&self) -> Duration {
        Duration::from_secs(self.cleanup_after)
    }
}

fn default_cache_ttl() -> u64 {
    600
}

fn default_cleanup_interval() -> u64 {
    1200
}

fn default_cleanup_after() -> u64 {
    1200
}

/// Cluster-wide defaults applied to every parsing config
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default iteration duration in seconds
    #[serde(default = "default_iteration_duration")]
    pub iteration_duration: u64,

    /// Default cap for parallel parsing calls (0 = unbounded)
    #[serde(default)]
    pub parallel_parsings: usize,

    /// Default host fetcher
    #[serde(default)]
    pub host_fetcher: Option<FetcherConfig>,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            iteration_duration: default_iteration_duration(),
            parallel_parsings: 0,
            host_fetcher: None,
            cache: CacheConfig::default(),
        }
    }
}

fn default_iteration_duration() -> u64 {
    60
}

/// A monitoring config: which hosts to parse and how to aggregate them
///
/// Keys this crate does not know about are kept in `extra` and forwarded to
/// workers untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsingConfig {
    #[serde(default)]
    pub groups: Vec<String>,

    #[serde(default)]
    pub metahost: String,

    /// Names of the aggregation configs applied to the parsing result
    #[serde(default)]
    pub agg_configs: Vec<String>,

    /// Cap for parallel parsing calls (0 = take the global default)
    #[serde(default)]
    pub parallel_parsings: usize,

    /// Iteration duration in seconds (0 = take the global default)
    #[serde(default)]
    pub iteration_duration: u64,

    #[serde(default)]
    pub host_fetcher: Option<FetcherConfig>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ParsingConfig {
    /// Fill every unset field from the cluster-wide defaults
    pub fn update_by_global(&mut self, global: &GlobalConfig) {
        if self.iteration_duration == 0 {
            self.iteration_duration = global.iteration_duration;
        }
        if self.iteration_duration == 0 {
            warn!(
                "iteration duration of 0s is not allowed, using {}s",
                default_iteration_duration()
            );
            self.iteration_duration = default_iteration_duration();
        }
        if self.parallel_parsings == 0 {
            self.parallel_parsings = global.parallel_parsings;
        }
        if self.host_fetcher.is_none() {
            self.host_fetcher = global.host_fetcher.clone();
        }
        if self.metahost.is_empty() {
            if let Some(group) = self.groups.first() {
                self.metahost = group.clone();
            }
        }
    }
}

/// Opaque aggregation config, forwarded to workers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

/// Configuration of one cluster node
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Node identity; falls back to `GUARDIA_NODE` and then the hostname
    pub name: Option<String>,

    /// Root directory of the config repository
    pub repository: PathBuf,

    /// Hosts running parsing/aggregation workers
    #[serde(default)]
    pub workers: Vec<String>,

    #[serde(default = "default_worker_port")]
    pub worker_port: u16,

    /// Per-call timeout for worker requests in seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout: u64,

    /// Seconds a dispatch loop waits after a failed iteration
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Assign every repository config to this node on startup
    #[serde(default)]
    pub bootstrap: bool,

    /// Stats API bind address (API disabled if absent)
    pub api: Option<SocketAddr>,
}

fn default_worker_port() -> u16 {
    10052
}

fn default_call_timeout() -> u64 {
    60
}

fn default_retry_delay() -> u64 {
    5
}

pub fn read_config_file(path: &str) -> anyhow::Result<NodeConfig> {
    let file_content = std::fs::read_to_string(path)?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
