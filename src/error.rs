//! Error types for cluster state, dispatching and the config repository

use thiserror::Error;

/// Result type alias for state machine operations
pub type ClusterResult<T> = Result<T, ClusterError>;

/// Errors raised by the replicated assignment state machine
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Log entry payload could not be decoded into a command
    #[error("bad replicated command: {0}")]
    Decode(#[source] serde_json::Error),

    /// Command or snapshot could not be encoded
    #[error("failed to encode: {0}")]
    Encode(#[source] serde_json::Error),

    /// Snapshot body is not a valid assignment table
    #[error("malformed snapshot: {0}")]
    Snapshot(#[source] serde_json::Error),

    /// Snapshot sink or source failed
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A dispatch loop was requested outside of a tokio runtime
    #[error("cannot spawn dispatch loop for '{config}': no tokio runtime")]
    NoRuntime { config: String },

    /// The replica actor is gone
    #[error("replica actor is not running")]
    ReplicaClosed,
}

/// Result type alias for config repository operations
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors raised by a config repository
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Requested config does not exist
    #[error("config '{0}' not found")]
    NotFound(String),

    /// Config exists but cannot be decoded
    #[error("malformed config '{name}': {source}")]
    Malformed {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// I/O error (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while preparing or executing one dispatch iteration
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Parsing, global or aggregation config could not be loaded
    #[error("unable to load config '{config}': {source}")]
    ConfigLoad {
        config: String,
        #[source]
        source: RepositoryError,
    },

    /// Host groups resolved to an empty host list
    #[error("no hosts in given groups for config '{config}'")]
    NoHosts { config: String },

    /// No worker host is known to this node
    #[error("the list of worker hosts is empty")]
    NoWorkers,

    /// No host fetcher could be built for the config
    #[error("unable to construct host fetcher: {0}")]
    Fetcher(String),

    /// No reachable worker offers the capability
    #[error("unable to resolve worker for '{capability}': {message}")]
    Resolve { capability: String, message: String },

    /// The remote call failed or timed out
    #[error("call to worker {worker} failed: {message}")]
    Call { worker: String, message: String },

    /// Task payload encode/decode failure
    #[error("task serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DispatchError {
    /// Create a config load error
    pub fn config_load(config: impl Into<String>, source: RepositoryError) -> Self {
        Self::ConfigLoad {
            config: config.into(),
            source,
        }
    }

    /// Create a resolver error
    pub fn resolve(capability: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolve {
            capability: capability.into(),
            message: message.into(),
        }
    }

    /// Create a remote call error
    pub fn call(worker: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Call {
            worker: worker.into(),
            message: message.into(),
        }
    }
}
