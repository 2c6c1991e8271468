//! Replicated log payloads

use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandType {
    AssignConfig,
    RemoveConfig,
}

/// One assignment change, the unit of replicated log data
///
/// Commands are self-contained: replaying one yields the same table no matter
/// how often it is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentCommand {
    #[serde(rename = "type")]
    pub kind: CommandType,
    pub host: String,
    pub config: String,
}

impl AssignmentCommand {
    pub fn assign(host: impl Into<String>, config: impl Into<String>) -> Self {
        Self {
            kind: CommandType::AssignConfig,
            host: host.into(),
            config: config.into(),
        }
    }

    pub fn remove(host: impl Into<String>, config: impl Into<String>) -> Self {
        Self {
            kind: CommandType::RemoveConfig,
            host: host.into(),
            config: config.into(),
        }
    }

    pub fn encode(&self) -> ClusterResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(ClusterError::Encode)
    }

    pub fn decode(data: &[u8]) -> ClusterResult<Self> {
        serde_json::from_slice(data).map_err(ClusterError::Decode)
    }
}

/// A committed log entry as delivered by the consensus layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub index: u64,
    pub term: u64,
    pub data: Vec<u8>,
}

impl LogEntry {
    pub fn new(index: u64, term: u64, data: Vec<u8>) -> Self {
        Self { index, term, data }
    }

    /// Encode `command` into an entry
    pub fn from_command(index: u64, term: u64, command: &AssignmentCommand) -> ClusterResult<Self> {
        Ok(Self::new(index, term, command.encode()?))
    }
}
