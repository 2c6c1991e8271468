//! Task payloads exchanged with parsing and aggregation workers

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Merged parsing output: host → serialized per-host metrics
pub type ParsingResult = HashMap<String, Vec<u8>>;

/// The metrics window a parsing/aggregation pass covers (epoch seconds)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFrame {
    pub previous: i64,
    pub current: i64,
}

/// Parse one host for one parsing config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsingTask {
    /// Iteration id
    pub id: String,

    pub frame: TimeFrame,

    /// Hostname of the target
    pub host: String,

    pub parsing_config_name: String,

    /// Serialized parsing config
    pub parsing_config: Vec<u8>,

    /// Serialized aggregation configs related to the parsing config
    pub aggregation_configs: HashMap<String, Vec<u8>>,
}

/// Aggregate the merged parsing result with one aggregation config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregationTask {
    /// Iteration id
    pub id: String,

    pub frame: TimeFrame,

    /// Name of the aggregation config
    pub config: String,

    pub parsing_config_name: String,

    /// Serialized parsing config
    pub parsing_config: Vec<u8>,

    /// Serialized aggregation config
    pub aggregation_config: Vec<u8>,

    /// Serialized list of parsed hosts
    pub hosts: Vec<u8>,

    /// Shared by every aggregation task of an iteration
    pub parsing_result: Arc<ParsingResult>,
}

/// Wire shape of a parsing response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsingResponse {
    #[serde(default)]
    pub data: ParsingResult,
}
