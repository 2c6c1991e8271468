//! Read-only access to monitoring configs
//!
//! ## Backends
//!
//! - **Filesystem** (`FsRepository`): one JSON document per config
//! - **In-Memory** (`MemoryRepository`): for tests and embedding

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::config::{AggregationConfig, GlobalConfig, ParsingConfig};
use crate::error::{RepositoryError, RepositoryResult};

const PARSING_DIR: &str = "parsing";
const AGGREGATE_DIR: &str = "aggregate";
const GLOBAL_FILE: &str = "global.json";

#[async_trait]
pub trait Repository: Send + Sync {
    async fn parsing_config(&self, name: &str) -> RepositoryResult<ParsingConfig>;

    async fn aggregation_config(&self, name: &str) -> RepositoryResult<AggregationConfig>;

    async fn global_config(&self) -> RepositoryResult<GlobalConfig>;

    async fn list_parsing_configs(&self) -> RepositoryResult<Vec<String>>;

    /// Every aggregation config named by `parsing`
    async fn aggregation_configs(
        &self,
        parsing: &ParsingConfig,
    ) -> RepositoryResult<HashMap<String, AggregationConfig>> {
        let mut configs = HashMap::with_capacity(parsing.agg_configs.len());
        for name in &parsing.agg_configs {
            configs.insert(name.clone(), self.aggregation_config(name).await?);
        }
        Ok(configs)
    }
}

/// Repository laid out as
///
/// ```text
/// <root>/global.json
/// <root>/parsing/<name>.json
/// <root>/aggregate/<name>.json
/// ```
#[derive(Debug, Clone)]
pub struct FsRepository {
    root: PathBuf,
}

impl FsRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn config_path(&self, dir: &str, name: &str) -> PathBuf {
        self.root.join(dir).join(format!("{name}.json"))
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path, name: &str) -> RepositoryResult<T> {
    trace!("reading {}", path.display());

    let content = tokio::fs::read(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => RepositoryError::NotFound(name.to_string()),
        _ => RepositoryError::Io(e),
    })?;

    serde_json::from_slice(&content).map_err(|source| RepositoryError::Malformed {
        name: name.to_string(),
        source,
    })
}

#[async_trait]
impl Repository for FsRepository {
    async fn parsing_config(&self, name: &str) -> RepositoryResult<ParsingConfig> {
        read_json(&self.config_path(PARSING_DIR, name), name).await
    }

    async fn aggregation_config(&self, name: &str) -> RepositoryResult<AggregationConfig> {
        read_json(&self.config_path(AGGREGATE_DIR, name), name).await
    }

    async fn global_config(&self) -> RepositoryResult<GlobalConfig> {
        match read_json(&self.root.join(GLOBAL_FILE), GLOBAL_FILE).await {
            Err(RepositoryError::NotFound(_)) => {
                debug!("no {GLOBAL_FILE} in repository, using defaults");
                Ok(GlobalConfig::default())
            }
            other => other,
        }
    }

    async fn list_parsing_configs(&self) -> RepositoryResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(self.root.join(PARSING_DIR)).await?;
        let mut names = vec![];

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort();
        Ok(names)
    }
}

/// In-memory repository
#[derive(Debug, Default)]
pub struct MemoryRepository {
    parsing: RwLock<HashMap<String, ParsingConfig>>,
    aggregation: RwLock<HashMap<String, AggregationConfig>>,
    global: RwLock<GlobalConfig>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_parsing(&self, name: impl Into<String>, config: ParsingConfig) {
        self.parsing.write().insert(name.into(), config);
    }

    pub fn insert_aggregation(&self, name: impl Into<String>, config: AggregationConfig) {
        self.aggregation.write().insert(name.into(), config);
    }

    pub fn set_global(&self, config: GlobalConfig) {
        *self.global.write() = config;
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn parsing_config(&self, name: &str) -> RepositoryResult<ParsingConfig> {
        self.parsing
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(name.to_string()))
    }

    async fn aggregation_config(&self, name: &str) -> RepositoryResult<AggregationConfig> {
        self.aggregation
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(name.to_string()))
    }

    async fn global_config(&self) -> RepositoryResult<GlobalConfig> {
        Ok(self.global.read().clone())
    }

    async fn list_parsing_configs(&self) -> RepositoryResult<Vec<String>> {
        let mut names: Vec<String> = self.parsing.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
