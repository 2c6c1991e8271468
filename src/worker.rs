//! Remote workers offering the parsing and aggregation capabilities
//!
//! The dispatcher only sees the [`Resolver`] and [`Worker`] traits. The HTTP
//! implementation posts JSON tasks to `/v1/parsing` and `/v1/aggregating` on
//! the resolved worker host.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::trace;

use crate::error::DispatchError;
use crate::tasks::{AggregationTask, ParsingResponse, ParsingResult, ParsingTask};

/// Capability name of parsing workers
pub const PARSING: &str = "parsing";

/// Capability name of aggregation workers
pub const AGGREGATE: &str = "aggregating";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait Worker: Send + Sync {
    /// Where the worker lives, for logs
    fn footprint(&self) -> String;

    async fn do_parsing(&self, task: &ParsingTask) -> Result<ParsingResult, DispatchError>;

    async fn do_aggregating(&self, task: &AggregationTask) -> Result<(), DispatchError>;
}

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Pick a worker offering `capability` among `hosts`
    async fn resolve(&self, capability: &str, hosts: &[String]) -> Result<Arc<dyn Worker>, DispatchError>;
}

/// Round-robin resolver over HTTP workers
pub struct HttpResolver {
    client: reqwest::Client,
    port: u16,
    cursor: AtomicUsize,
}

impl HttpResolver {
    /// `call_timeout` bounds every request, including large task uploads
    pub fn new(port: u16, call_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(call_timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            port,
            cursor: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Resolver for HttpResolver {
    async fn resolve(&self, capability: &str, hosts: &[String]) -> Result<Arc<dyn Worker>, DispatchError> {
        if hosts.is_empty() {
            return Err(DispatchError::resolve(capability, "no candidate hosts"));
        }

        let host = &hosts[self.cursor.fetch_add(1, Ordering::Relaxed) % hosts.len()];
        trace!("resolved {capability} to {host}");

        Ok(Arc::new(HttpWorker {
            client: self.client.clone(),
            base_url: format!("http://{host}:{}", self.port),
        }))
    }
}

pub struct HttpWorker {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWorker {
    async fn post<T: serde::Serialize + Sync>(
        &self,
        endpoint: &str,
        task: &T,
    ) -> Result<reqwest::Response, DispatchError> {
        let body = serde_json::to_vec(task)?;

        let response = self
            .client
            .post(format!("{}/v1/{endpoint}", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| DispatchError::call(&self.base_url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(DispatchError::call(
                &self.base_url,
                format!("HTTP error: {}", response.status()),
            ));
        }

        Ok(response)
    }
}

#[async_trait]
impl Worker for HttpWorker {
    fn footprint(&self) -> String {
        self.base_url.clone()
    }

    async fn do_parsing(&self, task: &ParsingTask) -> Result<ParsingResult, DispatchError> {
        let response = self.post(PARSING, task).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| DispatchError::call(&self.base_url, e.to_string()))?;

        let parsed: ParsingResponse = serde_json::from_slice(&body)?;
        Ok(parsed.data)
    }

    async fn do_aggregating(&self, task: &AggregationTask) -> Result<(), DispatchError> {
        self.post(AGGREGATE, task).await?;
        Ok(())
    }
}
