//! Host discovery for parsing config groups
//!
//! A parsing config lists host groups; a [`HostFetcher`] turns one group into
//! hostnames. Which fetcher is used is declared per config (`host_fetcher`) or
//! globally, and built by a [`FetcherLoader`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tracing::{instrument, trace};

use crate::cache::TtlCache;
use crate::config::FetcherConfig;
use crate::error::DispatchError;

#[async_trait]
pub trait HostFetcher: Send + Sync {
    async fn fetch(&self, group: &str) -> Result<Vec<String>>;
}

/// Builds the fetcher a parsing config asks for
pub trait FetcherLoader: Send + Sync {
    fn load(&self, config: Option<&FetcherConfig>) -> Result<Arc<dyn HostFetcher>, DispatchError>;
}

/// Static group → hosts table from the config itself
#[derive(Debug, Clone, Default)]
pub struct PredefinedFetcher {
    clusters: HashMap<String, Vec<String>>,
}

impl PredefinedFetcher {
    pub fn new(clusters: HashMap<String, Vec<String>>) -> Self {
        Self { clusters }
    }
}

#[async_trait]
impl HostFetcher for PredefinedFetcher {
    async fn fetch(&self, group: &str) -> Result<Vec<String>> {
        self.clusters
            .get(group)
            .cloned()
            .ok_or_else(|| anyhow!("group '{group}' is not predefined"))
    }
}

/// Fetches `url` (with `{group}` substituted) and reads one hostname per line
///
/// Responses are memoized in the shared cache, so a flapping inventory keeps
/// serving the last known host list.
pub struct HttpFetcher {
    client: reqwest::Client,
    url: String,
    cache: Arc<TtlCache<Vec<String>>>,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, url: impl Into<String>, cache: Arc<TtlCache<Vec<String>>>) -> Self {
        Self {
            client,
            url: url.into(),
            cache,
        }
    }
}

#[async_trait]
impl HostFetcher for HttpFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, group: &str) -> Result<Vec<String>> {
        let url = self.url.replace("{group}", group);
        self.cache
            .get_or_fetch("http-fetcher", &url, || request_hosts(&self.client, &url))
            .await
    }
}

async fn request_hosts(client: &reqwest::Client, url: &str) -> Result<Vec<String>> {
    trace!("requesting hosts from {url}");

    let response = client
        .get(url)
        .send()
        .await
        .context("failed to send HTTP request")?;

    if !response.status().is_success() {
        anyhow::bail!("HTTP error: {}", response.status());
    }

    let body = response
        .text()
        .await
        .context("failed to read response body")?;

    Ok(parse_host_list(&body))
}

fn parse_host_list(body: &str) -> Vec<String> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Default loader: predefined tables and cached HTTP lookups
pub struct FetcherFactory {
    client: reqwest::Client,
    cache: Arc<TtlCache<Vec<String>>>,
}

impl FetcherFactory {
    pub fn new(cache: Arc<TtlCache<Vec<String>>>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client, cache })
    }
}

impl FetcherLoader for FetcherFactory {
    fn load(&self, config: Option<&FetcherConfig>) -> Result<Arc<dyn HostFetcher>, DispatchError> {
        match config {
            Some(FetcherConfig::Predefined { clusters }) => {
                Ok(Arc::new(PredefinedFetcher::new(clusters.clone())))
            }
            Some(FetcherConfig::Http { url }) => Ok(Arc::new(HttpFetcher::new(
                self.client.clone(),
                url.clone(),
                self.cache.clone(),
            ))),
            None => Err(DispatchError::Fetcher(
                "no host fetcher configured".to_string(),
            )),
        }
    }
}
