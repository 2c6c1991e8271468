//! Per-iteration session parameters
//!
//! Recomputed at the start of every iteration so that config edits, new global
//! defaults and changes in the host inventory are picked up without restarting
//! the loop.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::error::DispatchError;
use crate::hosts::FetcherLoader;
use crate::repository::Repository;
use crate::tasks::{AggregationTask, ParsingTask};
use crate::util::session_time_frame;

/// Everything one iteration needs, with tasks not yet stamped
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionParams {
    /// Upper bound on in-flight parsing calls, at least 1
    pub parallel_parsings: usize,

    /// Budget of the parsing phase
    pub parsing_time: Duration,

    /// Budget of the whole iteration
    pub whole_time: Duration,

    /// One task per resolved host
    pub parsing_tasks: Vec<ParsingTask>,

    /// One task per aggregation config
    pub aggregation_tasks: Vec<AggregationTask>,
}

/// Load `config` and resolve its hosts into fresh session parameters
#[instrument(skip(repository, fetchers))]
pub async fn update_session_params(
    config: &str,
    repository: &dyn Repository,
    fetchers: &dyn FetcherLoader,
) -> Result<SessionParams, DispatchError> {
    info!("updating session parameters");

    let mut parsing_config = repository
        .parsing_config(config)
        .await
        .map_err(|e| DispatchError::config_load(config, e))?;

    let global = repository
        .global_config()
        .await
        .map_err(|e| DispatchError::config_load(config, e))?;
    parsing_config.update_by_global(&global);

    let aggregation_configs = repository
        .aggregation_configs(&parsing_config)
        .await
        .map_err(|e| DispatchError::config_load(config, e))?;

    debug!(
        groups = ?parsing_config.groups,
        metahost = %parsing_config.metahost,
        "updating config"
    );

    let fetcher = fetchers.load(parsing_config.host_fetcher.as_ref())?;

    let mut all_hosts = BTreeSet::new();
    for group in &parsing_config.groups {
        match fetcher.fetch(group).await {
            Ok(hosts) => all_hosts.extend(hosts),
            Err(e) => warn!(group = %group, "unable to get hosts: {e:#}"),
        }
    }

    if all_hosts.is_empty() {
        warn!(groups = ?parsing_config.groups, "no hosts in given groups");
        return Err(DispatchError::NoHosts {
            config: config.to_string(),
        });
    }
    let hosts: Vec<String> = all_hosts.into_iter().collect();
    debug!("hosts: {hosts:?}");

    let mut parallel_parsings = hosts.len();
    if parsing_config.parallel_parsings > 0 {
        parallel_parsings = parallel_parsings.min(parsing_config.parallel_parsings);
    }

    let encoded_parsing = serde_json::to_vec(&parsing_config)?;
    let mut encoded_aggregations = HashMap::with_capacity(aggregation_configs.len());
    for (name, aggregation) in &aggregation_configs {
        encoded_aggregations.insert(name.clone(), serde_json::to_vec(aggregation)?);
    }
    let encoded_hosts = serde_json::to_vec(&hosts)?;

    let parsing_tasks = hosts
        .iter()
        .map(|host| ParsingTask {
            host: host.clone(),
            parsing_config_name: config.to_string(),
            parsing_config: encoded_parsing.clone(),
            aggregation_configs: encoded_aggregations.clone(),
            ..Default::default()
        })
        .collect();

    let aggregation_tasks = parsing_config
        .agg_configs
        .iter()
        .map(|name| AggregationTask {
            config: name.clone(),
            parsing_config_name: config.to_string(),
            parsing_config: encoded_parsing.clone(),
            aggregation_config: encoded_aggregations.get(name).cloned().unwrap_or_default(),
            hosts: encoded_hosts.clone(),
            ..Default::default()
        })
        .collect();

    let (parsing_time, whole_time) = session_time_frame(parsing_config.iteration_duration);

    info!("session parameters have been updated successfully");

    Ok(SessionParams {
        parallel_parsings,
        parsing_time,
        whole_time,
        parsing_tasks,
        aggregation_tasks,
    })
}
