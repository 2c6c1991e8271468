use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use guardia_cluster::{
    cache::TtlCache,
    cluster::{
        ApplyOutcome, AssignmentCommand, AssignmentStore, ConfigStateMachine, LoopManager,
        ReplicaHandle,
    },
    config::{NodeConfig, read_config_file},
    dispatch::{Context, ObserverRegistry, SessionLauncher},
    hosts::FetcherFactory,
    repository::{FsRepository, Repository},
    util::get_node_name,
    worker::HttpResolver,
};
use tracing::{debug, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

/// How long running loops get to finish their iteration on shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = filter::Targets::new().with_targets(vec![
        ("guardia_cluster", LevelFilter::DEBUG),
        ("guardia_node", LevelFilter::TRACE),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    let node = get_node_name(config.name.as_deref());
    info!("starting node {node}");

    let repository = Arc::new(FsRepository::new(config.repository.clone()));
    let global = repository.global_config().await?;

    let cache = Arc::new(TtlCache::from_config(&global.cache));
    let ctx = Arc::new(Context {
        repository: repository.clone(),
        fetchers: Arc::new(FetcherFactory::new(cache)?),
        resolver: Arc::new(HttpResolver::new(
            config.worker_port,
            Duration::from_secs(config.call_timeout),
        )?),
        worker_hosts: config.workers.clone(),
        retry_delay: Duration::from_secs(config.retry_delay),
    });

    let store = Arc::new(AssignmentStore::new());
    let loops = Arc::new(LoopManager::new());
    let observer = Arc::new(ObserverRegistry::new());

    let fsm = Arc::new(ConfigStateMachine::new(
        node.clone(),
        store.clone(),
        loops.clone(),
        Arc::new(SessionLauncher::new(ctx, observer.clone())),
    ));
    let replica = ReplicaHandle::spawn(fsm);

    if config.bootstrap {
        bootstrap(&replica, repository.as_ref(), &node).await?;
    }

    serve_api(&config, &node, &store, &observer, &loops).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    replica.shutdown().await;
    let leaked = loops.shutdown(SHUTDOWN_GRACE).await;
    if leaked > 0 {
        warn!("{leaked} dispatch loops did not stop in time");
    }

    Ok(())
}

/// Assign every config of the repository to this node
async fn bootstrap(
    replica: &ReplicaHandle,
    repository: &dyn Repository,
    node: &str,
) -> anyhow::Result<()> {
    for config in repository.list_parsing_configs().await? {
        match replica.submit(&AssignmentCommand::assign(node, &config)).await? {
            ApplyOutcome::Ignored { reason } => warn!("assignment of {config} ignored: {reason}"),
            outcome => debug!("bootstrap: {outcome:?}"),
        }
    }
    Ok(())
}

#[cfg(feature = "api")]
async fn serve_api(
    config: &NodeConfig,
    node: &str,
    store: &Arc<AssignmentStore>,
    observer: &Arc<ObserverRegistry>,
    loops: &Arc<LoopManager>,
) -> anyhow::Result<()> {
    use guardia_cluster::api::{ApiConfig, ApiState, spawn_api_server};

    if let Some(bind_addr) = config.api {
        let state = ApiState::new(node, store.clone(), observer.clone(), loops.clone());
        spawn_api_server(ApiConfig { bind_addr }, state).await?;
    }
    Ok(())
}

#[cfg(not(feature = "api"))]
async fn serve_api(
    config: &NodeConfig,
    _node: &str,
    _store: &Arc<AssignmentStore>,
    _observer: &Arc<ObserverRegistry>,
    _loops: &Arc<LoopManager>,
) -> anyhow::Result<()> {
    if config.api.is_some() {
        warn!("stats API requested but the `api` feature is disabled");
    }
    Ok(())
}
