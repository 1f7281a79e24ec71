use std::sync::Arc;

use clap::Parser;
use game_health::{
    actors::supervisor::{Stores, SupervisorHandle},
    config::{Config, StoreConfig, read_config_file},
    detectors::DetectorRegistry,
    notifiers::NotifierRegistry,
    ratelimit::{CounterStore, MemoryCounterStore},
    storage::{ReportRecorder, memory::MemoryStore},
};
use tracing::{Level, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Maximum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "trace")]
    log_level: Level,
}

fn init(level: Level) {
    let level = LevelFilter::from_level(level);
    let filter = filter::Targets::new().with_targets(vec![
        ("game_health", level),
        ("game_health_hub", level),
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
    let args = Args::parse();
    init(args.log_level);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    let (stores, counters) = build_stores(&config)?;

    let supervisor = SupervisorHandle::spawn(
        stores.clone(),
        DetectorRegistry::with_defaults(),
        NotifierRegistry::with_defaults(),
        config.reconcile_interval(),
    );

    match supervisor.reconcile().await {
        Ok(summary) => info!(
            "initial reconcile: {} started, {} failed",
            summary.started.len(),
            summary.failed.len()
        ),
        Err(e) => warn!("initial reconcile failed, retrying periodically: {e:#}"),
    }

    if let Some(api) = config.api.clone() {
        start_api(api, supervisor.clone(), &stores, counters).await?;
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    supervisor.shutdown().await;

    Ok(())
}

fn build_stores(config: &Config) -> anyhow::Result<(Stores, Arc<dyn CounterStore>)> {
    match &config.store {
        StoreConfig::Memory {
            targets,
            groups,
            notifiers,
        } => {
            let store = Arc::new(MemoryStore::with_records(
                targets.clone(),
                groups.clone(),
                notifiers.clone(),
            ));
            let stores = Stores {
                config: store.clone(),
                reports: store.clone(),
                status: store.clone(),
                recorder: config.probe.then(|| store.clone() as Arc<dyn ReportRecorder>),
            };
            let counters: Arc<dyn CounterStore> = Arc::new(MemoryCounterStore::new());
            Ok((stores, counters))
        }

        #[cfg(feature = "redis-store")]
        StoreConfig::Redis { url, prefix } => {
            let store = Arc::new(game_health::storage::redis::RedisStore::new(
                url,
                prefix.clone(),
            )?);
            let stores = Stores {
                config: store.clone(),
                reports: store.clone(),
                status: store.clone(),
                recorder: config.probe.then(|| store.clone() as Arc<dyn ReportRecorder>),
            };
            let counters: Arc<dyn CounterStore> = store;
            Ok((stores, counters))
        }

        #[cfg(not(feature = "redis-store"))]
        StoreConfig::Redis { .. } => anyhow::bail!("this build has no redis support"),
    }
}

#[cfg(feature = "api")]
async fn start_api(
    config: game_health::api::ApiConfig,
    supervisor: SupervisorHandle,
    stores: &Stores,
    counters: Arc<dyn CounterStore>,
) -> anyhow::Result<()> {
    use game_health::api::{ApiState, spawn_api_server};
    use game_health::ratelimit::RateLimiter;

    let state = ApiState::new(
        supervisor,
        stores.status.clone(),
        RateLimiter::new(counters),
        config.rate_limit,
    );
    let addr = spawn_api_server(config, state).await?;
    info!("control API on {addr}");
    Ok(())
}

#[cfg(not(feature = "api"))]
async fn start_api(
    _config: game_health::api::ApiConfig,
    _supervisor: SupervisorHandle,
    _stores: &Stores,
    _counters: Arc<dyn CounterStore>,
) -> anyhow::Result<()> {
    anyhow::bail!("this build has no API support")
}
