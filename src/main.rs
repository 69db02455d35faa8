//! Analytics Event Pipeline
//!
//! Batch ETL over raw analytics events:
//! - HTTP ingestion of raw events and read access to aggregate metrics
//! - Periodic worker that validates, aggregates and archives events
//! - Retention cleanup of the archive

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

use api::{router, ApiConfig, AppState};
use event_store::{EventStore, StoreBackend, StoreConfig};
use telemetry::{health, init_tracing_from_env};
use worker::{Pipeline, RetentionConfig, RetentionWorker, RunScheduler, WorkerConfig, WorkerExit};

/// Which services this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
enum Role {
    #[default]
    All,
    Api,
    Worker,
    Retention,
}

impl Role {
    fn runs_api(self) -> bool {
        matches!(self, Self::All | Self::Api)
    }

    fn runs_worker(self) -> bool {
        matches!(self, Self::All | Self::Worker)
    }

    fn runs_retention(self) -> bool {
        matches!(self, Self::All | Self::Retention)
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Config {
    #[serde(default)]
    role: Role,
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,

    #[serde(default)]
    api: ApiConfig,
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    worker: WorkerConfig,
    #[serde(default)]
    retention: RetentionConfig,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            role: Role::default(),
            host: default_host(),
            port: default_port(),
            api: ApiConfig::default(),
            store: StoreConfig::default(),
            worker: WorkerConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing_from_env();

    info!("Starting Event Pipeline v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config()?;
    info!(
        role = ?config.role,
        backend = config.store.backend.as_str(),
        poll_interval_ms = config.worker.poll_interval_ms,
        batch_size = config.worker.batch_size,
        "Loaded configuration"
    );
    for (role, mode) in [
        ("api", config.api.failure_mode.as_str()),
        ("worker", config.worker.failure_mode.as_str()),
        ("retention", config.retention.failure_mode.as_str()),
    ] {
        if mode != "none" {
            warn!(role, failure_mode = mode, "Failure injection enabled");
        }
    }

    // No tick runs until the store is reachable.
    let store = connect_store(&config.store).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let retention = config.retention.clone();
    let retention_handle = config.role.runs_retention().then(|| {
        let worker = RetentionWorker::new(store.clone(), &retention);
        tokio::spawn(worker.run_forever(shutdown_rx.clone()))
    });

    let server_handle = if config.role.runs_api() {
        match start_server(&config, store.clone(), shutdown_rx.clone()).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                close_store(store.as_ref()).await;
                return Err(e);
            }
        }
    } else {
        None
    };

    let exit = if config.role.runs_worker() {
        let pipeline = Arc::new(Pipeline::from_config(store.clone(), &config.worker));
        let scheduler = RunScheduler::new(pipeline, config.worker.clone());
        join_worker(tokio::spawn(scheduler.run(shutdown_rx.clone())), store.as_ref()).await?
    } else {
        let mut rx = shutdown_rx.clone();
        let _ = rx.wait_for(|stop| *stop).await;
        WorkerExit::Shutdown
    };

    match exit {
        WorkerExit::Shutdown => {}
        WorkerExit::Escalated { consecutive_failures } => {
            error!(
                consecutive_failures,
                "Worker exceeded maximum consecutive failures, exiting"
            );
            close_store(store.as_ref()).await;
            std::process::exit(1);
        }
        WorkerExit::Crashed => {
            error!("Worker crashed, exiting");
            close_store(store.as_ref()).await;
            std::process::exit(1);
        }
    }

    info!("Shutting down...");

    if let Some(handle) = server_handle {
        match handle.await {
            Ok(Err(e)) => error!(error = %e, "Server error"),
            Err(e) => error!(error = %e, "Server task failed"),
            Ok(Ok(())) => {}
        }
    }
    if let Some(handle) = retention_handle {
        if let Err(e) = handle.await {
            error!(error = %e, "Retention task failed");
        }
    }

    close_store(store.as_ref()).await;
    info!("Shutdown complete");
    Ok(())
}

/// Connects to the configured store. Startup stops here if it is unreachable.
async fn connect_store(config: &StoreConfig) -> Result<Arc<dyn EventStore>> {
    match event_store::connect(config).await {
        Ok(store) => {
            health().store.set_healthy();
            Ok(store)
        }
        Err(e) => {
            error!(error = %e, backend = config.backend.as_str(), "Failed to connect to event store");
            health().store.set_unhealthy(e.to_string());
            Err(anyhow::Error::new(e).context("Failed to connect to event store"))
        }
    }
}

/// Binds the HTTP listener and serves until shutdown.
async fn start_server(
    config: &Config,
    store: Arc<dyn EventStore>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<tokio::task::JoinHandle<std::io::Result<()>>> {
    let app = router(AppState::new(store).with_config(&config.api));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid server address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!("Listening on http://{}", addr);

    Ok(tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            })
            .await
    }))
}

/// Waits for the worker task. If it panicked, the store is closed before the
/// error is returned.
async fn join_worker(
    handle: tokio::task::JoinHandle<WorkerExit>,
    store: &dyn EventStore,
) -> Result<WorkerExit> {
    match handle.await {
        Ok(exit) => Ok(exit),
        Err(e) => {
            error!(error = %e, "Worker task failed");
            close_store(store).await;
            Err(anyhow::Error::new(e).context("Worker task failed"))
        }
    }
}

async fn close_store(store: &dyn EventStore) {
    if let Err(e) = store.close().await {
        warn!(error = %e, "Failed to close event store");
    }
}

/// Load configuration from files and environment.
fn load_config() -> Result<Config> {
    let config = config::Config::builder()
        // Start with defaults
        .add_source(config::Config::try_from(&Config::default())?)
        // Load from config file if exists
        .add_source(
            config::File::with_name("config/default")
                .required(false)
                .format(config::FileFormat::Toml),
        )
        // Override with environment variables
        .add_source(
            config::Environment::default()
                .separator("__")
                .prefix("PIPELINE")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut config: Config = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    // Flat overrides; nested parsing doesn't cope with underscored field names
    if let Some(backend) = env_override::<StoreBackend>("PIPELINE_STORE_BACKEND")? {
        config.store.backend = backend;
    }
    if let Ok(url) = std::env::var("PIPELINE_CLICKHOUSE_URL") {
        config.store.clickhouse.url = url;
    }
    if let Ok(database) = std::env::var("PIPELINE_CLICKHOUSE_DATABASE") {
        config.store.clickhouse.database = database;
    }
    if let Ok(username) = std::env::var("PIPELINE_CLICKHOUSE_USERNAME") {
        config.store.clickhouse.username = Some(username);
    }
    if let Ok(password) = std::env::var("PIPELINE_CLICKHOUSE_PASSWORD") {
        config.store.clickhouse.password = Some(password);
    }
    if let Some(ms) = env_override("PIPELINE_POLL_INTERVAL_MS")? {
        config.worker.poll_interval_ms = ms;
    }
    if let Some(size) = env_override("PIPELINE_BATCH_SIZE")? {
        config.worker.batch_size = size;
    }
    if let Some(max) = env_override("PIPELINE_MAX_CONSECUTIVE_ERRORS")? {
        config.worker.max_consecutive_errors = max;
    }
    if let Some(days) = env_override("PIPELINE_RETENTION_DAYS")? {
        config.retention.retention_days = days;
    }
    if let Some(mode) = env_override("PIPELINE_API_FAILURE_MODE")? {
        config.api.failure_mode = mode;
    }
    if let Some(mode) = env_override("PIPELINE_WORKER_FAILURE_MODE")? {
        config.worker.failure_mode = mode;
    }
    if let Some(mode) = env_override("PIPELINE_RETENTION_FAILURE_MODE")? {
        config.retention.failure_mode = mode;
    }

    Ok(config)
}

fn env_override<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid {}={:?}: {}", name, raw, e)),
        Err(_) => Ok(None),
    }
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            info!("Received terminate signal");
        }
    }
}
