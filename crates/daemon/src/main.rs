//! Harvest Engine - Main Entry Point
//! JSON-RPC server + extraction runs + janitor

mod config;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Import workspace crates
use crate::config::DaemonConfig;
use harvest_api_rpc::{RpcServer, RpcServerConfig};
use harvest_core::application::{
    shutdown_channel, ExtractionService, JanitorTask, JobStore, JobSupervisor, SubscriberRegistry,
};
use harvest_core::port::id_provider::UuidProvider;
use harvest_core::port::time_provider::SystemTimeProvider;
use harvest_core::port::ProducerSource;
use harvest_infra_sqlite::{create_pool, run_migrations, SqliteRecordSink};
use harvest_infra_system::{CommandProducerSource, JsonlFileSource};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const JSONL_KIND: &str = "jsonl";
const LOG_FILE_PREFIX: &str = "harvest-engine.log";

/// Install the global subscriber
///
/// - `RUST_LOG` filter (default `harvest=info`)
/// - `HARVEST_LOG_FORMAT=json` for JSON lines, pretty otherwise
/// - `HARVEST_LOG_DIR` adds a daily rolling file
///
/// The returned guard flushes the file writer when dropped.
fn init_logging() -> Result<Option<WorkerGuard>> {
    let log_format = std::env::var("HARVEST_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("harvest=info"))
        .context("Failed to create env filter")?;

    let otel_layer = telemetry::init_telemetry()?;

    let (file_layer, guard) = match std::env::var("HARVEST_LOG_DIR") {
        Ok(dir) => {
            let dir = shellexpand::tilde(&dir).into_owned();
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().json().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    let registry = tracing_subscriber::registry()
        .with(otel_layer)
        .with(env_filter)
        .with(file_layer);

    match log_format.as_str() {
        // Production: JSON structured logging
        "json" => registry.with(fmt::layer().json()).init(),
        // Development: Pretty formatting with colors
        _ => registry.with(fmt::layer().pretty()).init(),
    }

    Ok(guard)
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            res = tokio::signal::ctrl_c() => res?,
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging
    let _log_guard = init_logging()?;
    info!("Harvest Engine v{} starting...", VERSION);

    // 2. Load configuration
    let cfg = DaemonConfig::load()?;

    // 3. Initialize database
    if let Some(dir) = cfg.database_dir() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create database directory {}", dir.display()))?;
    }
    info!(db_path = %cfg.database.path, "Initializing database...");
    let pool = create_pool(&cfg.database_url())
        .await
        .map_err(|e| anyhow::anyhow!("DB pool creation failed: {}", e))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Migration failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let store = Arc::new(JobStore::new(Arc::new(UuidProvider), time_provider.clone()));
    let registry = Arc::new(SubscriberRegistry::new(time_provider.clone()));
    let supervisor = Arc::new(JobSupervisor::new());
    let sink = Arc::new(SqliteRecordSink::new(pool.clone(), time_provider.clone()));

    let mut service = ExtractionService::new(
        store.clone(),
        registry.clone(),
        supervisor.clone(),
        sink,
    )
    .with_policy(cfg.broadcast_policy());

    if cfg.jsonl.enabled {
        let source = match &cfg.jsonl.base_dir {
            Some(dir) => JsonlFileSource::with_base_dir(dir),
            None => JsonlFileSource::new(),
        };
        service = service.with_source(JSONL_KIND, Arc::new(source));
    }
    for (kind, spec) in &cfg.producers {
        info!(kind = %kind, command = %spec.command, "Registered scraper");
        let source: Arc<dyn ProducerSource> = Arc::new(CommandProducerSource::new(spec.clone()));
        service = service.with_source(kind.clone(), source);
    }
    if service.kinds().is_empty() {
        warn!("No extraction kinds configured; extract.start.v1 will reject every request");
    }
    let service = Arc::new(service);

    // 5. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let rpc_config = RpcServerConfig {
        host: cfg.rpc.host.clone(),
        port: cfg.rpc.port,
    };
    let (rpc_addr, rpc_handle) = RpcServer::new(rpc_config, service.clone())
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    // 6. Start janitor
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let janitor = JanitorTask::new(store.clone(), cfg.janitor_config()).with_registry(registry.clone());
    let janitor_handle = tokio::spawn(janitor.run(shutdown_rx));

    info!(addr = %rpc_addr, kinds = ?service.kinds(), "System ready. Waiting for requests...");

    // 7. Wait for shutdown signal
    shutdown_signal().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown: stop intake, then runs, then subscribers
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    shutdown_tx.shutdown();

    let report = supervisor.shutdown(cfg.shutdown_grace()).await;
    info!(
        finished = report.finished,
        aborted = report.aborted,
        "Extraction runs stopped"
    );
    registry.close_all().await;

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), janitor_handle).await;
    pool.close().await;
    telemetry::shutdown_telemetry();

    info!("Shutdown complete.");
    Ok(())
}
