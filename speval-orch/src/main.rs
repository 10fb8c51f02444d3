//! speval-orch - speech evaluation orchestrator
//!
//! Accepts recordings over HTTP, fans analysis jobs out to the worker pool in
//! two waves, and aggregates the results into one outcome record per request.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use speval_common::config::{prepare_root_folder, resolve_config_path, resolve_root_folder};
use speval_common::events::EventBus;
use speval_orch::config::OrchestratorConfig;
use speval_orch::dispatch::{AnalyzerRegistry, ChannelDispatcher, JobRunner, WorkerPool};
use speval_orch::services::EvaluationService;
use speval_orch::{build_router, db, AppState};

/// Command-line arguments for speval-orch
#[derive(Parser, Debug)]
#[command(name = "speval-orch")]
#[command(about = "Speech evaluation orchestrator")]
#[command(version)]
struct Args {
    /// Bootstrap TOML file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the TOML file)
    #[arg(short, long, env = "SPEVAL_PORT")]
    port: Option<u16>,

    /// Root folder holding the database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = OrchestratorConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    speval_common::logging::init_tracing(&config.logging.level);

    info!(
        "Starting speval-orch v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Config: {}", path.display()),
        None => info!("Config: built-in defaults"),
    }

    // Root folder and database
    let root_folder = resolve_root_folder(args.root_folder.as_deref(), config.root_folder.as_deref());
    let db_path = prepare_root_folder(&root_folder).context("Failed to initialize root folder")?;
    info!("Root folder: {}", root_folder.display());

    let db_pool = db::init_database_pool(&db_path, &config.database)
        .await
        .context("Failed to open database")?;

    let event_bus = EventBus::new(1000);
    let settings = &config.orchestrator;

    // Dispatch channel, service, worker pool
    let (dispatcher, job_rx) = ChannelDispatcher::new(settings.queue_capacity);
    let service = Arc::new(EvaluationService::new(
        db_pool.clone(),
        event_bus.clone(),
        Arc::new(dispatcher),
        settings,
        config.database.max_lock_wait_ms,
    ));

    service
        .recover_interrupted(Duration::from_secs(settings.interrupted_grace_secs))
        .await
        .context("Startup recovery failed")?;

    for kind in config.unconfigured_kinds() {
        warn!(kind = %kind, "No analyzer endpoint configured; jobs of this kind will fail");
    }
    let registry = AnalyzerRegistry::from_endpoints(
        &config.analyzers,
        Duration::from_secs(settings.analyzer_timeout_secs),
    )
    .context("Failed to build analyzer clients")?;
    if registry.is_empty() {
        warn!("No analyzers configured; every evaluation will fail at wave 1");
    } else {
        info!("Analyzers registered: {}", registry.len());
    }

    let shutdown = CancellationToken::new();
    let runner = Arc::new(JobRunner::new(registry, service.clone()));
    let workers = WorkerPool::spawn(job_rx, runner, settings.worker_count, shutdown.clone());

    // Retention purge
    let purge_service = service.clone();
    let purge_interval = Duration::from_secs(settings.purge_interval_secs.max(60));
    let retention = settings.retention();
    let purge_cancel = shutdown.clone();
    let purge_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_interval);
        loop {
            tokio::select! {
                _ = purge_cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = purge_service.purge_expired(retention).await {
                        error!(error = %e, "Retention purge failed");
                    }
                }
            }
        }
    });

    // HTTP server
    let state = AppState::new(db_pool.clone(), event_bus, service);
    let app = build_router(state);

    let port = args.port.unwrap_or(config.port);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .context("Server error")?;

    shutdown.cancel();
    workers.join().await;
    let _ = purge_task.await;
    db_pool.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM and cancels background work
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }

    shutdown.cancel();
}
