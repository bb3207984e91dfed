//! msa-server - Musicasua album service
//!
//! Serves streamed album downloads, album uploads with progress tracking and
//! the housekeeping endpoints.

use anyhow::{Context, Result};
use clap::Parser;
use msa_common::config::{ensure_directory_exists, resolve_config_path, resolve_root_folder};
use msa_common::SystemClock;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use msa_server::config::ServerConfig;
use msa_server::services::{housekeeping, progress, HttpFetcher};
use msa_server::storage::SupabaseStorage;
use msa_server::{build_router, db, AppState};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "msa-server")]
#[command(about = "Musicasua album service", long_about = None)]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "MSA_CONFIG")]
    config: Option<PathBuf>,

    /// Root folder holding the database
    #[arg(short, long, env = "MSA_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Listen address, overrides `[server] bind`
    #[arg(short, long, env = "MSA_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "msa_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Musicasua album service v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file found, using defaults"),
    }
    let config = ServerConfig::load(config_path.as_deref()).context("Failed to load configuration")?;

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), config.server.root_folder.as_deref());
    ensure_directory_exists(&root_folder).context("Failed to initialize root folder")?;
    info!("Root folder: {}", root_folder.display());

    let db_path = config.database_path(&root_folder);
    info!("Database: {}", db_path.display());
    let pool = db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    if !config.storage.is_configured() {
        warn!("Object storage is not configured; uploads and archive pre-generation will fail");
    }
    let storage = Arc::new(SupabaseStorage::new(&config.storage).context("Failed to create storage client")?);
    let fetcher = Arc::new(HttpFetcher::new(&config.archive.fetch).context("Failed to create audio fetcher")?);

    let bind = args.bind.clone().unwrap_or_else(|| config.server.bind.clone());
    let housekeeping_settings = config.housekeeping.clone();
    let state = AppState::new(pool, config, fetcher, storage, Arc::new(SystemClock));

    let cancel = state.shutdown.clone();
    let sweeper = progress::spawn_sweeper(state.progress.clone(), cancel.clone());
    let scheduler = housekeeping::spawn_scheduler(state.housekeeper.clone(), &housekeeping_settings, cancel.clone());

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind to {}", bind))?;
    info!("Listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cancel.cancel();
    if let Err(e) = sweeper.await {
        warn!("Progress sweeper ended abnormally: {}", e);
    }
    if let Some(scheduler) = scheduler {
        if let Err(e) = scheduler.await {
            warn!("Housekeeping scheduler ended abnormally: {}", e);
        }
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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
}
