//! msa-server library - Musicasua album service
//!
//! Album downloads are streamed as ZIP archives assembled on the fly from the
//! songs' remote audio objects. Uploads, progress tracking, housekeeping and
//! archive pre-generation share the same state.

use axum::extract::DefaultBodyLimit;
use axum::Router;
use msa_common::{Clock, RetryPolicy};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;

use config::ServerConfig;
use services::{AlbumUploader, ArchivePregenerator, AudioFetcher, Housekeeper, ProgressStore};
use storage::ObjectStorage;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<ServerConfig>,
    pub fetcher: Arc<dyn AudioFetcher>,
    pub storage: Arc<dyn ObjectStorage>,
    pub progress: Arc<ProgressStore>,
    pub uploader: AlbumUploader,
    pub housekeeper: Housekeeper,
    pub pregen: ArchivePregenerator,
    pub clock: Arc<dyn Clock>,
    /// Fired on shutdown; background work spawned by handlers stops with it
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire every service over the given collaborators
    pub fn new(
        db: SqlitePool,
        config: ServerConfig,
        fetcher: Arc<dyn AudioFetcher>,
        storage: Arc<dyn ObjectStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let retry: RetryPolicy = config.retry.clone();
        let progress = Arc::new(ProgressStore::new(clock.clone(), config.progress.clone()));
        let uploader = AlbumUploader::new(
            db.clone(),
            storage.clone(),
            progress.clone(),
            retry.clone(),
            clock.clone(),
        );
        let housekeeper = Housekeeper::new(db.clone(), storage.clone(), clock.clone(), &config.housekeeping);
        let pregen = ArchivePregenerator::new(
            db.clone(),
            storage.clone(),
            fetcher.clone(),
            config.archive.clone(),
            retry,
            clock.clone(),
        );

        Self {
            db,
            config: Arc::new(config),
            fetcher,
            storage,
            progress,
            uploader,
            housekeeper,
            pregen,
            clock,
            shutdown: CancellationToken::new(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.upload.max_body_bytes;

    Router::new()
        .merge(api::download_routes())
        .merge(api::upload_routes().layer(DefaultBodyLimit::max(body_limit)))
        .merge(api::progress_routes())
        .merge(api::housekeeping_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
