//! Cleanup and admin endpoints
//!
//! Mutating endpoints are meant for an external cron and require the
//! `X-Cleanup-Secret` header. With no secret configured they are disabled.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::services::archive_pregen::PregenJobStatus;
use crate::services::housekeeping::{PublishReport, PurgeReport, TrashStatus};
use crate::AppState;

pub const CLEANUP_SECRET_HEADER: &str = "x-cleanup-secret";

fn require_secret(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let expected = state.config.housekeeping.cleanup_secret.as_str();
    if expected.is_empty() {
        tracing::warn!("Cleanup endpoint called but no cleanup secret is configured");
        return Err(ApiError::Unauthorized("Cleanup endpoints are disabled".to_string()));
    }

    let provided = headers
        .get(CLEANUP_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if provided != expected {
        tracing::warn!("Cleanup endpoint called with a missing or wrong secret");
        return Err(ApiError::Unauthorized("Invalid cleanup secret".to_string()));
    }
    Ok(())
}

/// POST /cleanup/auto-delete-old-albums
pub async fn purge_old_albums(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<PurgeReport>> {
    require_secret(&state, &headers)?;
    Ok(Json(state.housekeeper.purge_expired_trash().await?))
}

/// POST /cleanup/publish-scheduled-albums
pub async fn publish_scheduled(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<PublishReport>> {
    require_secret(&state, &headers)?;
    Ok(Json(state.housekeeper.publish_due_albums().await?))
}

/// GET /cleanup/status
pub async fn trash_status(State(state): State<AppState>) -> ApiResult<Json<TrashStatus>> {
    Ok(Json(state.housekeeper.trash_status().await?))
}

/// Answer to a generate-archives request
#[derive(Debug, Serialize)]
pub struct GenerateArchivesResponse {
    /// False when a pass was already running
    pub started: bool,
    pub job: PregenJobStatus,
}

/// POST /admin/generate-archives
///
/// Starts a background pass and answers 202 right away, or 200 with the
/// running pass when one is in progress.
pub async fn generate_archives(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<GenerateArchivesResponse>)> {
    require_secret(&state, &headers)?;

    let started = state.pregen.start(state.shutdown.child_token()).await.is_some();
    let status = if started { StatusCode::ACCEPTED } else { StatusCode::OK };
    let job = state.pregen.status().await;
    Ok((status, Json(GenerateArchivesResponse { started, job })))
}

/// GET /admin/generate-archives/status
pub async fn generate_archives_status(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<PregenJobStatus>> {
    require_secret(&state, &headers)?;
    Ok(Json(state.pregen.status().await))
}

pub fn housekeeping_routes() -> Router<AppState> {
    Router::new()
        .route("/cleanup/auto-delete-old-albums", post(purge_old_albums))
        .route("/cleanup/publish-scheduled-albums", post(publish_scheduled))
        .route("/cleanup/status", get(trash_status))
        .route("/admin/generate-archives", post(generate_archives))
        .route("/admin/generate-archives/status", get(generate_archives_status))
}
