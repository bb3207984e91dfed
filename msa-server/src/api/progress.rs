//! Upload progress endpoints: SSE feed, polling snapshot and eviction

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
    Json, Router,
};
use futures::stream::{Stream, StreamExt};
use msa_common::sse::{heartbeat_keep_alive, json_event};
use serde::Serialize;
use serde_json::{json, Value};
use std::convert::Infallible;

use crate::models::{Checkpoint, OperationStatus};
use crate::AppState;

/// Polling response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: OperationStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_seconds: Option<u64>,
}

impl From<Checkpoint> for StatusResponse {
    fn from(checkpoint: Checkpoint) -> Self {
        let status = if checkpoint.is_failure() {
            OperationStatus::Failed
        } else if checkpoint.is_terminal() {
            OperationStatus::Completed
        } else {
            OperationStatus::InProgress
        };
        Self {
            status,
            progress: checkpoint.percent,
            step: Some(checkpoint.phase),
            elapsed_seconds: Some(checkpoint.elapsed_seconds),
        }
    }
}

/// GET /progress/:operation_id
///
/// One `data: {json}` event per checkpoint; the stream ends after the
/// terminal one.
pub async fn progress_events(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!(operation_id = %operation_id, "Progress subscriber connected");

    let events = state
        .progress
        .clone()
        .subscribe(operation_id)
        .filter_map(|checkpoint| async move { json_event(&checkpoint).map(Ok) });

    Sse::new(events).keep_alive(heartbeat_keep_alive())
}

/// GET /status/:operation_id
pub async fn progress_status(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Json<StatusResponse> {
    match state.progress.snapshot(&operation_id).await {
        Ok(checkpoint) => Json(checkpoint.into()),
        Err(_) => Json(StatusResponse {
            status: OperationStatus::NotFound,
            progress: 0,
            step: None,
            elapsed_seconds: None,
        }),
    }
}

/// DELETE /progress/:operation_id
pub async fn clear_progress(
    State(state): State<AppState>,
    Path(operation_id): Path<String>,
) -> Json<Value> {
    state.progress.evict(&operation_id).await;
    Json(json!({ "status": "cleared" }))
}

pub fn progress_routes() -> Router<AppState> {
    Router::new()
        .route("/progress/:operation_id", get(progress_events).delete(clear_progress))
        .route("/status/:operation_id", get(progress_status))
}
