//! Album download endpoint
//!
//! The archive is streamed while it is being built. Errors that surface
//! before the first byte turn into normal error responses; after that the
//! body is simply cut short.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Router,
};

use crate::db::{albums, songs};
use crate::error::{ApiError, ApiResult};
use crate::models::descriptors_from_sources;
use crate::services::{open_archive, ArchiveError, ArchiveJob};
use crate::AppState;

/// `attachment; filename="{title}.zip"`, quotes in the title replaced
fn content_disposition(title: &str) -> HeaderValue {
    let name = title.replace(&['"', '\\', '\r', '\n'][..], "'");
    let value = format!("attachment; filename=\"{}.zip\"", name.trim());
    HeaderValue::from_bytes(value.as_bytes())
        .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"album.zip\""))
}

/// GET /albums/:album_id/download
pub async fn download_album(
    State(state): State<AppState>,
    Path(album_id): Path<String>,
) -> ApiResult<Response> {
    let album = albums::load_album(&state.db, &album_id)
        .await?
        .filter(|album| album.deleted_at.is_none())
        .ok_or_else(|| ApiError::NotFound(format!("Album {} not found", album_id)))?;

    let policy = &state.config.archive;
    if policy.prefer_pregenerated {
        if let Some(url) = album.archive_url.as_deref() {
            tracing::info!(album_id = %album.id, url, "Redirecting to pre-generated archive");
            count_download(&state, &album.id).await;
            return Ok(Redirect::temporary(url).into_response());
        }
    }

    let sources = songs::list_track_sources(&state.db, &album.id).await?;
    let descriptors = descriptors_from_sources(sources);
    if descriptors.is_empty() {
        return Err(ApiError::NotFound(format!("No songs found for album {}", album.id)));
    }

    tracing::info!(
        album_id = %album.id,
        title = %album.title,
        tracks = descriptors.len(),
        mode = ?policy.mode,
        "Starting album download"
    );

    let job = ArchiveJob {
        album_id: album.id.clone(),
        descriptors,
    };
    let stream = match open_archive(state.fetcher.clone(), job, policy, &state.config.retry).await {
        Ok(stream) => stream,
        Err(ArchiveError::AllFetchesFailed { attempted }) => {
            tracing::error!(album_id = %album.id, attempted, "Every track fetch failed");
            return Err(ApiError::Internal(format!(
                "No songs could be fetched for album {}",
                album.id
            )));
        }
        Err(e) => return Err(e.into()),
    };

    count_download(&state, &album.id).await;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, content_disposition(&album.title)),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

async fn count_download(state: &AppState, album_id: &str) {
    if let Err(e) = albums::increment_download_count(&state.db, album_id).await {
        tracing::warn!(album_id, error = %e, "Failed to update download count");
    }
}

pub fn download_routes() -> Router<AppState> {
    Router::new().route("/albums/:album_id/download", get(download_album))
}
