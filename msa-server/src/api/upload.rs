//! Album upload endpoint

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{parse_schedule, AlbumMetadata, PublishSchedule};
use crate::services::{AlbumUpload, CoverImage};
use crate::AppState;

/// File part of a multipart request
struct FilePart {
    file_name: String,
    data: Bytes,
}

/// Text fields and files of the upload form
#[derive(Default)]
struct UploadForm {
    fields: HashMap<String, String>,
    album_file: Option<FilePart>,
    cover_image: Option<FilePart>,
}

impl UploadForm {
    fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|s| s.trim()).filter(|s| !s.is_empty())
    }
}

async fn read_form(mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read field '{}': {}", name, e)))?;

        match name.as_str() {
            "albumFile" => {
                form.album_file = Some(FilePart {
                    file_name: file_name.unwrap_or_else(|| "album.zip".to_string()),
                    data,
                })
            }
            "coverImage" if !data.is_empty() => {
                form.cover_image = Some(FilePart {
                    file_name: file_name.unwrap_or_else(|| "cover.jpg".to_string()),
                    data,
                })
            }
            "coverImage" => {}
            _ => {
                form.fields
                    .insert(name, String::from_utf8_lossy(&data).into_owned());
            }
        }
    }

    Ok(form)
}

/// Tags arrive as a JSON array or a comma-separated list
fn parse_tags(raw: Option<&str>) -> Vec<String> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    if let Ok(tags) = serde_json::from_str::<Vec<String>>(raw) {
        return tags;
    }
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn metadata_from_form(form: &UploadForm) -> ApiResult<AlbumMetadata> {
    let title = form
        .text("title")
        .ok_or_else(|| ApiError::BadRequest("title is required".to_string()))?;
    let artist_id = form
        .text("artistId")
        .ok_or_else(|| ApiError::BadRequest("artistId is required".to_string()))?;

    let schedule = if form.text("publishType") == Some("scheduled") {
        let when = parse_schedule(
            form.text("scheduledPublishAt"),
            form.text("scheduleDate"),
            form.text("scheduleTime"),
        )
        .ok_or_else(|| ApiError::BadRequest("Invalid or missing scheduledPublishAt".to_string()))?;
        PublishSchedule::At(when)
    } else {
        PublishSchedule::Immediate
    };

    Ok(AlbumMetadata {
        title: title.to_string(),
        description: form.text("description").unwrap_or_default().to_string(),
        genre: form.text("genre").unwrap_or_default().to_string(),
        tags: parse_tags(form.text("tags")),
        is_public: form
            .text("isPublic")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(true),
        schedule,
        release_date: form.text("releaseDate").map(str::to_string),
        custom_slug: form.text("customUrl").map(str::to_string),
        artist_id: artist_id.to_string(),
        artist_name: form.text("artistName").unwrap_or_default().to_string(),
    })
}

/// POST /albums/upload
pub async fn upload_album(State(state): State<AppState>, multipart: Multipart) -> ApiResult<Json<Value>> {
    let mut form = read_form(multipart).await?;

    let album_file = form
        .album_file
        .take()
        .ok_or_else(|| ApiError::BadRequest("albumFile is required".to_string()))?;
    let metadata = metadata_from_form(&form)?;

    let operation_id = form
        .text("uploadId")
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let cover = form.cover_image.take().map(|part| CoverImage {
        extension: Path::new(&part.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("jpg")
            .to_ascii_lowercase(),
        data: part.data,
    });

    tracing::info!(
        operation_id = %operation_id,
        archive = %album_file.file_name,
        bytes = album_file.data.len(),
        has_cover = cover.is_some(),
        "Album upload received"
    );

    let outcome = state
        .uploader
        .upload(AlbumUpload {
            operation_id: operation_id.clone(),
            archive_name: album_file.file_name,
            archive: album_file.data,
            cover,
            metadata,
        })
        .await?;

    Ok(Json(json!({
        "success": true,
        "upload_id": operation_id,
        "album": {
            "id": outcome.album_id,
            "title": outcome.title,
            "slug": outcome.slug,
            "cover_url": outcome.cover_url,
            "songs_count": outcome.song_count,
        },
        "skipped": outcome.skipped,
        "message": format!("Album uploaded successfully with {} songs", outcome.song_count),
    })))
}

pub fn upload_routes() -> Router<AppState> {
    Router::new().route("/albums/upload", post(upload_album))
}
