//! Album upload pipeline
//!
//! Takes a client-supplied ZIP of audio files plus metadata, creates the album
//! row, pushes the cover and every song to object storage and records
//! progress checkpoints under the client's operation id.
//!
//! Failure policy:
//! - a song whose upload fails after retries is skipped; the album completes
//!   with fewer songs
//! - if no song makes it, or a fatal error happens once the album row exists,
//!   the album is moved to the trash so the trash sweep removes it later

use bytes::Bytes;
use msa_common::{Clock, RetryPolicy};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use super::progress::ProgressStore;
use crate::db::{albums, songs};
use crate::models::AlbumMetadata;
use crate::storage::{content_type_for, paths, ObjectStorage, StorageError};

/// Audio extensions accepted inside an album archive
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav", "flac", "ogg"];

/// Resource-fork folder added by macOS archivers
const MACOS_METADATA_DIR: &str = "__MACOSX";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid archive: {0}")]
    InvalidArchive(String),

    #[error("No audio files (MP3, M4A, WAV, FLAC, OGG) found in archive")]
    NoAudioFiles,

    #[error("No song could be stored for album {album_id}")]
    AllSongsFailed { album_id: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Upload limits (`[upload]` section)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Largest accepted request body
    pub max_body_bytes: usize,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024 * 1024,
        }
    }
}

/// Cover image sent with an upload
#[derive(Debug, Clone)]
pub struct CoverImage {
    pub extension: String,
    pub data: Bytes,
}

/// One album upload request
#[derive(Debug, Clone)]
pub struct AlbumUpload {
    pub operation_id: String,
    /// Client file name, used to detect the archive format
    pub archive_name: String,
    pub archive: Bytes,
    pub cover: Option<CoverImage>,
    pub metadata: AlbumMetadata,
}

/// Result of a finished upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub album_id: String,
    pub title: String,
    pub slug: String,
    pub cover_url: Option<String>,
    pub song_count: usize,
    /// Archive paths of songs that could not be stored
    pub skipped: Vec<String>,
}

/// Audio file pulled out of the uploaded archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFile {
    /// Path inside the archive
    pub path: String,
    pub stem: String,
    /// Lowercase extension without the dot
    pub extension: String,
    pub data: Bytes,
}

/// Read every audio file out of a ZIP archive, sorted by path
pub fn extract_audio_files(archive: &[u8]) -> Result<Vec<AudioFile>, UploadError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|e| UploadError::InvalidArchive(e.to_string()))?;

    let mut files = Vec::new();
    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|e| UploadError::InvalidArchive(e.to_string()))?;
        if entry.is_dir() {
            continue;
        }

        let path = entry.name().to_string();
        if path.split('/').any(|part| part == MACOS_METADATA_DIR) {
            continue;
        }

        let file_name = Path::new(&path);
        let Some(extension) = file_name
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .filter(|e| AUDIO_EXTENSIONS.contains(&e.as_str()))
        else {
            continue;
        };
        let stem = file_name
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();

        let mut data = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut data)
            .map_err(|e| UploadError::InvalidArchive(format!("{}: {}", path, e)))?;

        files.push(AudioFile {
            path,
            stem,
            extension,
            data: Bytes::from(data),
        });
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

/// Song title derived from the file stem
fn title_from_stem(stem: &str) -> String {
    let title = stem.replace('_', " ");
    let title = title.trim();
    if title.is_empty() {
        "Untitled".to_string()
    } else {
        title.to_string()
    }
}

/// Leading bytes shared by RAR 4 and RAR 5 archives
const RAR_MAGIC: &[u8] = b"Rar!\x1a\x07";

/// Accept ZIP archives only, by name and by content
fn check_format(archive_name: &str, archive: &[u8]) -> Result<(), UploadError> {
    let extension = Path::new(archive_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if extension == "rar" || archive.starts_with(RAR_MAGIC) {
        return Err(UploadError::UnsupportedFormat(
            "RAR archives are not supported, please upload a ZIP".to_string(),
        ));
    }

    match extension.as_str() {
        "zip" => Ok(()),
        other => Err(UploadError::UnsupportedFormat(format!(
            "'.{}' is not an album archive, please upload a ZIP",
            other
        ))),
    }
}

/// Album upload service
#[derive(Clone)]
pub struct AlbumUploader {
    db: SqlitePool,
    storage: Arc<dyn ObjectStorage>,
    progress: Arc<ProgressStore>,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl AlbumUploader {
    pub fn new(
        db: SqlitePool,
        storage: Arc<dyn ObjectStorage>,
        progress: Arc<ProgressStore>,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            storage,
            progress,
            retry,
            clock,
        }
    }

    async fn checkpoint(&self, operation_id: &str, percent: i32, phase: &str) {
        if let Err(e) = self.progress.record(operation_id, percent, phase).await {
            tracing::debug!(operation_id, error = %e, "Checkpoint not recorded");
        }
    }

    /// Run the whole upload
    ///
    /// Any error ends the progress feed with a `"failed"` checkpoint.
    pub async fn upload(&self, request: AlbumUpload) -> Result<UploadOutcome, UploadError> {
        let operation_id = request.operation_id.clone();
        let result = self.run(request).await;
        if let Err(e) = &result {
            tracing::warn!(operation_id = %operation_id, error = %e, "Album upload rejected");
            self.progress.fail(&operation_id).await;
        }
        result
    }

    async fn run(&self, request: AlbumUpload) -> Result<UploadOutcome, UploadError> {
        let operation_id = request.operation_id.clone();
        self.checkpoint(&operation_id, 0, "starting").await;

        check_format(&request.archive_name, &request.archive)?;

        self.checkpoint(&operation_id, 15, "extracting").await;
        let archive = request.archive.clone();
        let files = tokio::task::spawn_blocking(move || extract_audio_files(&archive))
            .await
            .map_err(|e| UploadError::Internal(format!("Extraction task failed: {}", e)))??;

        if files.is_empty() {
            self.checkpoint(&operation_id, 0, "no_audio_files").await;
            return Err(UploadError::NoAudioFiles);
        }
        tracing::info!(
            operation_id = %operation_id,
            archive = %request.archive_name,
            audio_files = files.len(),
            "Album archive extracted"
        );
        self.checkpoint(&operation_id, 35, "files_found").await;

        let now = self.clock.now();
        let metadata = &request.metadata;
        let visibility = metadata.visibility(now);
        let slug = metadata.slug();
        let album_id = albums::insert_album(&self.db, metadata, &slug, &visibility, now).await?;
        tracing::info!(
            album_id = %album_id,
            slug = %slug,
            is_private = visibility.is_private,
            is_scheduled = visibility.is_scheduled,
            "Album created"
        );
        self.checkpoint(&operation_id, 38, "album_created").await;

        match self.store_album_content(&album_id, &request, files).await {
            Ok((cover_url, song_count, skipped)) => {
                self.checkpoint(&operation_id, 90, "finalizing").await;
                self.progress.complete(&operation_id).await;

                Ok(UploadOutcome {
                    album_id,
                    title: metadata.title.clone(),
                    slug,
                    cover_url,
                    song_count,
                    skipped,
                })
            }
            Err(e) => {
                tracing::error!(album_id = %album_id, error = %e, "Album upload failed, moving album to trash");
                if let Err(db_err) = albums::soft_delete(&self.db, &album_id, self.clock.now()).await {
                    tracing::error!(album_id = %album_id, error = %db_err, "Failed to trash album");
                }
                Err(e)
            }
        }
    }

    /// Cover, songs and song count for an album row that already exists
    async fn store_album_content(
        &self,
        album_id: &str,
        request: &AlbumUpload,
        files: Vec<AudioFile>,
    ) -> Result<(Option<String>, usize, Vec<String>), UploadError> {
        let operation_id = request.operation_id.as_str();
        let metadata = &request.metadata;

        let cover_url = match &request.cover {
            Some(cover) => self.store_cover(album_id, metadata, cover).await?,
            None => None,
        };

        self.checkpoint(operation_id, 40, "uploading_songs").await;
        let total = files.len();
        let mut stored = 0usize;
        let mut skipped = Vec::new();

        for (index, file) in files.into_iter().enumerate() {
            let track_number = index + 1;
            let percent = 40 + (track_number * 35 / total) as i32;
            self.checkpoint(operation_id, percent, &format!("uploading_song_{}", track_number))
                .await;

            let path = paths::song_path(album_id, track_number, &file.stem, &file.extension);
            let content_type = content_type_for(&file.extension);

            let put = self
                .retry
                .run("song upload", || {
                    self.storage.put(&path, file.data.clone(), content_type)
                })
                .await;
            let audio_url = match put {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(album_id, song = %file.path, error = %e, "Song upload failed, skipping");
                    skipped.push(file.path);
                    continue;
                }
            };

            let song = songs::NewSong {
                album_id: album_id.to_string(),
                title: title_from_stem(&file.stem),
                artist_id: metadata.artist_id.clone(),
                artist_name: metadata.artist_name.clone(),
                album_name: metadata.title.clone(),
                audio_url,
                cover_url: cover_url.clone(),
                track_number: track_number as i64,
            };
            match songs::insert_song(&self.db, &song, self.clock.now()).await {
                Ok(_) => stored += 1,
                Err(e) => {
                    tracing::warn!(album_id, song = %file.path, error = %e, "Song row insert failed, skipping");
                    skipped.push(file.path);
                }
            }
        }

        if stored == 0 {
            return Err(UploadError::AllSongsFailed {
                album_id: album_id.to_string(),
            });
        }

        self.checkpoint(operation_id, 75, "updating_song_count").await;
        albums::set_song_count(&self.db, album_id, stored as i64).await?;

        tracing::info!(album_id, songs = stored, skipped = skipped.len(), "Album songs stored");
        Ok((cover_url, stored, skipped))
    }

    /// Upload the cover; a failed cover does not fail the album
    async fn store_cover(
        &self,
        album_id: &str,
        metadata: &AlbumMetadata,
        cover: &CoverImage,
    ) -> Result<Option<String>, UploadError> {
        let extension = cover.extension.to_ascii_lowercase();
        let path = paths::cover_path(&metadata.artist_id, album_id, &extension);
        let content_type = content_type_for(&extension);

        let put = self
            .retry
            .run("cover upload", || {
                self.storage.put(&path, cover.data.clone(), content_type)
            })
            .await;

        match put {
            Ok(url) => {
                albums::set_cover_url(&self.db, album_id, &url).await?;
                Ok(Some(url))
            }
            Err(e) => {
                tracing::warn!(album_id, error = %e, "Cover upload failed, continuing without cover");
                Ok(None)
            }
        }
    }
}
