//! Archive pre-generation
//!
//! Builds the download archive of albums that do not have one yet and stores
//! it next to the album's other objects, so downloads can be redirected to a
//! static file. A catalogue pass runs as a background task; its state is
//! kept for the status endpoint.

use chrono::{DateTime, Utc};
use msa_common::{Clock, RetryPolicy};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::archive::{ArchiveError, ArchivePolicy};
use super::archive_stream::{build_archive, ArchiveJob};
use super::fetcher::AudioFetcher;
use crate::db::albums::{self, AlbumRecord};
use crate::db::songs;
use crate::models::descriptors_from_sources;
use crate::storage::{paths, ObjectStorage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PregenStatus {
    Success,
    Skipped,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct PregenResult {
    pub album_id: String,
    pub title: String,
    pub status: PregenStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PregenReport {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub results: Vec<PregenResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PregenRunState {
    /// No pass has run since startup
    Idle,
    Running,
    Finished,
    /// The pass stopped early: database error or shutdown
    Aborted,
}

/// State of the latest background pass
#[derive(Debug, Clone, Serialize)]
pub struct PregenJobStatus {
    pub state: PregenRunState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Albums handled so far out of `total`
    pub processed: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<PregenReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Default for PregenJobStatus {
    fn default() -> Self {
        Self {
            state: PregenRunState::Idle,
            started_at: None,
            finished_at: None,
            processed: 0,
            total: 0,
            report: None,
            error: None,
        }
    }
}

/// Builds and stores album archives
#[derive(Clone)]
pub struct ArchivePregenerator {
    db: SqlitePool,
    storage: Arc<dyn ObjectStorage>,
    fetcher: Arc<dyn AudioFetcher>,
    policy: ArchivePolicy,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    job: Arc<RwLock<PregenJobStatus>>,
}

impl ArchivePregenerator {
    pub fn new(
        db: SqlitePool,
        storage: Arc<dyn ObjectStorage>,
        fetcher: Arc<dyn AudioFetcher>,
        policy: ArchivePolicy,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            storage,
            fetcher,
            policy,
            retry,
            clock,
            job: Arc::new(RwLock::new(PregenJobStatus::default())),
        }
    }

    /// State of the current or latest background pass
    pub async fn status(&self) -> PregenJobStatus {
        self.job.read().await.clone()
    }

    /// Start a background pass unless one is already running
    ///
    /// Returns the spawned task, or `None` when a pass was already running.
    /// The pass stops between albums once `cancel` fires.
    pub async fn start(&self, cancel: CancellationToken) -> Option<JoinHandle<()>> {
        {
            let mut job = self.job.write().await;
            if job.state == PregenRunState::Running {
                tracing::info!(processed = job.processed, total = job.total, "Archive pre-generation already running");
                return None;
            }
            *job = PregenJobStatus {
                state: PregenRunState::Running,
                started_at: Some(self.clock.now()),
                ..PregenJobStatus::default()
            };
        }

        let pregen = self.clone();
        Some(tokio::spawn(async move {
            let outcome = pregen.generate_missing(&cancel).await;
            let mut job = pregen.job.write().await;
            job.finished_at = Some(pregen.clock.now());
            match outcome {
                Ok(report) => {
                    if report.total < job.total {
                        job.state = PregenRunState::Aborted;
                        job.error = Some("Stopped by shutdown".to_string());
                    } else {
                        job.state = PregenRunState::Finished;
                    }
                    job.report = Some(report);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Archive pre-generation failed");
                    job.state = PregenRunState::Aborted;
                    job.error = Some(e.to_string());
                }
            }
        }))
    }

    /// Generate archives for every live album without one
    ///
    /// Albums are handled one at a time; `cancel` is checked between them.
    pub async fn generate_missing(&self, cancel: &CancellationToken) -> Result<PregenReport, sqlx::Error> {
        let pending = albums::list_without_archive(&self.db).await?;
        tracing::info!(albums = pending.len(), "Pre-generating album archives");
        self.job.write().await.total = pending.len();

        let mut results = Vec::with_capacity(pending.len());
        for album in &pending {
            if cancel.is_cancelled() {
                tracing::info!(done = results.len(), "Archive pre-generation cancelled");
                break;
            }
            results.push(self.generate_for(album).await);
            self.job.write().await.processed = results.len();
        }

        let count = |status| results.iter().filter(|r| r.status == status).count();
        Ok(PregenReport {
            total: results.len(),
            succeeded: count(PregenStatus::Success),
            skipped: count(PregenStatus::Skipped),
            failed: count(PregenStatus::Error),
            results,
        })
    }

    /// Build, store and record the archive of one album
    pub async fn generate_for(&self, album: &AlbumRecord) -> PregenResult {
        let result = |status, archive_url, message: Option<String>| PregenResult {
            album_id: album.id.clone(),
            title: album.title.clone(),
            status,
            archive_url,
            message,
        };

        let sources = match songs::list_track_sources(&self.db, &album.id).await {
            Ok(sources) => sources,
            Err(e) => return result(PregenStatus::Error, None, Some(e.to_string())),
        };
        let job = ArchiveJob {
            album_id: album.id.clone(),
            descriptors: descriptors_from_sources(sources),
        };

        let built = match build_archive(self.fetcher.clone(), job, &self.policy, &self.retry).await {
            Ok(built) => built,
            Err(ArchiveError::NoTracksAvailable) => {
                return result(PregenStatus::Skipped, None, Some("Album has no songs".to_string()))
            }
            Err(e) => {
                tracing::warn!(album_id = %album.id, error = %e, "Archive build failed");
                return result(PregenStatus::Error, None, Some(e.to_string()));
            }
        };

        let path = paths::archive_path(&album.id, &album.title, self.clock.now().timestamp());
        let put = self
            .retry
            .run("archive upload", || {
                self.storage.put(&path, built.bytes.clone(), "application/zip")
            })
            .await;
        let url = match put {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(album_id = %album.id, error = %e, "Archive upload failed");
                return result(PregenStatus::Error, None, Some(e.to_string()));
            }
        };

        if let Err(e) = albums::set_archive_url(&self.db, &album.id, &url).await {
            return result(PregenStatus::Error, None, Some(e.to_string()));
        }

        tracing::info!(
            album_id = %album.id,
            entries = built.entries.len(),
            skipped = built.skipped.len(),
            bytes = built.bytes.len(),
            "Album archive pre-generated"
        );
        result(PregenStatus::Success, Some(url), None)
    }
}
