//! Trash sweep, scheduled publishing and trash status
//!
//! Runs on demand from the cleanup endpoints (external cron) and, when an
//! interval is configured, from an in-process scheduler.

use chrono::{DateTime, Utc};
use msa_common::Clock;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::{albums, songs};
use crate::storage::{paths, ObjectStorage, StorageError};

/// Housekeeping settings (`[housekeeping]` section)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HousekeepingSettings {
    /// Days an album stays in the trash before it is purged
    pub trash_retention_days: i64,
    /// In-process run interval; 0 disables the scheduler
    pub interval_secs: u64,
    /// Shared secret for the cleanup endpoints; prefer `MSA_CLEANUP_SECRET`
    pub cleanup_secret: String,
}

impl Default for HousekeepingSettings {
    fn default() -> Self {
        Self {
            trash_retention_days: 30,
            interval_secs: 0,
            cleanup_secret: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PurgeReport {
    pub message: String,
    pub deleted_count: usize,
    pub error_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishReport {
    pub message: String,
    pub published_count: usize,
    pub error_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrashedAlbum {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub deleted_at: DateTime<Utc>,
    pub days_in_trash: i64,
    pub will_auto_delete: bool,
    pub days_until_delete: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrashStatus {
    pub trashed_count: usize,
    pub auto_delete_count: usize,
    pub albums: Vec<TrashedAlbum>,
}

/// Outcome of removing one album's storage objects
#[derive(Debug, Default)]
struct ObjectCleanup {
    removed: usize,
    failed_prefixes: Vec<String>,
}

/// Housekeeping jobs over the album catalogue
#[derive(Clone)]
pub struct Housekeeper {
    db: SqlitePool,
    storage: Arc<dyn ObjectStorage>,
    clock: Arc<dyn Clock>,
    retention_days: i64,
}

impl Housekeeper {
    pub fn new(
        db: SqlitePool,
        storage: Arc<dyn ObjectStorage>,
        clock: Arc<dyn Clock>,
        settings: &HousekeepingSettings,
    ) -> Self {
        Self {
            db,
            storage,
            clock,
            retention_days: settings.trash_retention_days,
        }
    }

    fn retention_cutoff(&self) -> DateTime<Utc> {
        self.clock.now() - chrono::Duration::days(self.retention_days)
    }

    /// Permanently delete albums that have been in the trash past retention
    ///
    /// Each storage prefix is cleaned independently. An album whose objects
    /// could not all be removed keeps its rows and stays in the trash, so the
    /// next sweep retries it; it counts as an error for this run.
    pub async fn purge_expired_trash(&self) -> Result<PurgeReport, sqlx::Error> {
        let cutoff = self.retention_cutoff();
        let expired = albums::list_trashed_before(&self.db, cutoff).await?;

        if expired.is_empty() {
            tracing::debug!(cutoff = %cutoff, "No albums to purge");
            return Ok(PurgeReport {
                message: "No albums to delete".to_string(),
                deleted_count: 0,
                error_count: 0,
            });
        }

        tracing::info!(count = expired.len(), cutoff = %cutoff, "Purging expired albums");
        let mut deleted_count = 0;
        let mut error_count = 0;

        for album in expired {
            let cleanup = self.delete_album_objects(&album.artist_id, &album.id).await;
            if !cleanup.failed_prefixes.is_empty() {
                error_count += 1;
                tracing::warn!(
                    album_id = %album.id,
                    removed = cleanup.removed,
                    failed_prefixes = ?cleanup.failed_prefixes,
                    "Storage cleanup incomplete, album kept in trash for the next sweep"
                );
                continue;
            }

            let rows = async {
                let removed_songs = songs::delete_by_album(&self.db, &album.id).await?;
                albums::delete_album(&self.db, &album.id).await?;
                Ok::<_, sqlx::Error>(removed_songs)
            }
            .await;

            match rows {
                Ok(removed_songs) => {
                    deleted_count += 1;
                    tracing::info!(album_id = %album.id, title = %album.title, songs = removed_songs, "Album purged");
                }
                Err(e) => {
                    error_count += 1;
                    tracing::error!(album_id = %album.id, error = %e, "Failed to purge album rows");
                }
            }
        }

        Ok(PurgeReport {
            message: format!(
                "Cleanup completed: {} albums deleted, {} errors",
                deleted_count, error_count
            ),
            deleted_count,
            error_count,
        })
    }

    async fn delete_album_objects(&self, artist_id: &str, album_id: &str) -> ObjectCleanup {
        let mut cleanup = ObjectCleanup::default();
        for prefix in paths::album_prefixes(artist_id, album_id) {
            match self.delete_prefix(&prefix).await {
                Ok(removed) => cleanup.removed += removed,
                Err(e) => {
                    tracing::warn!(album_id, prefix = %prefix, error = %e, "Failed to clean storage prefix");
                    cleanup.failed_prefixes.push(prefix);
                }
            }
        }
        tracing::debug!(album_id, objects = cleanup.removed, "Album objects deleted");
        cleanup
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let objects: Vec<String> = self
            .storage
            .list(prefix)
            .await?
            .into_iter()
            .map(|object| format!("{}/{}", prefix, object.name))
            .collect();
        self.storage.delete(&objects).await?;
        Ok(objects.len())
    }

    /// Make scheduled albums whose publish time has passed public
    pub async fn publish_due_albums(&self) -> Result<PublishReport, sqlx::Error> {
        let now = self.clock.now();
        let due = albums::list_due_scheduled(&self.db, now).await?;

        if due.is_empty() {
            return Ok(PublishReport {
                message: "No albums to publish".to_string(),
                published_count: 0,
                error_count: 0,
            });
        }

        let mut published_count = 0;
        let mut error_count = 0;
        for album in due {
            match albums::publish(&self.db, &album.id).await {
                Ok(()) => {
                    published_count += 1;
                    tracing::info!(album_id = %album.id, title = %album.title, "Scheduled album published");
                }
                Err(e) => {
                    error_count += 1;
                    tracing::error!(album_id = %album.id, error = %e, "Failed to publish album");
                }
            }
        }

        Ok(PublishReport {
            message: format!("Published {} albums, {} errors", published_count, error_count),
            published_count,
            error_count,
        })
    }

    /// What is in the trash and when it goes away
    pub async fn trash_status(&self) -> Result<TrashStatus, sqlx::Error> {
        let now = self.clock.now();
        let cutoff = self.retention_cutoff();
        let trashed = albums::list_trashed(&self.db).await?;

        let albums: Vec<TrashedAlbum> = trashed
            .into_iter()
            .filter_map(|album| {
                let deleted_at = album.deleted_at?;
                let days_in_trash = (now - deleted_at).num_days();
                Some(TrashedAlbum {
                    id: album.id,
                    title: album.title,
                    artist: album.artist_name,
                    deleted_at,
                    days_in_trash,
                    will_auto_delete: deleted_at < cutoff,
                    days_until_delete: (self.retention_days - days_in_trash).max(0),
                })
            })
            .collect();

        Ok(TrashStatus {
            trashed_count: albums.len(),
            auto_delete_count: albums.iter().filter(|a| a.will_auto_delete).count(),
            albums,
        })
    }

    /// Publish due albums, then purge expired trash
    pub async fn run_once(&self) {
        match self.publish_due_albums().await {
            Ok(report) => tracing::debug!(published = report.published_count, "Scheduled publish pass done"),
            Err(e) => tracing::error!(error = %e, "Scheduled publish pass failed"),
        }
        match self.purge_expired_trash().await {
            Ok(report) => tracing::debug!(deleted = report.deleted_count, "Trash purge pass done"),
            Err(e) => tracing::error!(error = %e, "Trash purge pass failed"),
        }
    }
}

/// Run housekeeping every `interval_secs` until cancelled
///
/// Returns `None` when the interval is 0 (external cron only).
pub fn spawn_scheduler(
    housekeeper: Housekeeper,
    settings: &HousekeepingSettings,
    cancel: CancellationToken,
) -> Option<JoinHandle<()>> {
    if settings.interval_secs == 0 {
        tracing::info!("Housekeeping scheduler disabled (interval_secs = 0)");
        return None;
    }

    let period = Duration::from_secs(settings.interval_secs);
    tracing::info!(interval_secs = settings.interval_secs, "Housekeeping scheduler started");

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("Housekeeping scheduler stopped");
                    break;
                }
                _ = ticker.tick() => housekeeper.run_once().await,
            }
        }
    }))
}
