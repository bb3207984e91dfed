//! Album database operations

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{AlbumMetadata, Visibility};

/// Album row
#[derive(Debug, Clone)]
pub struct AlbumRecord {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub artist_id: String,
    pub artist_name: String,
    pub cover_url: Option<String>,
    pub archive_url: Option<String>,
    pub is_private: bool,
    pub is_scheduled: bool,
    pub scheduled_publish_at: Option<DateTime<Utc>>,
    pub song_count: i64,
    pub download_count: i64,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

const ALBUM_COLUMNS: &str = r#"
    id, title, slug, artist_id, artist_name, cover_url, archive_url,
    is_private, is_scheduled, scheduled_publish_at, song_count,
    download_count, deleted_at, created_at
"#;

fn album_from_row(row: &SqliteRow) -> sqlx::Result<AlbumRecord> {
    Ok(AlbumRecord {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        slug: row.try_get("slug")?,
        artist_id: row.try_get("artist_id")?,
        artist_name: row.try_get("artist_name")?,
        cover_url: row.try_get("cover_url")?,
        archive_url: row.try_get("archive_url")?,
        is_private: row.try_get("is_private")?,
        is_scheduled: row.try_get("is_scheduled")?,
        scheduled_publish_at: row.try_get("scheduled_publish_at")?,
        song_count: row.try_get("song_count")?,
        download_count: row.try_get("download_count")?,
        deleted_at: row.try_get("deleted_at")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert a new album, returning its generated id
pub async fn insert_album(
    pool: &SqlitePool,
    metadata: &AlbumMetadata,
    slug: &str,
    visibility: &Visibility,
    now: DateTime<Utc>,
) -> sqlx::Result<String> {
    let id = Uuid::new_v4().to_string();
    let tags = serde_json::to_string(&metadata.tags).unwrap_or_else(|_| "[]".to_string());

    sqlx::query(
        r#"
        INSERT INTO albums (
            id, title, description, genre, tags, slug, artist_id, artist_name,
            is_private, is_scheduled, scheduled_publish_at, release_date,
            release_year, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&metadata.title)
    .bind(&metadata.description)
    .bind(&metadata.genre)
    .bind(tags)
    .bind(slug)
    .bind(&metadata.artist_id)
    .bind(&metadata.artist_name)
    .bind(visibility.is_private)
    .bind(visibility.is_scheduled)
    .bind(visibility.scheduled_publish_at)
    .bind(&metadata.release_date)
    .bind(metadata.release_year())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Load album by id
pub async fn load_album(pool: &SqlitePool, album_id: &str) -> sqlx::Result<Option<AlbumRecord>> {
    let sql = format!("SELECT {} FROM albums WHERE id = ?", ALBUM_COLUMNS);
    let row = sqlx::query(&sql).bind(album_id).fetch_optional(pool).await?;
    row.as_ref().map(album_from_row).transpose()
}

pub async fn set_cover_url(pool: &SqlitePool, album_id: &str, cover_url: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE albums SET cover_url = ? WHERE id = ?")
        .bind(cover_url)
        .bind(album_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_song_count(pool: &SqlitePool, album_id: &str, song_count: i64) -> sqlx::Result<()> {
    sqlx::query("UPDATE albums SET song_count = ? WHERE id = ?")
        .bind(song_count)
        .bind(album_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_archive_url(pool: &SqlitePool, album_id: &str, archive_url: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE albums SET archive_url = ? WHERE id = ?")
        .bind(archive_url)
        .bind(album_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Count one more download
pub async fn increment_download_count(pool: &SqlitePool, album_id: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE albums SET download_count = COALESCE(download_count, 0) + 1 WHERE id = ?")
        .bind(album_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Move an album to the trash; the trash sweep removes it later
pub async fn soft_delete(pool: &SqlitePool, album_id: &str, now: DateTime<Utc>) -> sqlx::Result<()> {
    sqlx::query("UPDATE albums SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL")
        .bind(now)
        .bind(album_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// All albums currently in the trash
pub async fn list_trashed(pool: &SqlitePool) -> sqlx::Result<Vec<AlbumRecord>> {
    let sql = format!(
        "SELECT {} FROM albums WHERE deleted_at IS NOT NULL ORDER BY deleted_at",
        ALBUM_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(album_from_row).collect()
}

/// Albums trashed before `cutoff`
pub async fn list_trashed_before(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> sqlx::Result<Vec<AlbumRecord>> {
    let sql = format!(
        "SELECT {} FROM albums WHERE deleted_at IS NOT NULL AND deleted_at < ? ORDER BY deleted_at",
        ALBUM_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(cutoff).fetch_all(pool).await?;
    rows.iter().map(album_from_row).collect()
}

/// Scheduled albums whose publish time has passed
pub async fn list_due_scheduled(pool: &SqlitePool, now: DateTime<Utc>) -> sqlx::Result<Vec<AlbumRecord>> {
    let sql = format!(
        "SELECT {} FROM albums WHERE is_scheduled = 1 AND scheduled_publish_at <= ?",
        ALBUM_COLUMNS
    );
    let rows = sqlx::query(&sql).bind(now).fetch_all(pool).await?;
    rows.iter().map(album_from_row).collect()
}

/// Make a scheduled album public
pub async fn publish(pool: &SqlitePool, album_id: &str) -> sqlx::Result<()> {
    sqlx::query("UPDATE albums SET is_private = 0, is_scheduled = 0 WHERE id = ?")
        .bind(album_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Live albums that have songs but no pre-generated archive
pub async fn list_without_archive(pool: &SqlitePool) -> sqlx::Result<Vec<AlbumRecord>> {
    let sql = format!(
        "SELECT {} FROM albums WHERE (archive_url IS NULL OR archive_url = '') AND deleted_at IS NULL",
        ALBUM_COLUMNS
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(album_from_row).collect()
}

/// Permanently delete an album row
pub async fn delete_album(pool: &SqlitePool, album_id: &str) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM albums WHERE id = ?")
        .bind(album_id)
        .execute(pool)
        .await?;
    Ok(())
}
