//! Song database operations

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::TrackSource;

/// Song row to insert after its audio reached storage
#[derive(Debug, Clone)]
pub struct NewSong {
    pub album_id: String,
    pub title: String,
    pub artist_id: String,
    pub artist_name: String,
    pub album_name: String,
    pub audio_url: String,
    pub cover_url: Option<String>,
    pub track_number: i64,
}

/// Insert a song, returning its generated id
pub async fn insert_song(pool: &SqlitePool, song: &NewSong, now: DateTime<Utc>) -> sqlx::Result<String> {
    let id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        INSERT INTO songs (
            id, album_id, title, artist_id, artist_name, album_name,
            audio_url, cover_url, track_number, duration, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
        "#,
    )
    .bind(&id)
    .bind(&song.album_id)
    .bind(&song.title)
    .bind(&song.artist_id)
    .bind(&song.artist_name)
    .bind(&song.album_name)
    .bind(&song.audio_url)
    .bind(&song.cover_url)
    .bind(song.track_number)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(id)
}

/// Songs of an album ordered by track number ascending (unnumbered last)
pub async fn list_track_sources(pool: &SqlitePool, album_id: &str) -> sqlx::Result<Vec<TrackSource>> {
    let rows = sqlx::query(
        r#"
        SELECT id, title, track_number, audio_url
        FROM songs
        WHERE album_id = ?
        ORDER BY track_number IS NULL, track_number ASC, created_at ASC
        "#,
    )
    .bind(album_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(TrackSource {
                id: row.try_get("id")?,
                title: row.try_get("title")?,
                track_number: row.try_get("track_number")?,
                audio_url: row.try_get("audio_url")?,
            })
        })
        .collect()
}

/// Delete every song of an album, returning how many rows went away
pub async fn delete_by_album(pool: &SqlitePool, album_id: &str) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM songs WHERE album_id = ?")
        .bind(album_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
