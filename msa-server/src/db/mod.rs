//! Album/song metadata persistence
//!
//! SQLite through `sqlx`. Every function takes the pool explicitly; there is
//! no repository object.

pub mod albums;
pub mod songs;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the file if missing (mode=rwc) and the album/song tables.
pub async fn init_database_pool(db_path: &Path) -> sqlx::Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Single-connection in-memory database with tables created
///
/// One connection only: every `:memory:` connection is its own database.
pub async fn init_memory_pool() -> sqlx::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    init_tables(&pool).await?;
    Ok(pool)
}

/// Create the albums and songs tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS albums (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            genre TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '[]',
            slug TEXT NOT NULL UNIQUE,
            artist_id TEXT NOT NULL,
            artist_name TEXT NOT NULL DEFAULT '',
            cover_url TEXT,
            archive_url TEXT,
            is_private INTEGER NOT NULL DEFAULT 0,
            is_scheduled INTEGER NOT NULL DEFAULT 0,
            scheduled_publish_at TEXT,
            release_date TEXT,
            release_year TEXT,
            song_count INTEGER NOT NULL DEFAULT 0,
            download_count INTEGER NOT NULL DEFAULT 0,
            deleted_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS songs (
            id TEXT PRIMARY KEY,
            album_id TEXT NOT NULL REFERENCES albums(id),
            title TEXT NOT NULL,
            artist_id TEXT NOT NULL,
            artist_name TEXT NOT NULL DEFAULT '',
            album_name TEXT NOT NULL DEFAULT '',
            audio_url TEXT,
            cover_url TEXT,
            track_number INTEGER,
            duration INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_songs_album ON songs(album_id, track_number)")
        .execute(pool)
        .await?;

    tracing::info!("Database tables initialized (albums, songs)");

    Ok(())
}
