//! Test application wiring, seed data and request/response helpers

use axum::{
    body::Body,
    http::{Request, Response},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use msa_common::{ManualClock, RetryPolicy};
use msa_server::config::ServerConfig;
use msa_server::db::{self, albums, songs};
use msa_server::models::{AlbumMetadata, PublishSchedule};
use msa_server::{build_router, AppState};
use serde_json::Value;
use sqlx::SqlitePool;
use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::util::ServiceExt;

use super::fakes::{FakeFetcher, InMemoryStorage};

pub const CLEANUP_SECRET: &str = "test-cleanup-secret";

/// Fixed start instant for manual clocks
pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

/// Retry policy that keeps tests fast
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        base_delay_ms: 1,
        max_delay_ms: 2,
        jitter: 0.0,
    }
}

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.retry = fast_retry();
    config.housekeeping.cleanup_secret = CLEANUP_SECRET.to_string();
    config
}

/// Everything a test may want to poke at
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub db: SqlitePool,
    pub fetcher: Arc<FakeFetcher>,
    pub storage: Arc<InMemoryStorage>,
    pub clock: ManualClock,
}

impl TestApp {
    pub async fn new(fetcher: FakeFetcher) -> Self {
        Self::with_config(fetcher, test_config()).await
    }

    pub async fn with_config(fetcher: FakeFetcher, config: ServerConfig) -> Self {
        let db = db::init_memory_pool().await.expect("in-memory database");
        let fetcher = Arc::new(fetcher);
        let storage = Arc::new(InMemoryStorage::new());
        let clock = ManualClock::new(epoch());

        let state = AppState::new(
            db.clone(),
            config,
            fetcher.clone(),
            storage.clone(),
            Arc::new(clock.clone()),
        );
        let router = build_router(state.clone());

        Self {
            state,
            router,
            db,
            fetcher,
            storage,
            clock,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.expect("router response")
    }
}

pub fn metadata(title: &str, artist_id: &str) -> AlbumMetadata {
    AlbumMetadata {
        title: title.to_string(),
        description: String::new(),
        genre: "mpb".to_string(),
        tags: vec![],
        is_public: true,
        schedule: PublishSchedule::Immediate,
        release_date: None,
        custom_slug: None,
        artist_id: artist_id.to_string(),
        artist_name: format!("Artist {}", artist_id),
    }
}

/// Insert an album with songs `(title, audio_url)` numbered from 1
pub async fn seed_album(pool: &SqlitePool, title: &str, tracks: &[(&str, &str)]) -> String {
    let metadata = metadata(title, "artist-1");
    let visibility = metadata.visibility(epoch());
    let album_id = albums::insert_album(pool, &metadata, &metadata.slug(), &visibility, epoch())
        .await
        .expect("insert album");

    for (index, (song_title, url)) in tracks.iter().enumerate() {
        let song = songs::NewSong {
            album_id: album_id.clone(),
            title: song_title.to_string(),
            artist_id: metadata.artist_id.clone(),
            artist_name: metadata.artist_name.clone(),
            album_name: title.to_string(),
            audio_url: url.to_string(),
            cover_url: None,
            track_number: index as i64 + 1,
        };
        songs::insert_song(pool, &song, epoch()).await.expect("insert song");
    }
    albums::set_song_count(pool, &album_id, tracks.len() as i64)
        .await
        .expect("song count");

    album_id
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap()
}

pub fn post(uri: &str, secret: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(secret) = secret {
        builder = builder.header("X-Cleanup-Secret", secret);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> bytes::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("JSON body")
}

/// `(name, contents)` of every entry, in archive order
pub fn zip_entries(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
    (0..archive.len())
        .map(|index| {
            let mut entry = archive.by_index(index).expect("zip entry");
            let mut data = Vec::new();
            entry.read_to_end(&mut data).expect("entry data");
            (entry.name().to_string(), data)
        })
        .collect()
}

/// Build a ZIP in memory from `(path, contents)` pairs
pub fn build_zip(files: &[(&str, &str)]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (path, data) in files {
        writer.start_file(*path, SimpleFileOptions::default()).unwrap();
        writer.write_all(data.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Serve `router` on an ephemeral local port
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
