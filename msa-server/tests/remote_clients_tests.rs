//! Tests for the real HTTP clients against local axum servers
//!
//! Tests cover:
//! - HttpFetcher status, size and timeout classification
//! - Full download pipeline over HTTP (short payloads, slow tracks)
//! - SupabaseStorage request layout and auth failure mapping

mod helpers;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing,
    Json, Router,
};
use helpers::*;
use msa_common::ManualClock;
use msa_server::db;
use msa_server::services::{AudioFetcher, FetchError, FetchSettings, HttpFetcher};
use msa_server::storage::{ObjectStorage, StorageError, StorageSettings, SupabaseStorage};
use msa_server::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::util::ServiceExt;

fn audio_host() -> Router {
    Router::new()
        .route("/ok.mp3", routing::get(|| async { vec![7u8; 2000] }))
        .route("/intro.mp3", routing::get(|| async { vec![1u8; 4000] }))
        .route("/tiny.mp3", routing::get(|| async { vec![0u8; 500] }))
        .route("/broken.mp3", routing::get(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
        .route("/moved.mp3", routing::get(|| async { Redirect::temporary("/ok.mp3") }))
        .route(
            "/slow.mp3",
            routing::get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                vec![9u8; 2000]
            }),
        )
}

fn fetch_settings() -> FetchSettings {
    FetchSettings {
        timeout_secs: 1,
        ..FetchSettings::default()
    }
}

#[tokio::test]
async fn test_http_fetcher_classifies_responses() {
    let addr = spawn_server(audio_host()).await;
    let fetcher = HttpFetcher::new(&fetch_settings()).unwrap();
    let url = |path: &str| format!("http://{}{}", addr, path);

    let ok = fetcher.fetch(&url("/ok.mp3")).await.unwrap();
    assert_eq!(ok.len(), 2000);

    let moved = fetcher.fetch(&url("/moved.mp3")).await.unwrap();
    assert_eq!(moved.len(), 2000);

    assert_eq!(
        fetcher.fetch(&url("/tiny.mp3")).await,
        Err(FetchError::TooSmall { len: 500, min: 1000 })
    );
    assert_eq!(
        fetcher.fetch(&url("/missing.mp3")).await,
        Err(FetchError::Http { status: 404 })
    );
    assert_eq!(
        fetcher.fetch(&url("/broken.mp3")).await,
        Err(FetchError::Http { status: 500 })
    );
    assert_eq!(fetcher.fetch(&url("/slow.mp3")).await, Err(FetchError::Timeout));
}

/// App wired to the real fetcher, songs pointing at `addr`
async fn http_app(addr: std::net::SocketAddr, tracks: &[(&str, &str)]) -> (axum::Router, String) {
    let pool = db::init_memory_pool().await.unwrap();
    let tracks: Vec<(String, String)> = tracks
        .iter()
        .map(|(title, path)| (title.to_string(), format!("http://{}{}", addr, path)))
        .collect();
    let borrowed: Vec<(&str, &str)> = tracks.iter().map(|(t, u)| (t.as_str(), u.as_str())).collect();
    let album_id = seed_album(&pool, "Rede", &borrowed).await;

    let mut config = test_config();
    config.archive.fetch = fetch_settings();
    let fetcher = Arc::new(HttpFetcher::new(&config.archive.fetch).unwrap());
    let state = AppState::new(
        pool,
        config,
        fetcher,
        Arc::new(InMemoryStorage::new()),
        Arc::new(ManualClock::new(epoch())),
    );
    (build_router(state), album_id)
}

#[tokio::test]
async fn test_short_payload_left_out_of_archive() {
    let addr = spawn_server(audio_host()).await;
    let (router, album_id) = http_app(addr, &[("Curta", "/tiny.mp3"), ("Boa", "/ok.mp3")]).await;

    let response = router
        .oneshot(get(&format!("/albums/{}/download", album_id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let entries = zip_entries(&body_bytes(response).await);
    let names: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["02 - Boa.mp3"]);
}

#[tokio::test]
async fn test_slow_track_times_out_and_is_left_out() {
    let addr = spawn_server(audio_host()).await;
    let (router, album_id) = http_app(addr, &[("Intro", "/intro.mp3"), ("Lenta", "/slow.mp3")]).await;

    let response = router
        .oneshot(get(&format!("/albums/{}/download", album_id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let entries = zip_entries(&body_bytes(response).await);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, "01 - Intro.mp3");
    assert_eq!(entries[0].1, vec![1u8; 4000]);
}

#[tokio::test]
async fn test_every_track_missing_is_500() {
    let addr = spawn_server(audio_host()).await;
    let (router, album_id) = http_app(addr, &[("Um", "/gone-1.mp3"), ("Dois", "/gone-2.mp3")]).await;

    let response = router
        .oneshot(get(&format!("/albums/{}/download", album_id)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

/// What the fake storage API saw
#[derive(Default)]
struct StorageLog {
    puts: Vec<(String, String, usize, String)>,
    deletes: Vec<Value>,
}

type SharedLog = Arc<Mutex<StorageLog>>;

const SERVICE_KEY: &str = "service-key";

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("apikey").and_then(|v| v.to_str().ok()) == Some(SERVICE_KEY)
        && headers.get("authorization").and_then(|v| v.to_str().ok())
            == Some(&format!("Bearer {}", SERVICE_KEY)[..])
}

async fn put_object(
    State(log): State<SharedLog>,
    Path((bucket, path)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::FORBIDDEN, Json(json!({"error": "Unauthorized"})));
    }
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    log.lock().unwrap().puts.push((bucket, path.clone(), body.len(), content_type));
    (StatusCode::OK, Json(json!({ "Key": path })))
}

async fn list_objects(headers: HeaderMap, Json(request): Json<Value>) -> impl IntoResponse {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "Unauthorized"})));
    }
    let prefix = request["prefix"].as_str().unwrap_or_default().to_string();
    (
        StatusCode::OK,
        Json(json!([
            { "name": "01_Um.mp3", "id": "x1", "metadata": { "size": 10 } },
            { "name": format!("{}.marker", prefix.replace('/', "_")), "id": "x2" },
        ])),
    )
}

async fn delete_objects(State(log): State<SharedLog>, Json(request): Json<Value>) -> StatusCode {
    log.lock().unwrap().deletes.push(request);
    StatusCode::OK
}

async fn storage_api() -> (std::net::SocketAddr, SharedLog) {
    let log = SharedLog::default();
    let router = Router::new()
        .route("/storage/v1/object/list/:bucket", routing::post(list_objects))
        .route("/storage/v1/object/:bucket/*path", routing::post(put_object))
        .route("/storage/v1/object/:bucket", routing::delete(delete_objects))
        .with_state(log.clone());
    (spawn_server(router).await, log)
}

fn storage_settings(addr: std::net::SocketAddr, key: &str) -> StorageSettings {
    StorageSettings {
        base_url: format!("http://{}", addr),
        service_key: key.to_string(),
        ..StorageSettings::default()
    }
}

#[tokio::test]
async fn test_supabase_put_list_delete() {
    let (addr, log) = storage_api().await;
    let storage = SupabaseStorage::new(&storage_settings(addr, SERVICE_KEY)).unwrap();

    let url = storage
        .put("songs/a1/01_Um.mp3", bytes::Bytes::from_static(b"abc"), "audio/mpeg")
        .await
        .unwrap();
    assert_eq!(
        url,
        format!("http://{}/storage/v1/object/public/musica/songs/a1/01_Um.mp3", addr)
    );

    let listed = storage.list("songs/a1").await.unwrap();
    let names: Vec<&str> = listed.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["01_Um.mp3", "songs_a1.marker"]);

    storage
        .delete(&["songs/a1/01_Um.mp3".to_string()])
        .await
        .unwrap();
    storage.delete(&[]).await.unwrap();

    let log = log.lock().unwrap();
    assert_eq!(
        log.puts,
        vec![(
            "musica".to_string(),
            "songs/a1/01_Um.mp3".to_string(),
            3,
            "audio/mpeg".to_string()
        )]
    );
    assert_eq!(log.deletes, vec![json!({ "prefixes": ["songs/a1/01_Um.mp3"] })]);
}

#[tokio::test]
async fn test_supabase_rejected_key_is_unauthorized() {
    let (addr, _log) = storage_api().await;
    let storage = SupabaseStorage::new(&storage_settings(addr, "wrong-key")).unwrap();

    let put = storage
        .put("albums/x/cover.jpg", bytes::Bytes::from_static(b"img"), "image/jpeg")
        .await;
    assert_eq!(put, Err(StorageError::Unauthorized { status: 403 }));

    let list = storage.list("songs/x").await;
    assert_eq!(list, Err(StorageError::Unauthorized { status: 401 }));
}
