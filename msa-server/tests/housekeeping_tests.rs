//! Integration tests for trash purge, scheduled publishing and archive pre-generation

mod helpers;

use axum::http::StatusCode;
use chrono::Duration as ChronoDuration;
use helpers::*;
use msa_common::Clock;
use msa_server::db::{albums, songs};
use msa_server::models::PublishSchedule;
use msa_server::services::PregenRunState;
use std::time::Duration;

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[tokio::test]
async fn test_cleanup_requires_secret() {
    let app = TestApp::new(FakeFetcher::new()).await;

    let missing = app.send(post("/cleanup/auto-delete-old-albums", None)).await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = app
        .send(post("/cleanup/publish-scheduled-albums", Some("guess")))
        .await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

    let admin = app.send(post("/admin/generate-archives", None)).await;
    assert_eq!(admin.status(), StatusCode::UNAUTHORIZED);

    let admin_status = app.send(get("/admin/generate-archives/status")).await;
    assert_eq!(admin_status.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_cleanup_disabled_without_configured_secret() {
    let mut config = test_config();
    config.housekeeping.cleanup_secret = String::new();
    let app = TestApp::with_config(FakeFetcher::new(), config).await;

    let response = app
        .send(post("/cleanup/auto-delete-old-albums", Some("")))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_purge_removes_expired_albums_and_objects() {
    let app = TestApp::new(FakeFetcher::new()).await;
    let old = seed_album(&app.db, "Velho", &[("Um", "https://cdn.test/1.mp3")]).await;
    let recent = seed_album(&app.db, "Recente", &[("Um", "https://cdn.test/2.mp3")]).await;
    let live = seed_album(&app.db, "Vivo", &[("Um", "https://cdn.test/3.mp3")]).await;

    app.storage.seed(&format!("songs/{}/01_Um.mp3", old), b"a");
    app.storage.seed(&format!("albums/artist-1/{}/cover.jpg", old), b"c");
    app.storage.seed(&format!("albums/{}/Velho_1.zip", old), b"z");
    app.storage.seed(&format!("songs/{}/01_Um.mp3", recent), b"b");
    app.storage.seed(&format!("songs/{}/01_Um.mp3", live), b"l");

    albums::soft_delete(&app.db, &old, epoch()).await.unwrap();
    app.clock.advance(DAY * 20);
    albums::soft_delete(&app.db, &recent, app.state.clock.now()).await.unwrap();
    app.clock.advance(DAY * 11);

    let response = app
        .send(post("/cleanup/auto-delete-old-albums", Some(CLEANUP_SECRET)))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["deleted_count"], 1);
    assert_eq!(report["error_count"], 0);

    assert!(albums::load_album(&app.db, &old).await.unwrap().is_none());
    assert!(songs::list_track_sources(&app.db, &old).await.unwrap().is_empty());
    assert!(albums::load_album(&app.db, &recent).await.unwrap().is_some());
    assert!(albums::load_album(&app.db, &live).await.unwrap().is_some());

    let remaining = app.storage.paths();
    assert!(remaining.iter().all(|p| !p.contains(&old)));
    assert_eq!(remaining.len(), 2);
}

#[tokio::test]
async fn test_failed_listing_keeps_album_for_next_sweep() {
    let app = TestApp::new(FakeFetcher::new()).await;
    let old = seed_album(&app.db, "Velho", &[("Um", "https://cdn.test/1.mp3")]).await;
    app.storage.seed(&format!("songs/{}/01_Um.mp3", old), b"a");
    app.storage.seed(&format!("albums/artist-1/{}/cover.jpg", old), b"c");

    albums::soft_delete(&app.db, &old, epoch()).await.unwrap();
    app.clock.advance(DAY * 31);
    app.storage.fail_lists_containing("albums/artist-1/");

    let report = body_json(
        app.send(post("/cleanup/auto-delete-old-albums", Some(CLEANUP_SECRET)))
            .await,
    )
    .await;

    assert_eq!(report["deleted_count"], 0);
    assert_eq!(report["error_count"], 1);
    assert!(albums::load_album(&app.db, &old).await.unwrap().is_some());
    assert_eq!(songs::list_track_sources(&app.db, &old).await.unwrap().len(), 1);
    // Other prefixes are still cleaned
    assert_eq!(
        app.storage.paths(),
        vec![format!("albums/artist-1/{}/cover.jpg", old)]
    );

    app.storage.heal_lists();
    let report = body_json(
        app.send(post("/cleanup/auto-delete-old-albums", Some(CLEANUP_SECRET)))
            .await,
    )
    .await;

    assert_eq!(report["deleted_count"], 1);
    assert_eq!(report["error_count"], 0);
    assert!(albums::load_album(&app.db, &old).await.unwrap().is_none());
    assert!(app.storage.paths().is_empty());
}

#[tokio::test]
async fn test_purge_with_nothing_expired() {
    let app = TestApp::new(FakeFetcher::new()).await;

    let response = app
        .send(post("/cleanup/auto-delete-old-albums", Some(CLEANUP_SECRET)))
        .await;

    let report = body_json(response).await;
    assert_eq!(report["deleted_count"], 0);
    assert_eq!(report["message"], "No albums to delete");
}

#[tokio::test]
async fn test_trash_status_reports_countdown() {
    let app = TestApp::new(FakeFetcher::new()).await;
    let album_id = seed_album(&app.db, "Lixeira", &[]).await;
    albums::soft_delete(&app.db, &album_id, epoch()).await.unwrap();
    app.clock.advance(DAY * 12);

    let response = app.send(get("/cleanup/status")).await;

    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["trashed_count"], 1);
    assert_eq!(status["auto_delete_count"], 0);
    assert_eq!(status["albums"][0]["days_in_trash"], 12);
    assert_eq!(status["albums"][0]["days_until_delete"], 18);
    assert_eq!(status["albums"][0]["will_auto_delete"], false);
}

#[tokio::test]
async fn test_publish_due_scheduled_albums() {
    let app = TestApp::new(FakeFetcher::new()).await;

    let mut due = metadata("Agendado", "artist-1");
    due.schedule = PublishSchedule::At(epoch() + ChronoDuration::hours(2));
    let due_id = albums::insert_album(&app.db, &due, &due.slug(), &due.visibility(epoch()), epoch())
        .await
        .unwrap();

    let mut later = metadata("Depois", "artist-1");
    later.schedule = PublishSchedule::At(epoch() + ChronoDuration::days(3));
    let later_id = albums::insert_album(&app.db, &later, &later.slug(), &later.visibility(epoch()), epoch())
        .await
        .unwrap();

    app.clock.advance(Duration::from_secs(3 * 60 * 60));
    let response = app
        .send(post("/cleanup/publish-scheduled-albums", Some(CLEANUP_SECRET)))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["published_count"], 1);

    let published = albums::load_album(&app.db, &due_id).await.unwrap().unwrap();
    assert!(!published.is_private);
    assert!(!published.is_scheduled);

    let waiting = albums::load_album(&app.db, &later_id).await.unwrap().unwrap();
    assert!(waiting.is_private);
    assert!(waiting.is_scheduled);
}

/// Poll the admin status route until the background pass stops
async fn wait_for_pregen(app: &TestApp) -> serde_json::Value {
    for _ in 0..100 {
        let request = get_with_secret("/admin/generate-archives/status", CLEANUP_SECRET);
        let job = body_json(app.send(request).await).await;
        if job["state"] != "running" {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("archive pre-generation did not finish");
}

fn get_with_secret(uri: &str, secret: &str) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::builder()
        .method("GET")
        .uri(uri)
        .header("X-Cleanup-Secret", secret)
        .body(axum::body::Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_generate_archives_status_before_any_run() {
    let app = TestApp::new(FakeFetcher::new()).await;

    let job = body_json(
        app.send(get_with_secret("/admin/generate-archives/status", CLEANUP_SECRET))
            .await,
    )
    .await;

    assert_eq!(job["state"], "idle");
    assert!(job.get("report").is_none());
}

#[tokio::test]
async fn test_second_generate_request_joins_running_pass() {
    let fetcher = FakeFetcher::new().with(
        "https://cdn.test/slow.mp3",
        FakeResponse::Delayed(Duration::from_millis(300), audio_payload("slow")),
    );
    let app = TestApp::new(fetcher).await;
    seed_album(&app.db, "Lento", &[("Um", "https://cdn.test/slow.mp3")]).await;

    let first = app
        .send(post("/admin/generate-archives", Some(CLEANUP_SECRET)))
        .await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = app
        .send(post("/admin/generate-archives", Some(CLEANUP_SECRET)))
        .await;
    assert_eq!(second.status(), StatusCode::OK);
    let body = body_json(second).await;
    assert_eq!(body["started"], false);
    assert_eq!(body["job"]["state"], "running");

    let job = wait_for_pregen(&app).await;
    assert_eq!(job["state"], "finished");
    assert_eq!(job["report"]["succeeded"], 1);
    assert_eq!(app.fetcher.calls(), 1);
}

#[tokio::test]
async fn test_shutdown_stops_pregeneration_between_albums() {
    let fetcher = FakeFetcher::new()
        .with(
            "https://cdn.test/slow-1.mp3",
            FakeResponse::Delayed(Duration::from_millis(200), audio_payload("1")),
        )
        .with(
            "https://cdn.test/slow-2.mp3",
            FakeResponse::Delayed(Duration::from_millis(200), audio_payload("2")),
        );
    let app = TestApp::new(fetcher).await;
    seed_album(&app.db, "Primeiro", &[("Um", "https://cdn.test/slow-1.mp3")]).await;
    seed_album(&app.db, "Segundo", &[("Um", "https://cdn.test/slow-2.mp3")]).await;

    let handle = app
        .state
        .pregen
        .start(app.state.shutdown.child_token())
        .await
        .expect("pass started");
    tokio::time::sleep(Duration::from_millis(50)).await;
    app.state.shutdown.cancel();
    handle.await.unwrap();

    let job = app.state.pregen.status().await;
    assert_eq!(job.state, PregenRunState::Aborted);
    assert_eq!(job.total, 2);
    assert_eq!(job.processed, 1);
    assert_eq!(app.fetcher.calls(), 1);
}

#[tokio::test]
async fn test_generate_archives_stores_zip_and_url() {
    let fetcher = FakeFetcher::new()
        .with_audio("https://cdn.test/1.mp3")
        .with_audio("https://cdn.test/2.mp3");
    let app = TestApp::new(fetcher).await;
    let album_id = seed_album(
        &app.db,
        "Pre Gerado",
        &[("Um", "https://cdn.test/1.mp3"), ("Dois", "https://cdn.test/2.mp3")],
    )
    .await;
    let empty_id = seed_album(&app.db, "Sem Faixas", &[]).await;

    let response = app
        .send(post("/admin/generate-archives", Some(CLEANUP_SECRET)))
        .await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_json(response).await["started"], true);

    let job = wait_for_pregen(&app).await;
    assert_eq!(job["state"], "finished");
    assert_eq!(job["processed"], 2);
    let report = &job["report"];
    assert_eq!(report["total"], 2);
    assert_eq!(report["succeeded"], 1);
    assert_eq!(report["skipped"], 1);
    assert_eq!(report["failed"], 0);

    let expected_path = format!("albums/{}/Pre_Gerado_{}.zip", album_id, epoch().timestamp());
    let (bytes, content_type) = app.storage.get(&expected_path).expect("archive stored");
    assert_eq!(content_type, "application/zip");
    let names: Vec<String> = zip_entries(&bytes).into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["01 - Um.mp3", "02 - Dois.mp3"]);

    let album = albums::load_album(&app.db, &album_id).await.unwrap().unwrap();
    assert_eq!(
        album.archive_url.as_deref(),
        Some(format!("{}/{}", PUBLIC_BASE, expected_path).as_str())
    );
    let empty = albums::load_album(&app.db, &empty_id).await.unwrap().unwrap();
    assert!(empty.archive_url.is_none());
}

#[tokio::test]
async fn test_scheduler_runs_until_cancelled() {
    use msa_server::services::housekeeping::{spawn_scheduler, HousekeepingSettings};
    use tokio_util::sync::CancellationToken;

    let app = TestApp::new(FakeFetcher::new()).await;
    let album_id = seed_album(&app.db, "Expirado", &[]).await;
    albums::soft_delete(&app.db, &album_id, epoch()).await.unwrap();
    app.clock.advance(DAY * 31);

    let settings = HousekeepingSettings {
        interval_secs: 1,
        ..HousekeepingSettings::default()
    };
    let cancel = CancellationToken::new();
    let handle = spawn_scheduler(app.state.housekeeper.clone(), &settings, cancel.clone())
        .expect("scheduler enabled");

    // First tick fires immediately
    for _ in 0..50 {
        if albums::load_album(&app.db, &album_id).await.unwrap().is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(albums::load_album(&app.db, &album_id).await.unwrap().is_none());

    cancel.cancel();
    handle.await.unwrap();

    let disabled = HousekeepingSettings::default();
    assert!(spawn_scheduler(app.state.housekeeper.clone(), &disabled, cancel).is_none());
}
