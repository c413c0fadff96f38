//! HTTP binding tests
//!
//! Drives the request-per-operation binding through the router with
//! `tower::ServiceExt::oneshot`, no listening socket required.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sha1::{Digest, Sha1};
use tempfile::TempDir;
use tower::ServiceExt;

use stash_server::config::Config;
use stash_server::db::{self, SqliteItemStore};
use stash_server::hooks::HookBus;
use stash_server::media::MediaService;
use stash_server::routes;
use stash_server::state::AppState;
use stash_server::upload::{StreamRegistry, UploadService};
use stash_server::web::PageRenderer;

fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

async fn app(dir: &TempDir) -> Router {
    let mut config = Config::default();
    config.storage.upload_dir = dir.path().join("uploads").display().to_string();
    config.storage.thumbnail_dir = dir.path().join("thumbs").display().to_string();
    config.storage.web_root = dir.path().join("web").display().to_string();
    config.database.url = format!("sqlite://{}/items.db", dir.path().display());

    let hooks = HookBus::default();
    let registry = StreamRegistry::new(
        &config.storage.upload_dir,
        Duration::from_secs(60),
        hooks.clone(),
    )
    .await
    .unwrap();
    let pool = db::create_pool(&config.database.url).await.unwrap();
    let store = Arc::new(SqliteItemStore::new(pool));
    let uploads = UploadService::new(registry, store, hooks.clone(), 12, 10);
    let pages = PageRenderer::new(&config.web, &config.storage.web_root);
    let media = MediaService::new(&config.storage.thumbnail_dir).await.unwrap();

    let state = AppState::new(config, uploads, pages, media, hooks);
    routes::router().with_state(state)
}

async fn post(app: &Router, uri: &str, body: &[u8]) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::from(body.to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// Open a stream, push the given chunks, finalize, return the item id.
async fn upload(app: &Router, extension: &str, chunks: &[&[u8]]) -> String {
    let (status, body) = post(app, &format!("/c/{}", extension), b"").await;
    assert_eq!(status, StatusCode::OK);
    let stream = body["stream"].as_str().unwrap().to_string();

    let mut all = Vec::new();
    for chunk in chunks {
        let (status, body) = post(app, &format!("/u/{}", stream), chunk).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        all.extend_from_slice(chunk);
    }

    let (status, body) = post(app, &format!("/f/{}/{}", stream, sha1_hex(&all)), b"").await;
    assert_eq!(status, StatusCode::OK);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn full_upload_and_download_roundtrip() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let item_id = upload(&app, "png", &[b"\xAA\xBB", b"\xCC\xDD"]).await;
    assert_eq!(item_id.len(), 12);

    let response = get(&app, &format!("/d/{}", item_id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "image/png"
    );
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains(".png"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"\xAA\xBB\xCC\xDD");
}

#[tokio::test]
async fn named_stream_keeps_its_display_name() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (status, body) = post(&app, "/c/txt/notes", b"").await;
    assert_eq!(status, StatusCode::OK);
    let stream = body["stream"].as_str().unwrap().to_string();

    post(&app, &format!("/u/{}", stream), b"hello").await;
    let (_, body) = post(&app, &format!("/f/{}/{}", stream, sha1_hex(b"hello")), b"").await;
    let item_id = body["id"].as_str().unwrap();

    let response = get(&app, &format!("/d/{}", item_id)).await;
    let disposition = response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.contains("notes.txt"));
}

#[tokio::test]
async fn oversized_extension_is_rejected() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (status, body) = post(&app, "/c/waytoolongext", b"").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["generic"], "PARAM_LENGTH");
    assert_eq!(body["field"], "EXTENSION");
}

#[tokio::test]
async fn unknown_ids_surface_as_not_found() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;
    let missing = "m".repeat(32);

    let (status, body) = post(&app, &format!("/u/{}", missing), b"chunk").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["field"], "STREAM");

    let (status, _) = post(&app, &format!("/f/{}/{}", missing, sha1_hex(b"x")), b"").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let response = get(&app, "/d/missingitem1").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chunk_hash_mismatch_is_retryable() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (_, body) = post(&app, "/c/bin", b"").await;
    let stream = body["stream"].as_str().unwrap().to_string();

    // wrong hash: rejected, nothing written
    let wrong = sha1_hex(b"other bytes");
    let (status, body) = post(&app, &format!("/u/{}/{}", stream, wrong), b"chunk").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["generic"], "HASH_MISMATCH");

    // retry with the right hash succeeds, and the finalize digest proves
    // the rejected attempt never touched the stream
    let right = sha1_hex(b"chunk");
    let (status, _) = post(&app, &format!("/u/{}/{}", stream, right), b"chunk").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = post(&app, &format!("/f/{}/{}", stream, sha1_hex(b"chunk")), b"").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn finalize_with_wrong_digest_leaves_the_stream_open() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (_, body) = post(&app, "/c/bin", b"").await;
    let stream = body["stream"].as_str().unwrap().to_string();
    post(&app, &format!("/u/{}", stream), b"payload").await;

    let (status, body) = post(
        &app,
        &format!("/f/{}/{}", stream, sha1_hex(b"not the payload")),
        b"",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["generic"], "HASH_MISMATCH");

    // same stream finalizes fine once the right digest is declared
    let (status, body) = post(
        &app,
        &format!("/f/{}/{}", stream, sha1_hex(b"payload")),
        b"",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["id"].is_string());
}

#[tokio::test]
async fn terminate_is_safe_to_repeat() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let (_, body) = post(&app, "/c/bin", b"").await;
    let stream = body["stream"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let (status, body) = post(&app, &format!("/r/{}", stream), b"").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    // and on an id that never existed
    let (status, _) = post(&app, &format!("/r/{}", "q".repeat(32)), b"").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn duplicate_content_resolves_to_the_same_item() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let first = upload(&app, "png", &[b"\xAA\xBB", b"\xCC\xDD"]).await;
    let second = upload(&app, "png", &[b"\xAA\xBB", b"\xCC\xDD"]).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn meta_page_embeds_the_item() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let item_id = upload(&app, "png", &[b"\x89PNG"]).await;

    let response = get(&app, &format!("/{}", item_id)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let html = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(html.contains(&format!("/d/{}", item_id)));
    assert!(html.contains("og:image"));
}

#[tokio::test]
async fn video_page_for_non_video_item_is_not_found() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir).await;

    let item_id = upload(&app, "png", &[b"\x89PNG"]).await;
    let response = get(&app, &format!("/v/{}", item_id)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
