mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt; // for `oneshot`

use common::{GatedSource, build_state, chapter, eventually, manga, test_config};
use mangabox::api::{AppState, router};
use mangabox::config::Config;
use mangabox::download::EmbeddedPages;

fn build_test_app(config: Config) -> (Router, AppState) {
    let state = build_state(config, Arc::new(EmbeddedPages));
    (router(state.clone()), state)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = build_test_app(test_config(dir.path()));

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "idle");
    assert_eq!(body["active_downloads"], 0);
    assert_eq!(body["components"]["ledger"], "ok");
}

#[tokio::test]
async fn test_start_download_rejects_wrong_content_type() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = build_test_app(test_config(dir.path()));

    let request = Request::builder()
        .method("POST")
        .uri("/downloads")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("{}"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_PAYLOAD");
}

#[tokio::test]
async fn test_start_download_rejects_oversized_body() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.server.max_payload_bytes = mangabox::config::ByteSize(64);
    let (app, _state) = build_test_app(config);

    let payload = json!({ "manga": manga(1, None), "padding": "x".repeat(256) });
    let response = app.oneshot(post_json("/downloads", payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_start_download_accepted() {
    let dir = TempDir::new().unwrap();
    let (app, state) = build_test_app(test_config(dir.path()));

    let payload = json!({ "request_id": 5, "manga": manga(1, None) });
    let response = app.oneshot(post_json("/downloads", payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(json_body(response).await["request_id"], 5);
    eventually(|| state.metrics.snapshot().downloads_started == 1).await;
}

#[tokio::test]
async fn test_start_download_assigns_request_id() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = build_test_app(test_config(dir.path()));

    let response = app
        .clone()
        .oneshot(post_json("/downloads", json!({ "manga": manga(1, None) })))
        .await
        .unwrap();
    let first = json_body(response).await["request_id"].as_i64().unwrap();

    let response = app
        .oneshot(post_json("/downloads", json!({ "manga": manga(2, None) })))
        .await
        .unwrap();
    let second = json_body(response).await["request_id"].as_i64().unwrap();

    assert_ne!(first, second);
}

#[tokio::test]
async fn test_empty_chapter_selection_is_ignored() {
    let dir = TempDir::new().unwrap();
    let (app, state) = build_test_app(test_config(dir.path()));

    let payload = json!({
        "manga": manga(1, Some(vec![chapter("http://127.0.0.1:9", 1, 1)])),
        "chapter_ids": [],
    });
    let response = app.oneshot(post_json("/downloads", payload)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(state.service.snapshot().is_empty());
}

#[tokio::test]
async fn test_metered_network_needs_confirmation() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.network.metered = true;
    let (app, state) = build_test_app(config);

    let response = app
        .clone()
        .oneshot(post_json("/downloads", json!({ "manga": manga(1, None) })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await["code"], "CONFIRMATION_REQUIRED");

    let response = app
        .clone()
        .oneshot(post_json(
            "/downloads",
            json!({ "manga": manga(1, None), "confirmation": { "action": "cancel" } }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["declined"], true);
    assert_eq!(state.metrics.snapshot().downloads_started, 0);

    let response = app
        .clone()
        .oneshot(post_json(
            "/downloads",
            json!({
                "manga": manga(1, None),
                "confirmation": { "action": "continue", "dont_ask_again": true },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // The preference stuck, later requests go through unconfirmed
    let response = app
        .oneshot(post_json("/downloads", json!({ "manga": manga(2, None) })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(!state.gate.settings().is_traffic_warning_enabled().unwrap());
}

#[tokio::test]
async fn test_empty_selection_skips_traffic_gate() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(dir.path());
    config.network.metered = true;
    let (app, state) = build_test_app(config);
    let selection = || manga(1, Some(vec![chapter("http://127.0.0.1:9", 1, 1)]));

    let response = app
        .clone()
        .oneshot(post_json(
            "/downloads",
            json!({ "manga": selection(), "chapter_ids": [] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(post_json(
            "/downloads",
            json!({
                "manga": selection(),
                "chapter_ids": [],
                "confirmation": { "action": "continue", "dont_ask_again": true },
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    assert!(state.gate.settings().is_traffic_warning_enabled().unwrap());
    assert!(state.service.snapshot().is_empty());
    assert_eq!(state.metrics.snapshot().requests_rejected, 2);
}

#[tokio::test]
async fn test_list_and_cancel_downloads() {
    let dir = TempDir::new().unwrap();
    let source = GatedSource::closed();
    let state = build_state(test_config(dir.path()), Arc::new(source));
    let app = router(state.clone());

    let payload = json!({
        "request_id": 4,
        "manga": manga(9, Some(vec![chapter("http://127.0.0.1:9", 1, 1)])),
    });
    let response = app.clone().oneshot(post_json("/downloads", payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app.clone().oneshot(get("/downloads")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body[0]["request_id"], 4);
    assert_eq!(body[0]["manga_id"], 9);
    assert_eq!(body[0]["title"], "Manga 9");

    let cancel = |id: i32| {
        Request::builder()
            .method("DELETE")
            .uri(format!("/downloads/{}", id))
            .body(Body::empty())
            .unwrap()
    };
    let response = app.clone().oneshot(cancel(4)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(state.service.snapshot().is_empty());

    // Unknown ids answer the same way
    let response = app.oneshot(cancel(42)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_watch_downloads_streams_current_list() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = build_test_app(test_config(dir.path()));

    let response = app.oneshot(get("/downloads/watch")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );

    let mut body = response.into_body();
    let frame = tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(text.contains("event: downloads"));
    assert!(text.contains("data: []"));
}

#[tokio::test]
async fn test_watch_client_stays_bound_until_disconnect() {
    let dir = TempDir::new().unwrap();
    let (app, state) = build_test_app(test_config(dir.path()));

    let response = app.oneshot(get("/downloads/watch")).await.unwrap();
    let mut body = response.into_body();
    tokio::time::timeout(Duration::from_secs(5), body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(state.service.bound_clients(), 1);

    drop(body);
    assert_eq!(state.service.bound_clients(), 0);
}

#[tokio::test]
async fn test_notifications_after_failure() {
    let dir = TempDir::new().unwrap();
    let (app, state) = build_test_app(test_config(dir.path()));

    let payload = json!({ "request_id": 2, "manga": manga(1, None) });
    app.clone().oneshot(post_json("/downloads", payload)).await.unwrap();
    eventually(|| state.board.get(2).is_some_and(|n| !n.ongoing)).await;

    let response = app.oneshot(get("/notifications")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body[0]["request_id"], 2);
    assert_eq!(body[0]["kind"], "error");
}

#[tokio::test]
async fn test_feed_round_trip() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = build_test_app(test_config(dir.path()));

    let payload = json!({
        "manga": manga(3, None),
        "chapters": ["Chapter 10", "Chapter 11"],
    });
    let response = app.clone().oneshot(post_json("/feed", payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app.clone().oneshot(get("/feed?limit=10")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["title"], "Manga 3");
    assert_eq!(body[0]["subtitle"], "2 new chapters");

    let request = Request::builder()
        .method("DELETE")
        .uri("/feed")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(json_body(response).await["removed"], 1);

    let response = app.oneshot(get("/feed")).await.unwrap();
    assert!(json_body(response).await.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_feed_rejects_multiline_chapter_names() {
    let dir = TempDir::new().unwrap();
    let (app, state) = build_test_app(test_config(dir.path()));

    let payload = json!({ "manga": manga(3, None), "chapters": ["Chapter 1\nChapter 2"] });
    let response = app.clone().oneshot(post_json("/feed", payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_PAYLOAD");

    let payload = json!({ "manga": manga(3, None), "chapters": ["Chapter 1", ""] });
    let response = app.oneshot(post_json("/feed", payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(state.store.track_logs(0, 10).unwrap().is_empty());
}

#[tokio::test]
async fn test_feed_rejects_empty_chapters() {
    let dir = TempDir::new().unwrap();
    let (app, _state) = build_test_app(test_config(dir.path()));

    let payload = json!({ "manga": manga(3, None), "chapters": [] });
    let response = app.oneshot(post_json("/feed", payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
