//! Tests for the ingestion and metrics endpoints.

use axum::http::header::ORIGIN;
use axum::http::{HeaderValue, StatusCode};
use event_store::StoreOp;
use integration_tests::fixtures::event_body;
use integration_tests::setup::TestContext;
use serde_json::{json, Value};

/// Accepted events are stored unprocessed with a fresh id
#[tokio::test]
async fn test_post_event_stores_raw_event() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let response = server
        .post("/api/events")
        .json(&event_body("user-42", "signup"))
        .await;
    response.assert_status(StatusCode::CREATED);

    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert!(body["message"].is_string());

    let events = ctx.store.raw_events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].user_id, "user-42");
    assert_eq!(events[0].action, "signup");
    assert!(!events[0].processed);
    assert_eq!(body["eventId"].as_str().unwrap(), events[0].id.to_string());
}

/// Each accepted event gets a distinct id
#[tokio::test]
async fn test_event_ids_are_unique() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let mut ids = Vec::new();
    for _ in 0..5 {
        let body: Value = server
            .post("/api/events")
            .json(&event_body("u1", "click"))
            .await
            .json();
        ids.push(body["eventId"].as_str().unwrap().to_string());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 5);
}

/// Missing or empty fields are rejected with VALID_001 and nothing is stored
#[tokio::test]
async fn test_post_event_validation() {
    let ctx = TestContext::new();
    let server = ctx.server();

    let cases = [
        json!({}),
        json!({"userId": "u1"}),
        json!({"action": "click"}),
        json!({"userId": "", "action": ""}),
    ];
    for case in cases {
        let response = server.post("/api/events").json(&case).await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "VALID_001");
    }

    assert_eq!(ctx.store.call_count(StoreOp::InsertRaw), 0);
}

/// Store failures surface as DB_001
#[tokio::test]
async fn test_post_event_store_failure() {
    let ctx = TestContext::new();
    ctx.store.fail_always(StoreOp::InsertRaw);

    let response = ctx
        .server()
        .post("/api/events")
        .json(&event_body("u1", "click"))
        .await;
    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);

    let body: Value = response.json();
    assert_eq!(body["code"], "DB_001");
}

/// Metrics are zero-valued before the worker has run
#[tokio::test]
async fn test_metrics_before_first_tick() {
    let ctx = TestContext::new();
    let server = ctx.server();

    server
        .post("/api/events")
        .json(&event_body("u1", "click"))
        .await
        .assert_status(StatusCode::CREATED);

    let response = server.get("/api/metrics").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["metrics"]["totalEvents"], 0);
    assert_eq!(body["metrics"]["eventsByAction"], json!({}));
    assert_eq!(body["metrics"]["eventsByUser"], json!({}));
    assert!(body["metrics"]["lastUpdated"].is_null());
}

/// Reading metrics never writes
#[tokio::test]
async fn test_metrics_is_read_only() {
    let ctx = TestContext::new();
    ctx.server().get("/api/metrics").await.assert_status_ok();

    assert_eq!(ctx.store.call_count(StoreOp::ReadSnapshot), 1);
    assert_eq!(ctx.store.call_count(StoreOp::UpsertSnapshot), 0);
    assert!(ctx.store.snapshot().is_none());
}

/// Cross-origin reads carry CORS headers
#[tokio::test]
async fn test_cors_headers_present() {
    let ctx = TestContext::new();
    let response = ctx
        .server()
        .get("/api/metrics")
        .add_header(ORIGIN, HeaderValue::from_static("https://example.com"))
        .await;

    response.assert_status_ok();
    assert!(response
        .headers()
        .contains_key("access-control-allow-origin"));
}
