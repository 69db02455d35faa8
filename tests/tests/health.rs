//! Tests for health check endpoints.

use axum::http::StatusCode;
use event_store::StoreOp;
use integration_tests::setup::TestContext;
use serde_json::Value;

/// /api/health reports a reachable store
#[tokio::test]
async fn test_health_endpoint_healthy() {
    let ctx = TestContext::new();
    let response = ctx.server().get("/api/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["service"], "api");
    assert!(body["version"].is_string());
    assert!(body["timestamp"].is_string());
    assert!(body.get("error").is_none());
}

/// /api/health returns 503 when the store does not answer
#[tokio::test]
async fn test_health_endpoint_store_down() {
    let ctx = TestContext::new();
    ctx.store.fail_always(StoreOp::Ping);

    let response = ctx.server().get("/api/health").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = response.json();
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["database"], "disconnected");
    assert!(body["error"].as_str().unwrap().contains("DB_001"));
}

/// /api/health recovers once the store is back
#[tokio::test]
async fn test_health_endpoint_recovers() {
    let ctx = TestContext::new();
    let server = ctx.server();
    ctx.store.fail_next(StoreOp::Ping, 1);

    server
        .get("/api/health")
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);
    server.get("/api/health").await.assert_status_ok();
}

/// /health/live is always 200, even with the store down
#[tokio::test]
async fn test_live_endpoint() {
    let ctx = TestContext::new();
    ctx.store.fail_always(StoreOp::Ping);

    ctx.server().get("/health/live").await.assert_status_ok();
    assert_eq!(ctx.store.call_count(StoreOp::Ping), 0);
}

/// /api/status exposes component health and counters
#[tokio::test]
async fn test_status_endpoint_structure() {
    let ctx = TestContext::new();
    let server = ctx.server();
    server.get("/api/health").await.assert_status_ok();

    let response = server.get("/api/status").await;
    response.assert_status_ok();

    let body: Value = response.json();
    let components = body["health"]["components"].as_array().unwrap();
    let names: Vec<_> = components.iter().map(|c| c["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["store", "worker"]);
    assert!(body["stats"]["ticks_started"].is_u64());
    assert!(body["stats"]["events_ingested"].is_u64());
}
