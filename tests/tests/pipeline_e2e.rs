//! End-to-end tests for the event pipeline: ingest over HTTP, process with
//! the worker, read metrics back over HTTP.
//!
//! Runs entirely against the in-memory store.

use axum::http::StatusCode;
use event_store::{EventStore, StoreOp};
use integration_tests::fixtures::{event_body, malformed_events, mixed_events, sample_batch};
use integration_tests::mocks::GatedStore;
use integration_tests::setup::{scheduler_for, worker_config, TestContext};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use pipeline_core::WorkerFailureMode;
use worker::{EscalationState, WorkerConfig, WorkerExit};

/// Ingest → tick → metrics, using the documented three-event example
#[tokio::test]
async fn test_ingest_process_and_read_metrics() {
    let ctx = TestContext::new();
    let server = ctx.server();

    for (user, action) in [("u1", "click"), ("u1", "click"), ("u2", "purchase")] {
        server
            .post("/api/events")
            .json(&event_body(user, action))
            .await
            .assert_status(StatusCode::CREATED);
    }
    assert_eq!(ctx.store.raw_events().len(), 3);

    let report = ctx.pipeline().run_tick("e2e").await.unwrap();
    assert_eq!(report.archived, 3);

    let body: Value = server.get("/api/metrics").await.json();
    let metrics = &body["metrics"];
    assert_eq!(metrics["totalEvents"], 3);
    assert_eq!(metrics["eventsByAction"]["click"], 2);
    assert_eq!(metrics["eventsByAction"]["purchase"], 1);
    assert_eq!(metrics["eventsByUser"]["u1"], 2);
    assert_eq!(metrics["eventsByUser"]["u2"], 1);
    assert!(metrics["lastUpdated"].is_string());

    assert!(ctx.store.raw_events().is_empty());
    let archived = ctx.store.processed_events();
    assert_eq!(archived.len(), 3);
    assert!(archived.iter().all(|e| e.event.processed));
}

/// Conservation holds after every tick while a large backlog drains
#[tokio::test]
async fn test_backlog_drains_in_batches() {
    let ctx = TestContext::new();
    ctx.store.seed(mixed_events(137));
    let pipeline = ctx.pipeline();

    let mut ticks = 0;
    loop {
        let report = pipeline.run_tick(&format!("drain-{}", ticks)).await.unwrap();
        if report.is_empty() {
            break;
        }
        assert!(report.claimed <= 50);
        ticks += 1;

        let snapshot = ctx.store.snapshot().unwrap();
        assert!(snapshot.is_consistent());
    }

    assert_eq!(ticks, 3);
    let snapshot = ctx.store.snapshot().unwrap();
    assert_eq!(snapshot.total_events, 137);
    assert_eq!(snapshot.events_by_user.len(), 5);
    assert_eq!(ctx.store.processed_events().len(), 137);
}

/// Malformed events never fail a tick and are never retired
#[tokio::test]
async fn test_malformed_events_do_not_escalate() {
    let ctx = TestContext::new();
    ctx.store.seed(malformed_events());
    let mut scheduler = ctx.scheduler();

    for _ in 0..10 {
        scheduler.fire();
        assert_eq!(scheduler.complete().await, Some(EscalationState::Healthy));
    }

    assert_eq!(ctx.store.raw_events().len(), 3);
    assert!(ctx.store.processed_events().is_empty());
    assert!(ctx.store.snapshot().is_none());
}

/// A retire failure after a successful merge recounts the batch (at-least-once)
#[tokio::test]
async fn test_partial_failure_recounts_batch() {
    let ctx = TestContext::new();
    ctx.store.seed(sample_batch());
    ctx.store.fail_next(StoreOp::Archive, 1);
    let mut scheduler = ctx.scheduler();

    scheduler.fire();
    assert_eq!(
        scheduler.complete().await,
        Some(EscalationState::Degraded { failures: 1 })
    );
    assert_eq!(ctx.store.snapshot().unwrap().total_events, 3);

    scheduler.fire();
    assert_eq!(scheduler.complete().await, Some(EscalationState::Healthy));

    let snapshot = ctx.store.snapshot().unwrap();
    assert_eq!(snapshot.total_events, 6);
    assert_eq!(snapshot.count_for_action("click"), 4);
    assert!(snapshot.is_consistent());
    assert!(ctx.store.raw_events().is_empty());
}

/// Timer firings during a slow tick are dropped, not queued
#[tokio::test(start_paused = true)]
async fn test_slow_tick_blocks_overlapping_runs() {
    let ctx = TestContext::new();
    ctx.store.seed(sample_batch());
    let gated = Arc::new(GatedStore::new(ctx.store.clone()));
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(scheduler_for(gated.clone(), worker_config()).run(rx));

    // Ticks due at 10s, 20s and 30s land while the startup tick is blocked.
    tokio::time::sleep(Duration::from_secs(35)).await;
    assert_eq!(gated.claims_started(), 1);
    assert!(ctx.store.snapshot().is_none());

    gated.release(100);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(ctx.store.snapshot().unwrap().total_events, 3);
    assert_eq!(gated.claims_started(), 1);

    // Cadence resumes at the next scheduled tick.
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(gated.claims_started(), 2);

    tx.send(true).unwrap();
    assert_eq!(handle.await.unwrap(), WorkerExit::Shutdown);
}

/// Five consecutive failures end the run loop; no events are lost
#[tokio::test(start_paused = true)]
async fn test_persistent_store_failure_escalates() {
    let ctx = TestContext::new();
    ctx.store.seed(sample_batch());
    ctx.store.fail_always(StoreOp::Claim);
    let (_tx, rx) = watch::channel(false);

    let exit = ctx.scheduler().run(rx).await;
    assert_eq!(exit, WorkerExit::Escalated { consecutive_failures: 5 });
    assert_eq!(ctx.store.call_count(StoreOp::Claim), 5);
    assert_eq!(ctx.store.raw_events().len(), 3);
    assert!(ctx.store.snapshot().is_none());
}

/// Four failures followed by a success keep the worker running
#[tokio::test(start_paused = true)]
async fn test_transient_failures_recover() {
    let ctx = TestContext::new();
    ctx.store.seed(sample_batch());
    ctx.store.fail_next(StoreOp::Claim, 4);
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(ctx.scheduler().run(rx));

    // t = 0..30s fail, t = 40s succeeds, t = 50s and 60s find nothing.
    tokio::time::sleep(Duration::from_secs(65)).await;
    assert_eq!(ctx.store.call_count(StoreOp::Claim), 7);
    assert_eq!(ctx.store.snapshot().unwrap().total_events, 3);

    tx.send(true).unwrap();
    assert_eq!(handle.await.unwrap(), WorkerExit::Shutdown);
}

/// Shutdown waits for an in-flight tick within the grace period
#[tokio::test(start_paused = true)]
async fn test_shutdown_drains_in_flight_tick() {
    let ctx = TestContext::new();
    ctx.store.seed(sample_batch());
    let gated = Arc::new(GatedStore::new(ctx.store.clone()));
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(scheduler_for(gated.clone(), worker_config()).run(rx));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(gated.claims_started(), 1);

    tx.send(true).unwrap();
    gated.release(1);
    assert_eq!(handle.await.unwrap(), WorkerExit::Shutdown);
    assert_eq!(ctx.store.snapshot().unwrap().total_events, 3);

    gated.close().await.unwrap();
    assert!(ctx.store.is_closed());
}

/// A tick still blocked after the grace period is abandoned; its batch stays claimable
#[tokio::test(start_paused = true)]
async fn test_shutdown_aborts_stuck_tick() {
    let ctx = TestContext::new();
    ctx.store.seed(sample_batch());
    let gated = Arc::new(GatedStore::new(ctx.store.clone()));
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(scheduler_for(gated.clone(), worker_config()).run(rx));
    tokio::time::sleep(Duration::from_millis(10)).await;

    tx.send(true).unwrap();
    assert_eq!(handle.await.unwrap(), WorkerExit::Shutdown);
    assert!(ctx.store.snapshot().is_none());
    assert_eq!(ctx.store.raw_events().len(), 3);
}

/// A simulated stuck-worker backlog is drained by ordinary ticks
#[tokio::test]
async fn test_stuck_worker_incident_backlog_drains() {
    let ctx = TestContext::new();
    ctx.server()
        .post("/api/trigger-incident")
        .json(&serde_json::json!({"incident": "stuck_worker"}))
        .await
        .assert_status_ok();

    let pipeline = ctx.pipeline();
    assert_eq!(pipeline.run_tick("incident-1").await.unwrap().archived, 50);
    assert_eq!(pipeline.run_tick("incident-2").await.unwrap().archived, 50);

    let snapshot = ctx.store.snapshot().unwrap();
    assert_eq!(snapshot.total_events, 100);
    assert_eq!(snapshot.count_for_action("test_action"), 100);
    assert_eq!(snapshot.events_by_user.len(), 5);
}

/// Injected schema failures escalate like any other tick failure, and leave
/// the backlog untouched
#[tokio::test(start_paused = true)]
async fn test_bad_schema_mode_escalates() {
    let ctx = TestContext::new();
    ctx.store.seed(sample_batch());
    let config = WorkerConfig {
        failure_mode: WorkerFailureMode::BadSchema,
        failure_rate: Some(1.0),
        ..worker_config()
    };
    let (_tx, rx) = watch::channel(false);

    let exit = scheduler_for(ctx.store.clone(), config).run(rx).await;
    assert_eq!(exit, WorkerExit::Escalated { consecutive_failures: 5 });
    assert_eq!(ctx.store.raw_events().len(), 3);
    assert_eq!(ctx.store.call_count(StoreOp::Claim), 0);
}
