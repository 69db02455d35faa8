//! ClickHouse backend tests.
//!
//! Require Docker (or `PIPELINE_TEST_CLICKHOUSE_URL`); run with
//! `cargo test -p integration-tests --test clickhouse_store -- --ignored`.

use chrono::{Duration, Utc};
use event_store::EventStore;
use integration_tests::fixtures::{malformed_events, sample_batch};
use integration_tests::setup::ClickHouseContext;
use pipeline_core::{Heartbeat, MetricsSnapshot, Tally};
use worker::Pipeline;

async fn count(ctx: &ClickHouseContext, table: &str) -> u64 {
    let client = ctx.store.client();
    client
        .inner()
        .query(&format!("SELECT count() FROM {}", client.table(table)))
        .fetch_one::<u64>()
        .await
        .expect("count query failed")
}

/// Claim, merge and retire against a real ClickHouse
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_pipeline_tick_on_clickhouse() {
    let ctx = ClickHouseContext::new().await;
    ctx.store.ping().await.expect("ping failed");

    for event in sample_batch().iter().chain(malformed_events().iter()) {
        ctx.store.insert_raw_event(event).await.unwrap();
    }

    let pipeline = Pipeline::new(ctx.store.clone(), 50);
    let report = pipeline.run_tick("ch").await.unwrap();
    assert_eq!(report.claimed, 6);
    assert_eq!(report.processed, 3);
    assert_eq!(report.invalid, 3);
    assert_eq!(report.archived, 3);

    let snapshot = ctx.store.read_metrics_snapshot().await.unwrap().unwrap();
    assert_eq!(snapshot.total_events, 3);
    assert_eq!(snapshot.count_for_action("click"), 2);
    assert_eq!(snapshot.count_for_user("u2"), 1);

    // Only the malformed events are left to claim.
    let remaining = ctx.store.claim_unprocessed(50).await.unwrap();
    assert_eq!(remaining.len(), 3);
    assert_eq!(count(&ctx, "events_processed").await, 3);
}

/// Repeated upserts leave exactly one logical snapshot
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_snapshot_upsert_replaces() {
    let ctx = ClickHouseContext::new().await;
    let tally = Tally::from_events(&sample_batch());

    let first = MetricsSnapshot::merge_into(None, &tally, Utc::now());
    ctx.store.upsert_metrics_snapshot(&first).await.unwrap();
    let second = MetricsSnapshot::merge_into(Some(&first), &tally, Utc::now() + Duration::seconds(1));
    ctx.store.upsert_metrics_snapshot(&second).await.unwrap();

    let read = ctx.store.read_metrics_snapshot().await.unwrap().unwrap();
    assert_eq!(read.total_events, 6);
    assert!(read.is_consistent());
}

/// Retention purge deletes only expired archive rows and writes a heartbeat
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_purge_and_heartbeat() {
    let ctx = ClickHouseContext::new().await;
    for event in sample_batch() {
        ctx.store.insert_raw_event(&event).await.unwrap();
    }
    let ids: Vec<_> = ctx
        .store
        .claim_unprocessed(50)
        .await
        .unwrap()
        .iter()
        .map(|e| e.id)
        .collect();
    ctx.store.archive_and_remove(&ids).await.unwrap();

    let deleted = ctx
        .store
        .purge_processed_before(Utc::now() - Duration::days(30))
        .await
        .unwrap();
    assert_eq!(deleted, 0);

    let deleted = ctx
        .store
        .purge_processed_before(Utc::now() + Duration::minutes(1))
        .await
        .unwrap();
    assert_eq!(deleted, 3);

    ctx.store
        .record_heartbeat(&Heartbeat::healthy("retention", "test"))
        .await
        .unwrap();
    assert_eq!(count(&ctx, "service_heartbeats").await, 1);
}

/// Calls after close fail instead of reaching the server
#[tokio::test]
#[ignore = "requires Docker"]
async fn test_closed_store_rejects_calls() {
    let ctx = ClickHouseContext::new().await;
    ctx.store.close().await.unwrap();
    ctx.store.close().await.unwrap();
    assert!(ctx.store.claim_unprocessed(10).await.is_err());
}
