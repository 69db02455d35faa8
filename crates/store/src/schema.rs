//! ClickHouse table schemas.
//!
//! - DateTime64(3) for millisecond precision
//! - Per-key counter maps stored as JSON text
//! - ReplacingMergeTree on a fixed key for single-document collections,
//!   always read with FINAL

use crate::client::ClickHouseClient;
use pipeline_core::{DbErrorCode, Error, Result};
use tracing::debug;

/// Unprocessed events, appended by ingestion and deleted on retirement.
const CREATE_EVENTS_RAW_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS {db}.events_raw (
    id String,
    user_id String,
    action String,
    timestamp String,
    created_at DateTime64(3),
    processed Bool DEFAULT false
)
ENGINE = MergeTree()
ORDER BY (created_at, id)
SETTINGS index_granularity = 8192
"#;

/// Archived events, expired by the retention worker.
const CREATE_EVENTS_PROCESSED_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS {db}.events_processed (
    id String,
    user_id String,
    action String,
    timestamp String,
    created_at DateTime64(3),
    processed Bool,
    processed_at DateTime64(3)
)
ENGINE = MergeTree()
PARTITION BY toYYYYMM(processed_at)
ORDER BY (processed_at, id)
SETTINGS index_granularity = 8192
"#;

/// The singleton metrics snapshot.
const CREATE_METRICS_SNAPSHOT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS {db}.metrics_snapshot (
    id String,
    total_events UInt64,
    events_by_action String,
    events_by_user String,
    created_at DateTime64(3),
    updated_at DateTime64(3)
)
ENGINE = ReplacingMergeTree(updated_at)
ORDER BY id
"#;

/// One heartbeat row per background service.
const CREATE_SERVICE_HEARTBEATS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS {db}.service_heartbeats (
    service String,
    timestamp DateTime64(3),
    status LowCardinality(String),
    version String
)
ENGINE = ReplacingMergeTree(timestamp)
ORDER BY service
"#;

/// All table DDL for the given database, in creation order.
pub fn all_tables(database: &str) -> Vec<String> {
    [
        CREATE_EVENTS_RAW_TABLE,
        CREATE_EVENTS_PROCESSED_TABLE,
        CREATE_METRICS_SNAPSHOT_TABLE,
        CREATE_SERVICE_HEARTBEATS_TABLE,
    ]
    .iter()
    .map(|ddl| ddl.replace("{db}", database))
    .collect()
}

/// Initialize the database schema.
///
/// Creates the database and all tables if they don't exist.
pub async fn init_schema(client: &ClickHouseClient) -> Result<()> {
    let database = &client.config().database;

    client
        .server()
        .query(&format!("CREATE DATABASE IF NOT EXISTS {}", database))
        .execute()
        .await
        .map_err(|e| {
            Error::database(
                DbErrorCode::StoreFailed,
                format!("Failed to create database: {}", e),
            )
        })?;

    for ddl in all_tables(database) {
        client.server().query(&ddl).execute().await.map_err(|e| {
            Error::database(
                DbErrorCode::StoreFailed,
                format!("Failed to execute DDL: {}", e),
            )
        })?;
    }

    debug!(database = %database, "ClickHouse schema initialized");
    Ok(())
}
