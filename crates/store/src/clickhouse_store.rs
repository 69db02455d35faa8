//! ClickHouse-backed event store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clickhouse::Row;
use pipeline_core::{
    DbErrorCode, Error, EventId, Heartbeat, MetricsSnapshot, RawEvent, Result,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

use crate::client::ClickHouseClient;
use crate::config::ClickHouseConfig;
use crate::schema;
use crate::store::EventStore;

/// Key of the single row in `metrics_snapshot`.
const SNAPSHOT_ID: &str = "global";

const RAW_COLUMNS: &str = "id, user_id, action, timestamp, created_at, processed";

/// Row in `events_raw`.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct RawEventRow {
    pub id: String,
    pub user_id: String,
    pub action: String,
    pub timestamp: String,
    pub created_at: i64, // milliseconds since epoch
    pub processed: bool,
}

impl From<&RawEvent> for RawEventRow {
    fn from(event: &RawEvent) -> Self {
        Self {
            id: event.id.to_string(),
            user_id: event.user_id.clone(),
            action: event.action.clone(),
            timestamp: event.timestamp.clone(),
            created_at: event.created_at.timestamp_millis(),
            processed: event.processed,
        }
    }
}

impl TryFrom<RawEventRow> for RawEvent {
    type Error = Error;

    fn try_from(row: RawEventRow) -> Result<Self> {
        Ok(RawEvent {
            id: row.id.parse()?,
            user_id: row.user_id,
            action: row.action,
            timestamp: row.timestamp,
            created_at: from_millis(row.created_at)?,
            processed: row.processed,
        })
    }
}

/// Row in `events_processed`.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct ProcessedEventRow {
    pub id: String,
    pub user_id: String,
    pub action: String,
    pub timestamp: String,
    pub created_at: i64,
    pub processed: bool,
    pub processed_at: i64,
}

impl ProcessedEventRow {
    fn archive(row: RawEventRow, processed_at: i64) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            action: row.action,
            timestamp: row.timestamp,
            created_at: row.created_at,
            processed: true,
            processed_at,
        }
    }
}

/// Row in `metrics_snapshot`.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub id: String,
    pub total_events: u64,
    /// JSON object of action -> count
    pub events_by_action: String,
    /// JSON object of user id -> count
    pub events_by_user: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl SnapshotRow {
    fn from_snapshot(snapshot: &MetricsSnapshot) -> Result<Self> {
        Ok(Self {
            id: SNAPSHOT_ID.to_string(),
            total_events: snapshot.total_events,
            events_by_action: serde_json::to_string(&snapshot.events_by_action)?,
            events_by_user: serde_json::to_string(&snapshot.events_by_user)?,
            created_at: snapshot.created_at.timestamp_millis(),
            updated_at: snapshot.updated_at.timestamp_millis(),
        })
    }

    fn into_snapshot(self) -> Result<MetricsSnapshot> {
        let events_by_action: BTreeMap<String, u64> = serde_json::from_str(&self.events_by_action)?;
        let events_by_user: BTreeMap<String, u64> = serde_json::from_str(&self.events_by_user)?;
        Ok(MetricsSnapshot {
            total_events: self.total_events,
            events_by_action,
            events_by_user,
            created_at: from_millis(self.created_at)?,
            updated_at: from_millis(self.updated_at)?,
        })
    }
}

/// Row in `service_heartbeats`.
#[derive(Debug, Clone, Row, Serialize, Deserialize)]
pub struct HeartbeatRow {
    pub service: String,
    pub timestamp: i64,
    pub status: String,
    pub version: String,
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| Error::internal(format!("timestamp out of range: {}", ms)))
}

fn store_failed(context: &'static str) -> impl FnOnce(clickhouse::error::Error) -> Error {
    move |e| Error::database(DbErrorCode::StoreFailed, format!("{}: {}", context, e))
}

/// Event store on ClickHouse tables `events_raw`, `events_processed`,
/// `metrics_snapshot` and `service_heartbeats`.
pub struct ClickHouseStore {
    client: ClickHouseClient,
    closed: AtomicBool,
}

impl ClickHouseStore {
    pub fn new(config: ClickHouseConfig) -> Self {
        Self {
            client: ClickHouseClient::new(config),
            closed: AtomicBool::new(false),
        }
    }

    pub fn client(&self) -> &ClickHouseClient {
        &self.client
    }

    /// Creates the database and tables if missing.
    pub async fn init_schema(&self) -> Result<()> {
        self.ensure_open()?;
        schema::init_schema(&self.client).await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::store("ClickHouse connection closed"));
        }
        Ok(())
    }

    async fn fetch_raw_by_ids(&self, ids: &[String]) -> Result<Vec<RawEventRow>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE has(?, id)",
            RAW_COLUMNS,
            self.client.table("events_raw")
        );
        self.client
            .inner()
            .query(&sql)
            .bind(ids)
            .fetch_all()
            .await
            .map_err(store_failed("Failed to re-read events"))
    }
}

#[async_trait]
impl EventStore for ClickHouseStore {
    fn backend(&self) -> &'static str {
        "clickhouse"
    }

    async fn claim_unprocessed(&self, limit: usize) -> Result<Vec<RawEvent>> {
        self.ensure_open()?;
        let sql = format!(
            "SELECT {} FROM {} WHERE processed = false ORDER BY created_at LIMIT ?",
            RAW_COLUMNS,
            self.client.table("events_raw")
        );
        let rows: Vec<RawEventRow> = self
            .client
            .inner()
            .query(&sql)
            .bind(limit as u64)
            .fetch_all()
            .await
            .map_err(store_failed("Failed to claim events"))?;

        rows.into_iter().map(RawEvent::try_from).collect()
    }

    async fn archive_and_remove(&self, ids: &[EventId]) -> Result<usize> {
        self.ensure_open()?;
        if ids.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let rows = self.fetch_raw_by_ids(&ids).await?;
        if rows.is_empty() {
            return Ok(0);
        }

        let count = rows.len();
        let processed_at = Utc::now().timestamp_millis();
        let mut insert = self
            .client
            .inner()
            .insert(&self.client.table("events_processed"))
            .map_err(store_failed("Insert error"))?;
        for row in rows {
            insert
                .write(&ProcessedEventRow::archive(row, processed_at))
                .await
                .map_err(store_failed("Write error"))?;
        }
        insert.end().await.map_err(store_failed("End error"))?;

        let sql = format!(
            "DELETE FROM {} WHERE has(?, id)",
            self.client.table("events_raw")
        );
        self.client
            .inner()
            .query(&sql)
            .bind(&ids)
            .execute()
            .await
            .map_err(store_failed("Failed to delete archived events"))?;

        debug!(count = count, "Archived events");
        Ok(count)
    }

    async fn read_metrics_snapshot(&self) -> Result<Option<MetricsSnapshot>> {
        self.ensure_open()?;
        let sql = format!(
            "SELECT id, total_events, events_by_action, events_by_user, created_at, updated_at \
             FROM {} FINAL WHERE id = ? LIMIT 1",
            self.client.table("metrics_snapshot")
        );
        let row: Option<SnapshotRow> = self
            .client
            .inner()
            .query(&sql)
            .bind(SNAPSHOT_ID)
            .fetch_optional()
            .await
            .map_err(store_failed("Failed to read metrics snapshot"))?;

        row.map(SnapshotRow::into_snapshot).transpose()
    }

    async fn upsert_metrics_snapshot(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        self.ensure_open()?;
        let row = SnapshotRow::from_snapshot(snapshot)?;
        let mut insert = self
            .client
            .inner()
            .insert(&self.client.table("metrics_snapshot"))
            .map_err(store_failed("Insert error"))?;
        insert.write(&row).await.map_err(store_failed("Write error"))?;
        insert.end().await.map_err(store_failed("End error"))?;
        Ok(())
    }

    async fn insert_raw_event(&self, event: &RawEvent) -> Result<()> {
        self.ensure_open()?;
        let mut insert = self
            .client
            .inner()
            .insert(&self.client.table("events_raw"))
            .map_err(store_failed("Insert error"))?;
        insert
            .write(&RawEventRow::from(event))
            .await
            .map_err(store_failed("Write error"))?;
        insert.end().await.map_err(store_failed("End error"))?;
        Ok(())
    }

    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.ensure_open()?;
        let table = self.client.table("events_processed");
        let cutoff_ms = cutoff.timestamp_millis();

        let expired: u64 = self
            .client
            .inner()
            .query(&format!(
                "SELECT count() FROM {} WHERE toUnixTimestamp64Milli(processed_at) < ?",
                table
            ))
            .bind(cutoff_ms)
            .fetch_one()
            .await
            .map_err(store_failed("Failed to count expired events"))?;

        if expired == 0 {
            return Ok(0);
        }

        self.client
            .inner()
            .query(&format!(
                "DELETE FROM {} WHERE toUnixTimestamp64Milli(processed_at) < ?",
                table
            ))
            .bind(cutoff_ms)
            .execute()
            .await
            .map_err(store_failed("Failed to delete expired events"))?;

        Ok(expired)
    }

    async fn record_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()> {
        self.ensure_open()?;
        let row = HeartbeatRow {
            service: heartbeat.service.clone(),
            timestamp: heartbeat.timestamp.timestamp_millis(),
            status: heartbeat.status.as_str().to_string(),
            version: heartbeat.version.clone(),
        };
        let mut insert = self
            .client
            .inner()
            .insert(&self.client.table("service_heartbeats"))
            .map_err(store_failed("Insert error"))?;
        insert.write(&row).await.map_err(store_failed("Write error"))?;
        insert.end().await.map_err(store_failed("End error"))?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.ensure_open()?;
        self.client
            .inner()
            .query("SELECT 1")
            .fetch_one::<u8>()
            .await
            .map_err(store_failed("ClickHouse health check failed"))?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("ClickHouse connection closed");
        }
        Ok(())
    }
}
