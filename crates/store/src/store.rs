//! Event store abstraction shared by the worker, the API and retention.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pipeline_core::{EventId, Heartbeat, MetricsSnapshot, RawEvent, Result};

/// Persistent home of the three event collections: unprocessed events,
/// archived events and the singleton metrics snapshot.
///
/// Implemented by [`ClickHouseStore`](crate::ClickHouseStore) in production and
/// [`MemoryStore`](crate::MemoryStore) in development and tests.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Backend name for logs and health output.
    fn backend(&self) -> &'static str;

    /// Reads up to `limit` events with `processed == false`, oldest first.
    /// Read-only.
    async fn claim_unprocessed(&self, limit: usize) -> Result<Vec<RawEvent>>;

    /// Re-reads the given unprocessed events, copies them into the archive
    /// with `processed_at = now`, then deletes the originals.
    ///
    /// Returns the number of events archived. Ids that are no longer present
    /// are ignored. A failure between copy and delete can leave an event in
    /// both collections.
    async fn archive_and_remove(&self, ids: &[EventId]) -> Result<usize>;

    async fn read_metrics_snapshot(&self) -> Result<Option<MetricsSnapshot>>;

    /// Inserts the snapshot if none exists, otherwise replaces it in place.
    async fn upsert_metrics_snapshot(&self, snapshot: &MetricsSnapshot) -> Result<()>;

    /// Appends a new unprocessed event.
    async fn insert_raw_event(&self, event: &RawEvent) -> Result<()>;

    /// Deletes archived events processed before `cutoff`. Returns the count.
    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Upserts the heartbeat row for `heartbeat.service`.
    async fn record_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()>;

    /// Connectivity check.
    async fn ping(&self) -> Result<()>;

    /// Releases the connection. Later calls fail; closing twice is a no-op.
    async fn close(&self) -> Result<()>;
}
