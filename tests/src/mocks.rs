//! Store wrappers for exercising scheduler behaviour.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use event_store::{EventStore, MemoryStore};
use pipeline_core::{EventId, Heartbeat, MetricsSnapshot, RawEvent, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Memory store whose `claim_unprocessed` blocks until released.
///
/// Lets a test hold a tick in flight for as long as it likes, the way a slow
/// store would in production.
#[derive(Clone)]
pub struct GatedStore {
    inner: Arc<MemoryStore>,
    gate: Arc<Semaphore>,
    claims_started: Arc<AtomicUsize>,
}

impl GatedStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            gate: Arc::new(Semaphore::new(0)),
            claims_started: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn inner(&self) -> &Arc<MemoryStore> {
        &self.inner
    }

    /// Lets `n` blocked or future claims through.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Number of claims that have been entered, blocked or not.
    pub fn claims_started(&self) -> usize {
        self.claims_started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStore for GatedStore {
    fn backend(&self) -> &'static str {
        "gated"
    }

    async fn claim_unprocessed(&self, limit: usize) -> Result<Vec<RawEvent>> {
        self.claims_started.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| pipeline_core::Error::internal(e.to_string()))?;
        permit.forget();
        self.inner.claim_unprocessed(limit).await
    }

    async fn archive_and_remove(&self, ids: &[EventId]) -> Result<usize> {
        self.inner.archive_and_remove(ids).await
    }

    async fn read_metrics_snapshot(&self) -> Result<Option<MetricsSnapshot>> {
        self.inner.read_metrics_snapshot().await
    }

    async fn upsert_metrics_snapshot(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        self.inner.upsert_metrics_snapshot(snapshot).await
    }

    async fn insert_raw_event(&self, event: &RawEvent) -> Result<()> {
        self.inner.insert_raw_event(event).await
    }

    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.inner.purge_processed_before(cutoff).await
    }

    async fn record_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()> {
        self.inner.record_heartbeat(heartbeat).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}
