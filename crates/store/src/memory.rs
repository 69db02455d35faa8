//! In-memory event store.
//!
//! Used for local development (`store.backend = "memory"`) and by tests.
//! Every operation can be made to fail on demand and is counted, so callers
//! can assert which store calls a code path made.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pipeline_core::{
    DbErrorCode, Error, EventId, Heartbeat, MetricsSnapshot, ProcessedEvent, RawEvent, Result,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::store::EventStore;

/// Store operations, for fault injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StoreOp {
    Claim,
    Archive,
    ReadSnapshot,
    UpsertSnapshot,
    InsertRaw,
    Purge,
    Heartbeat,
    Ping,
}

/// How an operation should fail.
#[derive(Debug, Clone, Copy)]
enum Fault {
    Times(u32),
    Always,
}

#[derive(Debug, Default)]
struct Collections {
    raw: Vec<RawEvent>,
    processed: Vec<ProcessedEvent>,
    snapshot: Option<MetricsSnapshot>,
    heartbeats: BTreeMap<String, Heartbeat>,
}

/// Event store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<Collections>,
    faults: Mutex<BTreeMap<StoreOp, Fault>>,
    calls: Mutex<BTreeMap<StoreOp, u64>>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends unprocessed events directly, bypassing fault injection.
    pub fn seed(&self, events: impl IntoIterator<Item = RawEvent>) {
        self.data.lock().raw.extend(events);
    }

    /// Appends archived events directly, bypassing fault injection.
    pub fn seed_processed(&self, events: impl IntoIterator<Item = ProcessedEvent>) {
        self.data.lock().processed.extend(events);
    }

    /// Replaces the persisted snapshot directly.
    pub fn set_snapshot(&self, snapshot: Option<MetricsSnapshot>) {
        self.data.lock().snapshot = snapshot;
    }

    pub fn raw_events(&self) -> Vec<RawEvent> {
        self.data.lock().raw.clone()
    }

    pub fn processed_events(&self) -> Vec<ProcessedEvent> {
        self.data.lock().processed.clone()
    }

    pub fn snapshot(&self) -> Option<MetricsSnapshot> {
        self.data.lock().snapshot.clone()
    }

    pub fn heartbeat(&self, service: &str) -> Option<Heartbeat> {
        self.data.lock().heartbeats.get(service).cloned()
    }

    /// Makes the next `times` calls of `op` fail.
    pub fn fail_next(&self, op: StoreOp, times: u32) {
        self.faults.lock().insert(op, Fault::Times(times));
    }

    /// Makes every call of `op` fail until [`clear_faults`](Self::clear_faults).
    pub fn fail_always(&self, op: StoreOp) {
        self.faults.lock().insert(op, Fault::Always);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Number of times `op` has been called, including failed calls.
    pub fn call_count(&self, op: StoreOp) -> u64 {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Total calls across all operations.
    pub fn total_calls(&self) -> u64 {
        self.calls.lock().values().sum()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Records the call and applies any injected fault.
    fn enter(&self, op: StoreOp) -> Result<()> {
        *self.calls.lock().entry(op).or_insert(0) += 1;

        if self.is_closed() {
            return Err(Error::store("memory store closed"));
        }

        let mut faults = self.faults.lock();
        let fail = match faults.get_mut(&op) {
            Some(Fault::Always) => true,
            Some(Fault::Times(n)) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        };

        if fail {
            return Err(Error::database(
                DbErrorCode::StoreFailed,
                format!("injected failure: {:?}", op),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn claim_unprocessed(&self, limit: usize) -> Result<Vec<RawEvent>> {
        self.enter(StoreOp::Claim)?;
        let data = self.data.lock();
        let mut pending: Vec<RawEvent> = data.raw.iter().filter(|e| !e.processed).cloned().collect();
        pending.sort_by_key(|e| e.created_at);
        pending.truncate(limit);
        Ok(pending)
    }

    async fn archive_and_remove(&self, ids: &[EventId]) -> Result<usize> {
        self.enter(StoreOp::Archive)?;
        if ids.is_empty() {
            return Ok(0);
        }

        let wanted: HashSet<EventId> = ids.iter().copied().collect();
        let processed_at = Utc::now();
        let mut data = self.data.lock();

        let archived: Vec<ProcessedEvent> = data
            .raw
            .iter()
            .filter(|e| wanted.contains(&e.id))
            .cloned()
            .map(|mut e| {
                e.processed = true;
                e.into_processed(processed_at)
            })
            .collect();
        let count = archived.len();

        data.processed.extend(archived);
        data.raw.retain(|e| !wanted.contains(&e.id));
        Ok(count)
    }

    async fn read_metrics_snapshot(&self) -> Result<Option<MetricsSnapshot>> {
        self.enter(StoreOp::ReadSnapshot)?;
        Ok(self.data.lock().snapshot.clone())
    }

    async fn upsert_metrics_snapshot(&self, snapshot: &MetricsSnapshot) -> Result<()> {
        self.enter(StoreOp::UpsertSnapshot)?;
        self.data.lock().snapshot = Some(snapshot.clone());
        Ok(())
    }

    async fn insert_raw_event(&self, event: &RawEvent) -> Result<()> {
        self.enter(StoreOp::InsertRaw)?;
        self.data.lock().raw.push(event.clone());
        Ok(())
    }

    async fn purge_processed_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.enter(StoreOp::Purge)?;
        let mut data = self.data.lock();
        let before = data.processed.len();
        data.processed.retain(|e| e.processed_at >= cutoff);
        Ok((before - data.processed.len()) as u64)
    }

    async fn record_heartbeat(&self, heartbeat: &Heartbeat) -> Result<()> {
        self.enter(StoreOp::Heartbeat)?;
        self.data
            .lock()
            .heartbeats
            .insert(heartbeat.service.clone(), heartbeat.clone());
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.enter(StoreOp::Ping)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
