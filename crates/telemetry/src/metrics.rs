//! In-process pipeline counters.
//!
//! Read by logs and the health endpoint; never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// A counter metric.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_by(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge metric (can go up or down).
#[derive(Debug, Default)]
pub struct Gauge(AtomicU64);

impl Gauge {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, val: u64) {
        self.0.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Collected metrics for the pipeline.
#[derive(Debug, Default)]
pub struct Metrics {
    // Ingestion
    pub events_ingested: Counter,
    pub ingest_rejected: Counter,

    // Worker ticks
    pub ticks_started: Counter,
    pub ticks_skipped: Counter,
    pub ticks_failed: Counter,
    pub consecutive_failures: Gauge,
    pub last_tick_ms: Gauge,

    // Worker events
    pub events_processed: Counter,
    pub events_invalid: Counter,
    pub events_archived: Counter,

    // Retention
    pub events_expired: Counter,
    pub retention_errors: Counter,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a snapshot of current metrics.
    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            timestamp: Utc::now(),
            events_ingested: self.events_ingested.get(),
            ingest_rejected: self.ingest_rejected.get(),
            ticks_started: self.ticks_started.get(),
            ticks_skipped: self.ticks_skipped.get(),
            ticks_failed: self.ticks_failed.get(),
            consecutive_failures: self.consecutive_failures.get(),
            last_tick_ms: self.last_tick_ms.get(),
            events_processed: self.events_processed.get(),
            events_invalid: self.events_invalid.get(),
            events_archived: self.events_archived.get(),
            events_expired: self.events_expired.get(),
            retention_errors: self.retention_errors.get(),
        }
    }
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub timestamp: DateTime<Utc>,
    pub events_ingested: u64,
    pub ingest_rejected: u64,
    pub ticks_started: u64,
    pub ticks_skipped: u64,
    pub ticks_failed: u64,
    pub consecutive_failures: u64,
    pub last_tick_ms: u64,
    pub events_processed: u64,
    pub events_invalid: u64,
    pub events_archived: u64,
    pub events_expired: u64,
    pub retention_errors: u64,
}

/// Global metrics registry.
pub static METRICS: std::sync::LazyLock<Metrics> = std::sync::LazyLock::new(Metrics::new);

/// Get the global metrics instance.
pub fn metrics() -> &'static Metrics {
    &METRICS
}
