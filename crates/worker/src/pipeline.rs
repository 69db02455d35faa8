//! One pipeline tick: claim → validate → aggregate → merge → retire.
//!
//! Delivery is at-least-once. The batch is retired strictly after the merged
//! snapshot is written, so a failure between the two leaves the batch
//! claimable and it is counted again on the next tick.

use chrono::Utc;
use event_store::EventStore;
use pipeline_core::failure::{roll, SLOW_TICK_DELAY};
use pipeline_core::{partition, Error, MetricsSnapshot, Result, Tally, WorkerFailureMode};
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;

/// Outcome of a successful tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub job_id: String,
    /// Events returned by the claim
    pub claimed: usize,
    /// Events folded into the snapshot
    pub processed: usize,
    /// Events skipped by validation and left unprocessed
    pub invalid: usize,
    /// Events moved to the archive
    pub archived: usize,
    pub action_types: usize,
    pub unique_users: usize,
}

impl TickReport {
    fn empty(job_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            claimed: 0,
            processed: 0,
            invalid: 0,
            archived: 0,
            action_types: 0,
            unique_users: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.claimed == 0
    }
}

/// The batch pipeline over an event store.
pub struct Pipeline {
    store: Arc<dyn EventStore>,
    batch_size: usize,
    failure_mode: WorkerFailureMode,
    failure_rate: f64,
}

impl Pipeline {
    pub fn new(store: Arc<dyn EventStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            failure_mode: WorkerFailureMode::None,
            failure_rate: 0.0,
        }
    }

    /// Builds a pipeline with the batch size and failure mode from `config`.
    pub fn from_config(store: Arc<dyn EventStore>, config: &WorkerConfig) -> Self {
        Self::new(store, config.batch_size)
            .with_failure_injection(config.failure_mode, config.failure_rate())
    }

    pub fn with_failure_injection(mut self, mode: WorkerFailureMode, rate: f64) -> Self {
        self.failure_mode = mode;
        self.failure_rate = rate;
        self
    }

    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs one tick to completion.
    ///
    /// Any store error aborts the tick and is returned to the caller, which
    /// counts it toward escalation. Rejected events are logged and left
    /// in place.
    pub async fn run_tick(&self, job_id: &str) -> Result<TickReport> {
        self.inject_failure(job_id).await?;

        let events = self.store.claim_unprocessed(self.batch_size).await?;

        if events.is_empty() {
            debug!(job_id = %job_id, "No unprocessed events");
            return Ok(TickReport::empty(job_id));
        }

        let claimed = events.len();
        info!(job_id = %job_id, count = claimed, "Processing batch");

        let batch = partition(events);
        for (event_id, reason) in &batch.rejected {
            warn!(
                job_id = %job_id,
                event_id = %event_id,
                error = %reason,
                "Skipping invalid event"
            );
        }

        let tally = Tally::from_events(&batch.valid);
        let mut report = TickReport {
            job_id: job_id.to_string(),
            claimed,
            processed: batch.valid.len(),
            invalid: batch.rejected.len(),
            archived: 0,
            action_types: tally.action_types(),
            unique_users: tally.unique_users(),
        };

        metrics().events_invalid.inc_by(report.invalid as u64);

        if tally.is_empty() {
            return Ok(report);
        }

        let existing = self.store.read_metrics_snapshot().await?;
        let merged = MetricsSnapshot::merge_into(existing.as_ref(), &tally, Utc::now());
        self.store.upsert_metrics_snapshot(&merged).await?;
        metrics().events_processed.inc_by(report.processed as u64);

        report.archived = self.store.archive_and_remove(&batch.valid_ids()).await?;
        metrics().events_archived.inc_by(report.archived as u64);

        debug!(
            job_id = %job_id,
            total_events = merged.total_events,
            archived = report.archived,
            "Snapshot merged and batch retired"
        );

        Ok(report)
    }

    async fn inject_failure(&self, job_id: &str) -> Result<()> {
        if self.failure_mode == WorkerFailureMode::None || !roll(self.failure_rate) {
            return Ok(());
        }

        match self.failure_mode {
            WorkerFailureMode::None => Ok(()),
            WorkerFailureMode::Crash => {
                error!(job_id = %job_id, "Failure injection: simulating crash");
                Err(Error::injected_crash("Simulated crash"))
            }
            WorkerFailureMode::Slow => {
                warn!(
                    job_id = %job_id,
                    delay_ms = SLOW_TICK_DELAY.as_millis() as u64,
                    "Failure injection: simulating slow processing"
                );
                tokio::time::sleep(SLOW_TICK_DELAY).await;
                Ok(())
            }
            WorkerFailureMode::BadSchema => {
                warn!(job_id = %job_id, "Failure injection: simulating bad schema parse");
                Err(Error::injected("Simulated schema parsing error"))
            }
        }
    }
}
