//! Retention worker: deletes archived events past the retention window and
//! records a heartbeat for the cleanup service.

use chrono::{DateTime, Utc};
use event_store::EventStore;
use pipeline_core::failure::{roll, RETENTION_TIMEOUT_DELAY};
use pipeline_core::{Error, Heartbeat, Result, RetentionFailureMode, RetentionPolicy};
use std::sync::Arc;
use telemetry::metrics;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::RetentionConfig;

/// Service name under which the cleanup heartbeat is stored.
pub const RETENTION_SERVICE: &str = "retention";

/// Result of a single cleanup run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionReport {
    pub deleted: u64,
    pub cutoff: DateTime<Utc>,
    pub heartbeat_recorded: bool,
}

/// Worker that enforces the archive retention window.
pub struct RetentionWorker {
    store: Arc<dyn EventStore>,
    policy: RetentionPolicy,
    interval: std::time::Duration,
    failure_mode: RetentionFailureMode,
    failure_rate: f64,
}

impl RetentionWorker {
    pub fn new(store: Arc<dyn EventStore>, config: &RetentionConfig) -> Self {
        Self {
            store,
            policy: RetentionPolicy::new(config.retention_days),
            interval: config.interval(),
            failure_mode: config.failure_mode,
            failure_rate: config.failure_rate(),
        }
    }

    /// Runs one cleanup pass.
    ///
    /// A purge failure is returned. A heartbeat failure is only logged, since
    /// the deletion already happened.
    pub async fn run(&self) -> Result<RetentionReport> {
        self.inject_failure().await?;

        let cutoff = self.policy.cutoff(Utc::now());
        debug!(cutoff = %cutoff, "Running retention cleanup");

        let deleted = self.store.purge_processed_before(cutoff).await?;
        metrics().events_expired.inc_by(deleted);

        if deleted > 0 {
            info!(
                deleted,
                retention_days = self.policy.retention_days,
                "Deleted expired archived events"
            );
        }

        let heartbeat = Heartbeat::healthy(RETENTION_SERVICE, env!("CARGO_PKG_VERSION"));
        let heartbeat_recorded = match self.store.record_heartbeat(&heartbeat).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to record retention heartbeat");
                false
            }
        };

        Ok(RetentionReport {
            deleted,
            cutoff,
            heartbeat_recorded,
        })
    }

    async fn inject_failure(&self) -> Result<()> {
        if self.failure_mode == RetentionFailureMode::None || !roll(self.failure_rate) {
            return Ok(());
        }

        match self.failure_mode {
            RetentionFailureMode::None => Ok(()),
            RetentionFailureMode::Timeout => {
                warn!(
                    delay_ms = RETENTION_TIMEOUT_DELAY.as_millis() as u64,
                    "Failure injection: simulating timeout"
                );
                tokio::time::sleep(RETENTION_TIMEOUT_DELAY).await;
                Ok(())
            }
            RetentionFailureMode::DbFail => {
                error!("Failure injection: simulating DB failure");
                Err(Error::injected("Simulated database connection failure"))
            }
        }
    }

    /// Runs cleanup on its interval until shutdown. Failures are logged and
    /// never stop the loop.
    pub async fn run_forever(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_ms = self.interval.as_millis() as u64,
            retention_days = self.policy.retention_days,
            "Retention worker started"
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Retention worker stopped");
                        return;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.run().await {
                        metrics().retention_errors.inc();
                        error!(error = %e, "Retention cleanup failed");
                    }
                }
            }
        }
    }
}
