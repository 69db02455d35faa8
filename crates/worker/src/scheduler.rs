//! Periodic run scheduler for the event pipeline.
//!
//! One tick runs at startup and then once per poll interval. A firing that
//! lands while a tick is still in flight is dropped, not queued.

use std::sync::Arc;
use std::time::Instant;

use pipeline_core::Result;
use telemetry::{health, metrics};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::escalator::EscalationState;
use crate::pipeline::{Pipeline, TickReport};
use crate::run_state::{FlightGuard, WorkerRunState};

/// What a single firing of the scheduler did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Started,
    /// A tick was already in flight; nothing was done.
    Skipped,
}

/// Why [`RunScheduler::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Shutdown was requested.
    Shutdown,
    /// Too many consecutive ticks failed. The process should exit non-zero.
    Escalated { consecutive_failures: u32 },
    /// A tick failed with an unrecoverable error. The process should exit
    /// non-zero.
    Crashed,
}

type TickResult = std::result::Result<Result<TickReport>, JoinError>;

struct InFlight {
    job_id: String,
    started: Instant,
    handle: JoinHandle<Result<TickReport>>,
    _guard: FlightGuard,
}

/// Owns the run state and drives the pipeline on a fixed period.
pub struct RunScheduler {
    pipeline: Arc<Pipeline>,
    config: WorkerConfig,
    state: WorkerRunState,
    current: Option<InFlight>,
}

impl RunScheduler {
    pub fn new(pipeline: Arc<Pipeline>, config: WorkerConfig) -> Self {
        let state = WorkerRunState::new(config.max_consecutive_errors);
        Self {
            pipeline,
            config,
            state,
            current: None,
        }
    }

    pub fn state(&self) -> &WorkerRunState {
        &self.state
    }

    /// Starts a tick in the background unless one is already in flight.
    ///
    /// The in-flight flag stays set until the tick's result has been
    /// recorded by [`complete`](Self::complete) or the run loop.
    pub fn fire(&mut self) -> FireOutcome {
        let Some(guard) = self.state.try_begin() else {
            metrics().ticks_skipped.inc();
            debug!("Previous tick still running, skipping");
            return FireOutcome::Skipped;
        };

        let job_id = new_job_id();
        let pipeline = Arc::clone(&self.pipeline);
        let span = info_span!("tick", job_id = %job_id);
        let task_job_id = job_id.clone();

        metrics().ticks_started.inc();
        let handle = tokio::spawn(
            async move {
                debug!("Tick started");
                pipeline.run_tick(&task_job_id).await
            }
            .instrument(span),
        );

        self.current = Some(InFlight {
            job_id,
            started: Instant::now(),
            handle,
            _guard: guard,
        });
        FireOutcome::Started
    }

    /// Waits for the in-flight tick and records its outcome.
    ///
    /// Returns `None` when no tick is in flight.
    pub async fn complete(&mut self) -> Option<EscalationState> {
        if self.current.is_none() {
            return None;
        }
        let joined = join_current(&mut self.current).await;
        Some(self.record(joined))
    }

    /// Runs until shutdown is signalled or failures escalate.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> WorkerExit {
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.pipeline.batch_size(),
            max_consecutive_errors = self.state.escalator().max_failures(),
            "Worker started"
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        // A tick that finishes during the drain still counts.
                        let exit = self.drain().await.unwrap_or(WorkerExit::Shutdown);
                        info!(exit = ?exit, "Worker stopped");
                        return exit;
                    }
                }

                joined = join_current(&mut self.current), if self.current.is_some() => {
                    if let Some(exit) = self.settle(joined) {
                        return exit;
                    }
                }

                _ = ticker.tick() => {
                    self.fire();
                }
            }
        }
    }

    /// Gives an in-flight tick the configured grace period, then aborts it.
    ///
    /// Returns the exit the drained tick's outcome calls for, if any.
    pub async fn drain(&mut self) -> Option<WorkerExit> {
        let mut flight = self.current.take()?;

        let grace = self.config.shutdown_grace();
        match timeout(grace, &mut flight.handle).await {
            Ok(joined) => {
                self.current = Some(flight);
                self.settle(joined)
            }
            Err(_) => {
                warn!(
                    job_id = %flight.job_id,
                    grace_ms = grace.as_millis() as u64,
                    "In-flight tick did not finish before shutdown, aborting"
                );
                flight.handle.abort();
                None
            }
        }
    }

    /// Records a finished tick and decides whether the worker must stop.
    fn settle(&mut self, joined: TickResult) -> Option<WorkerExit> {
        let crashed = matches!(&joined, Ok(Err(e)) if e.is_fatal());
        let state = self.record(joined);

        if crashed {
            error!("Tick crashed, giving up");
            return Some(WorkerExit::Crashed);
        }
        if let EscalationState::Fatal { failures } = state {
            error!(
                consecutive_failures = failures,
                "Maximum consecutive failures reached, giving up"
            );
            return Some(WorkerExit::Escalated {
                consecutive_failures: failures,
            });
        }
        None
    }

    fn record(&mut self, joined: TickResult) -> EscalationState {
        // Dropping the flight releases the single-flight guard.
        let Some(flight) = self.current.take() else {
            return self.state.escalator().state();
        };
        let elapsed_ms = flight.started.elapsed().as_millis() as u64;
        metrics().last_tick_ms.set(elapsed_ms);

        let failure = match joined {
            Ok(Ok(report)) => {
                if report.is_empty() {
                    debug!(job_id = %flight.job_id, elapsed_ms, "Tick complete, nothing to do");
                } else {
                    info!(
                        job_id = %flight.job_id,
                        claimed = report.claimed,
                        processed = report.processed,
                        invalid = report.invalid,
                        archived = report.archived,
                        action_types = report.action_types,
                        unique_users = report.unique_users,
                        elapsed_ms,
                        "Tick complete"
                    );
                }
                None
            }
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) if e.is_panic() => Some("tick panicked".to_string()),
            Err(e) => Some(e.to_string()),
        };

        let state = match failure {
            None => {
                health().worker.set_healthy();
                self.state.escalator_mut().record_success()
            }
            Some(reason) => {
                metrics().ticks_failed.inc();
                let state = self.state.escalator_mut().record_failure();
                let failures = self.state.consecutive_failures();
                error!(
                    job_id = %flight.job_id,
                    error = %reason,
                    consecutive_failures = failures,
                    max_consecutive_errors = self.state.escalator().max_failures(),
                    "Tick failed"
                );
                health()
                    .worker
                    .set_unhealthy(format!("{} consecutive tick failures", failures));
                state
            }
        };

        metrics()
            .consecutive_failures
            .set(self.state.consecutive_failures() as u64);
        state
    }
}

async fn join_current(current: &mut Option<InFlight>) -> TickResult {
    match current.as_mut() {
        Some(flight) => (&mut flight.handle).await,
        None => std::future::pending().await,
    }
}

fn new_job_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}
