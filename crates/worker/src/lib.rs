//! Background workers for the event pipeline.
//!
//! - Run scheduler: periodic, single-flight pipeline ticks with failure
//!   escalation
//! - Pipeline: claim, validate, aggregate, merge, retire
//! - Retention: archive cleanup and service heartbeat

pub mod config;
pub mod escalator;
pub mod pipeline;
pub mod retention;
pub mod run_state;
pub mod scheduler;

pub use config::{RetentionConfig, WorkerConfig};
pub use escalator::{EscalationState, FailureEscalator};
pub use pipeline::{Pipeline, TickReport};
pub use retention::{RetentionReport, RetentionWorker, RETENTION_SERVICE};
pub use run_state::{FlightGuard, WorkerRunState};
pub use scheduler::{FireOutcome, RunScheduler, WorkerExit};
