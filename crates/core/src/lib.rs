//! Core types, validation and metrics merge for the event pipeline.

pub mod aggregate;
pub mod error;
pub mod events;
pub mod failure;
pub mod retention;
pub mod snapshot;
pub mod validation;

pub use aggregate::Tally;
pub use error::{DbErrorCode, Error, Result, ValidationErrorCode};
pub use events::*;
pub use failure::{ApiFailureMode, RetentionFailureMode, UnknownFailureMode, WorkerFailureMode};
pub use retention::*;
pub use snapshot::MetricsSnapshot;
pub use validation::{partition, validate_event, EventRejection, ValidatedBatch};
