//! Per-event structural checks applied by the worker before aggregation.
//!
//! A rejected event is not an [`Error`](crate::Error): it stays unprocessed in
//! the store and is reconsidered on the next claim.

use thiserror::Error;

use crate::events::{EventId, RawEvent};

/// Why a claimed event was left out of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EventRejection {
    #[error("Missing userId")]
    MissingUserId,
    #[error("Missing action")]
    MissingAction,
    #[error("Missing userId or action")]
    MissingUserIdAndAction,
}

/// Checks that both `user_id` and `action` are non-empty.
pub fn validate_event(event: &RawEvent) -> Result<(), EventRejection> {
    match (event.user_id.is_empty(), event.action.is_empty()) {
        (false, false) => Ok(()),
        (true, false) => Err(EventRejection::MissingUserId),
        (false, true) => Err(EventRejection::MissingAction),
        (true, true) => Err(EventRejection::MissingUserIdAndAction),
    }
}

/// A claimed batch split into events that may be aggregated and events that
/// must be left in place.
#[derive(Debug, Default)]
pub struct ValidatedBatch {
    pub valid: Vec<RawEvent>,
    pub rejected: Vec<(EventId, EventRejection)>,
}

impl ValidatedBatch {
    /// Identifiers of the events that passed validation, in claim order.
    pub fn valid_ids(&self) -> Vec<EventId> {
        self.valid.iter().map(|e| e.id).collect()
    }
}

/// Partitions a claimed batch, preserving claim order within each side.
pub fn partition(events: Vec<RawEvent>) -> ValidatedBatch {
    let mut batch = ValidatedBatch::default();
    for event in events {
        match validate_event(&event) {
            Ok(()) => batch.valid.push(event),
            Err(reason) => batch.rejected.push((event.id, reason)),
        }
    }
    batch
}
