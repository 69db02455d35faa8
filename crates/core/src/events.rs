//! Event type definitions for the pipeline.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use crate::error::{Error, Result, ValidationErrorCode};

/// Identifier of a raw (and later archived) event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EventId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for EventId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::internal(format!("invalid event id {}: {}", s, e)))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An ingested event waiting to be aggregated.
///
/// Written by the ingestion endpoint with `processed = false` and removed by
/// the worker once archived. Never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub id: EventId,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub action: String,
    /// Client-supplied ISO-8601 timestamp, kept verbatim.
    pub timestamp: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub processed: bool,
}

impl RawEvent {
    /// Creates a fresh unprocessed event stamped with the current time.
    pub fn new(user_id: impl Into<String>, action: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: EventId::new(),
            user_id: user_id.into(),
            action: action.into(),
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            created_at: now,
            processed: false,
        }
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// Copies this event into the archive representation.
    pub fn into_processed(self, processed_at: DateTime<Utc>) -> ProcessedEvent {
        ProcessedEvent {
            event: self,
            processed_at,
        }
    }
}

/// An archived event: the original raw event plus the time it was retired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedEvent {
    #[serde(flatten)]
    pub event: RawEvent,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedEvent {
    pub fn id(&self) -> EventId {
        self.event.id
    }
}

/// Ingestion request body.
///
/// Missing fields deserialize to empty strings so that the validator reports
/// them instead of the JSON parser.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    #[serde(default)]
    #[validate(length(min = 1, message = "userId is required"))]
    pub user_id: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "action is required"))]
    pub action: String,
    /// Optional client timestamp; defaults to the receive time.
    pub timestamp: Option<String>,
}

impl NewEvent {
    /// Validates the request and builds the raw event to store.
    pub fn into_raw(self) -> Result<RawEvent> {
        self.validate().map_err(|e| {
            Error::validation_code(
                ValidationErrorCode::InvalidFormat,
                format!("Missing required fields: userId and action ({})", e),
            )
        })?;

        let event = RawEvent::new(self.user_id, self.action);
        Ok(match self.timestamp {
            Some(ts) if !ts.is_empty() => event.with_timestamp(ts),
            _ => event,
        })
    }
}
