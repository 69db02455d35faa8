//! Retention policy for archived events and service heartbeats.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default number of days an archived event is kept.
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// How long archived events are kept before cleanup deletes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    DEFAULT_RETENTION_DAYS
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            retention_days: DEFAULT_RETENTION_DAYS,
        }
    }
}

impl RetentionPolicy {
    pub fn new(retention_days: u32) -> Self {
        Self { retention_days }
    }

    /// Archived events processed strictly before this instant are expired.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.retention_days))
    }
}

/// Service status recorded alongside each heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
        }
    }
}

/// Liveness marker upserted by background services, one per service name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub service: String,
    pub timestamp: DateTime<Utc>,
    pub status: ServiceStatus,
    pub version: String,
}

impl Heartbeat {
    pub fn healthy(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            timestamp: Utc::now(),
            status: ServiceStatus::Healthy,
            version: version.into(),
        }
    }
}
