//! Worker configuration.

use pipeline_core::{RetentionFailureMode, WorkerFailureMode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Event-processing worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Period between ticks
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum events claimed per tick
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Consecutive failed ticks before the process exits
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    /// How long shutdown waits for an in-flight tick before aborting it
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Failure injected at the start of every tick
    #[serde(default)]
    pub failure_mode: WorkerFailureMode,
    /// Overrides the mode's default injection probability
    #[serde(default)]
    pub failure_rate: Option<f64>,
}

fn default_poll_interval_ms() -> u64 {
    10_000
}

fn default_batch_size() -> usize {
    50
}

fn default_max_consecutive_errors() -> u32 {
    5
}

fn default_shutdown_grace_ms() -> u64 {
    5_000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            max_consecutive_errors: default_max_consecutive_errors(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            failure_mode: WorkerFailureMode::None,
            failure_rate: None,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
            .unwrap_or_else(|| self.failure_mode.default_rate())
    }
}

/// Retention cleanup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Period between cleanup runs
    #[serde(default = "default_retention_interval_ms")]
    pub interval_ms: u64,
    /// Archived events older than this are deleted
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Failure injected at the start of every run
    #[serde(default)]
    pub failure_mode: RetentionFailureMode,
    #[serde(default)]
    pub failure_rate: Option<f64>,
}

fn default_retention_interval_ms() -> u64 {
    60_000
}

fn default_retention_days() -> u32 {
    pipeline_core::DEFAULT_RETENTION_DAYS
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_retention_interval_ms(),
            retention_days: default_retention_days(),
            failure_mode: RetentionFailureMode::None,
            failure_rate: None,
        }
    }
}

impl RetentionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
            .unwrap_or_else(|| self.failure_mode.default_rate())
    }
}
