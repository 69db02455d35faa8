//! Application state shared across handlers.

use event_store::EventStore;
use pipeline_core::ApiFailureMode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// API settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Failure injected into event ingestion requests
    #[serde(default)]
    pub failure_mode: ApiFailureMode,
    /// Overrides the mode's default injection probability
    #[serde(default)]
    pub failure_rate: Option<f64>,
}

impl ApiConfig {
    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
            .unwrap_or_else(|| self.failure_mode.default_rate())
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Event store (ClickHouse in production, in-memory in tests)
    pub store: Arc<dyn EventStore>,
    /// Reported by the health endpoint
    pub version: &'static str,
    pub failure_mode: ApiFailureMode,
    pub failure_rate: f64,
}

impl AppState {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            version: env!("CARGO_PKG_VERSION"),
            failure_mode: ApiFailureMode::None,
            failure_rate: 0.0,
        }
    }

    pub fn with_config(self, config: &ApiConfig) -> Self {
        self.with_failure_injection(config.failure_mode, config.failure_rate())
    }

    pub fn with_failure_injection(mut self, mode: ApiFailureMode, rate: f64) -> Self {
        self.failure_mode = mode;
        self.failure_rate = rate;
        self
    }
}
