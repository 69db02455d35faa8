//! Health check endpoints.

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use telemetry::{health, metrics};
use tracing::warn;

use crate::response::{HealthResponse, StatusResponse};
use crate::state::AppState;

/// GET /api/health - Store connectivity check.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let ping = state.store.ping().await;

    let (status, body) = match ping {
        Ok(()) => {
            health().store.set_healthy();
            (
                StatusCode::OK,
                HealthResponse {
                    status: "healthy".to_string(),
                    timestamp: Utc::now(),
                    service: "api".to_string(),
                    database: "connected".to_string(),
                    version: state.version.to_string(),
                    error: None,
                },
            )
        }
        Err(e) => {
            warn!(error = %e, backend = state.store.backend(), "Store health check failed");
            health().store.set_unhealthy(e.to_string());
            (
                StatusCode::SERVICE_UNAVAILABLE,
                HealthResponse {
                    status: "unhealthy".to_string(),
                    timestamp: Utc::now(),
                    service: "api".to_string(),
                    database: "disconnected".to_string(),
                    version: state.version.to_string(),
                    error: Some(e.to_string()),
                },
            )
        }
    };

    (status, Json(body))
}

/// GET /health/live - Liveness probe (service is running).
pub async fn live_handler() -> StatusCode {
    StatusCode::OK
}

/// GET /api/status - Component health and in-process pipeline counters.
pub async fn status_handler() -> Json<StatusResponse> {
    Json(StatusResponse {
        health: health().report(),
        stats: metrics().snapshot(),
    })
}
