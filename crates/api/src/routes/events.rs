//! Event ingestion endpoint.

use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use pipeline_core::failure::roll;
use pipeline_core::{ApiFailureMode, NewEvent};
use telemetry::metrics;
use tracing::{debug, error, warn};

use crate::response::{ApiError, EventCreated};
use crate::state::AppState;

/// POST /api/events - Store one raw event for the worker to pick up.
///
/// Body: `{ "userId": "...", "action": "...", "timestamp": "..." }`. The
/// timestamp is optional and defaults to the receive time.
pub async fn create_event_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<EventCreated>), ApiError> {
    if let Some(err) = injected_failure(&state) {
        return Err(err);
    }

    let request: NewEvent = serde_json::from_slice(&body).map_err(|e| {
        metrics().ingest_rejected.inc();
        warn!(error = %e, "Failed to parse event body");
        ApiError::bad_request(format!("Invalid request body: {}", e))
    })?;

    let event = request.into_raw().map_err(|e| {
        metrics().ingest_rejected.inc();
        debug!(error = %e, "Rejected event");
        ApiError::from(e)
    })?;

    state.store.insert_raw_event(&event).await.map_err(|e| {
        error!(error = %e, "Failed to store event");
        ApiError::from(e)
    })?;

    metrics().events_ingested.inc();
    debug!(
        event_id = %event.id,
        user_id = %event.user_id,
        action = %event.action,
        "Event stored"
    );

    Ok((StatusCode::CREATED, Json(EventCreated::new(event.id))))
}

fn injected_failure(state: &AppState) -> Option<ApiError> {
    let (status, message) = match state.failure_mode {
        ApiFailureMode::None => return None,
        ApiFailureMode::Random500 => {
            (StatusCode::INTERNAL_SERVER_ERROR, "Simulated random failure")
        }
        ApiFailureMode::Db => (StatusCode::SERVICE_UNAVAILABLE, "Simulated database failure"),
    };
    if !roll(state.failure_rate) {
        return None;
    }

    error!(
        failure_mode = %state.failure_mode,
        status = status.as_u16(),
        "Failure injection: rejecting event"
    );
    Some(ApiError::with_code(status, "DB_001", message))
}
