//! Incident simulation endpoints.
//!
//! These write bursts of error logs, and for some incidents seed raw events,
//! so that monitoring and alerting can be exercised against a live
//! deployment.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration, Utc};
use pipeline_core::RawEvent;
use serde::Deserialize;
use tracing::{error, warn};

use crate::response::{ApiError, ErrorsTriggered, IncidentTriggered, InvalidIncident};
use crate::state::AppState;

const DEFAULT_ERROR_COUNT: i64 = 50;
const MIN_ERROR_COUNT: i64 = 10;
const MAX_ERROR_COUNT: i64 = 500;

/// Error kinds cycled through by the error burst.
const ERROR_TYPES: [(&str, &str); 10] = [
    ("NETWORK_ERROR", "Connection timeout to external service"),
    ("DATABASE_ERROR", "Query execution failed"),
    ("VALIDATION_ERROR", "Invalid input data received"),
    ("AUTH_ERROR", "Authentication token expired"),
    ("RATE_LIMIT_ERROR", "API rate limit exceeded"),
    ("MEMORY_ERROR", "Heap out of memory"),
    ("PARSE_ERROR", "Failed to parse JSON response"),
    ("TIMEOUT_ERROR", "Request timeout after 30s"),
    ("CRITICAL_ERROR", "Critical system failure detected"),
    ("UNKNOWN_ERROR", "Unknown error occurred"),
];

#[derive(Debug, Default, Deserialize)]
struct TriggerErrorsRequest {
    count: Option<i64>,
}

/// Incidents that can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incident {
    /// A backlog of stale unprocessed events.
    StuckWorker,
    HighErrorRate,
    BadDeployment,
    DbConnectionLoss,
    /// Stale events plus repeated worker errors.
    PersistentErrors,
}

impl Incident {
    pub const ALL: [Incident; 5] = [
        Self::StuckWorker,
        Self::HighErrorRate,
        Self::BadDeployment,
        Self::DbConnectionLoss,
        Self::PersistentErrors,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StuckWorker => "stuck_worker",
            Self::HighErrorRate => "high_error_rate",
            Self::BadDeployment => "bad_deployment",
            Self::DbConnectionLoss => "db_connection_loss",
            Self::PersistentErrors => "persistent_errors",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.as_str() == name)
    }
}

#[derive(Debug, Default, Deserialize)]
struct TriggerIncidentRequest {
    incident: Option<String>,
}

/// POST /api/trigger-errors - Emit a burst of error logs.
///
/// Body: `{ "count": 50 }`, clamped to 10..=500.
pub async fn trigger_errors_handler(body: Bytes) -> Result<Json<ErrorsTriggered>, ApiError> {
    let request: TriggerErrorsRequest = parse_optional(&body)?;
    let requested = request.count.unwrap_or(DEFAULT_ERROR_COUNT);
    let count = requested.clamp(MIN_ERROR_COUNT, MAX_ERROR_COUNT) as u32;

    warn!(requested, count, "Bulk error test triggered");

    for i in 0..count {
        let (error_type, detail) = ERROR_TYPES[i as usize % ERROR_TYPES.len()];
        let iteration = i + 1;
        if i % 10 == 0 {
            error!(error_type, detail, iteration, total = count, severity = "CRITICAL", "Simulated error");
        } else if i % 5 == 0 {
            error!(error_type, detail, iteration, total = count, severity = "HIGH", "Simulated error");
        } else {
            error!(error_type, detail, iteration, total = count, "Simulated error");
        }

        if i % 15 == 0 {
            warn!(
                errors_so_far = iteration,
                rate_pct = f64::from(i) / f64::from(count) * 100.0,
                "Error rate increasing"
            );
        }
    }

    error!(total = count, "Bulk error test completed");

    Ok(Json(ErrorsTriggered {
        success: true,
        message: format!("Successfully generated {} error logs", count),
        error_count: count,
        timestamp: Utc::now(),
    }))
}

/// POST /api/trigger-incident - Simulate a named incident.
///
/// Body: `{ "incident": "stuck_worker" }`.
pub async fn trigger_incident_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: TriggerIncidentRequest = parse_optional(&body)?;
    let Some(incident) = request.incident.as_deref().and_then(Incident::parse) else {
        let rejection = InvalidIncident {
            error: "Invalid incident type".to_string(),
            valid_incidents: Incident::ALL.iter().map(|i| i.as_str().to_string()).collect(),
        };
        return Ok((StatusCode::BAD_REQUEST, Json(rejection)).into_response());
    };

    warn!(incident = incident.as_str(), "Incident triggered");

    match incident {
        Incident::StuckWorker => {
            seed_stale_events(&state, 100, 5, "test_action", Duration::minutes(5)).await?;
            error!(event_count = 100, "Stuck worker simulated");
        }
        Incident::HighErrorRate => {
            for i in 0..20 {
                error!(event_id = %format!("fake_{}", i), "Simulated worker parse error");
            }
            error!(error_count = 20, "High error rate simulated");
        }
        Incident::BadDeployment => {
            error!("Bad deployment simulated");
            for _ in 0..15 {
                error!(status = 500, "Simulated deployment error");
            }
        }
        Incident::DbConnectionLoss => {
            error!(retries = 3, "Database connection failed: connection timeout");
            error!("Database connection loss simulated");
            for attempt in 1..=5 {
                error!(attempt, "Database connection failed: cannot reach database");
            }
        }
        Incident::PersistentErrors => {
            seed_stale_events(&state, 30, 3, "broken_action", Duration::minutes(10)).await?;
            for i in 0..10 {
                error!(
                    event_id = %format!("broken_{}", i),
                    retries = 5,
                    "Persistent worker error: schema validation failed"
                );
            }
            error!(error_count = 10, "Persistent errors simulated");
        }
    }

    let triggered = IncidentTriggered {
        success: true,
        message: format!("Incident \"{}\" triggered", incident.as_str()),
        incident: incident.as_str().to_string(),
        timestamp: Utc::now(),
    };
    Ok(Json(triggered).into_response())
}

/// Inserts `count` raw events backdated by `age`, spread over `users` users.
async fn seed_stale_events(
    state: &AppState,
    count: usize,
    users: usize,
    action: &str,
    age: Duration,
) -> Result<(), ApiError> {
    let created_at = Utc::now() - age;
    for i in 0..count {
        let mut event = RawEvent::new(format!("user_{}", i % users), action);
        event.created_at = created_at;
        state.store.insert_raw_event(&event).await.map_err(|e| {
            error!(error = %e, "Failed to seed incident events");
            ApiError::from(e)
        })?;
    }
    Ok(())
}

/// An empty body is treated as `{}`.
fn parse_optional<T: Default + serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::bad_request(format!("Invalid request body: {}", e)))
}
