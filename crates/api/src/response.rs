//! Standardized API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use pipeline_core::{EventId, MetricsSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use telemetry::{HealthReport, PipelineStats};

/// Response for a stored event.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCreated {
    pub success: bool,
    pub event_id: EventId,
    pub message: String,
}

impl EventCreated {
    pub fn new(event_id: EventId) -> Self {
        Self {
            success: true,
            event_id,
            message: "Event received and queued for processing".to_string(),
        }
    }
}

/// Metrics body; zero-valued with `lastUpdated: null` before the first merge.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsBody {
    pub total_events: u64,
    pub events_by_action: BTreeMap<String, u64>,
    pub events_by_user: BTreeMap<String, u64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl From<Option<MetricsSnapshot>> for MetricsBody {
    fn from(snapshot: Option<MetricsSnapshot>) -> Self {
        match snapshot {
            Some(s) => Self {
                total_events: s.total_events,
                events_by_action: s.events_by_action,
                events_by_user: s.events_by_user,
                last_updated: Some(s.updated_at),
            },
            None => Self {
                total_events: 0,
                events_by_action: BTreeMap::new(),
                events_by_user: BTreeMap::new(),
                last_updated: None,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub success: bool,
    pub metrics: MetricsBody,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub database: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Process status: component health plus counters since startup.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub health: HealthReport,
    pub stats: PipelineStats,
}

/// Response for `POST /api/trigger-errors`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorsTriggered {
    pub success: bool,
    pub message: String,
    pub error_count: u32,
    pub timestamp: DateTime<Utc>,
}

/// Response for `POST /api/trigger-incident`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentTriggered {
    pub success: bool,
    pub message: String,
    pub incident: String,
    pub timestamp: DateTime<Utc>,
}

/// Rejection for an unknown incident name.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidIncident {
    pub error: String,
    pub valid_incidents: Vec<String>,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            code: code.into(),
        }
    }
}

/// API error type with pipeline error codes.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::BAD_REQUEST, "VALID_001", msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::INTERNAL_SERVER_ERROR, "DB_001", msg)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<pipeline_core::Error> for ApiError {
    fn from(err: pipeline_core::Error) -> Self {
        let status = StatusCode::from_u16(err.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match &err {
            pipeline_core::Error::ValidationWithCode { code, message, .. } => {
                ApiError::with_code(status, *code, message)
            }
            pipeline_core::Error::Database { code, message, .. } => {
                ApiError::with_code(status, *code, message)
            }
            pipeline_core::Error::Serialization(e) => ApiError::bad_request(e.to_string()),
            _ => ApiError::internal(err.to_string()),
        }
    }
}
