//! API routes.

pub mod events;
pub mod health;
pub mod incidents;
pub mod metrics;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

/// Creates the API router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/events", post(events::create_event_handler))
        .route("/api/metrics", get(metrics::metrics_handler))
        .route("/api/health", get(health::health_handler))
        .route("/api/status", get(health::status_handler))
        .route("/health/live", get(health::live_handler))
        .route("/api/trigger-errors", post(incidents::trigger_errors_handler))
        .route("/api/trigger-incident", post(incidents::trigger_incident_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
