//! Metrics read endpoint.

use axum::{extract::State, Json};
use tracing::error;

use crate::response::{ApiError, MetricsBody, MetricsResponse};
use crate::state::AppState;

/// GET /api/metrics - Current aggregate snapshot.
pub async fn metrics_handler(
    State(state): State<AppState>,
) -> Result<Json<MetricsResponse>, ApiError> {
    let snapshot = state.store.read_metrics_snapshot().await.map_err(|e| {
        error!(error = %e, "Failed to read metrics snapshot");
        ApiError::from(e)
    })?;

    Ok(Json(MetricsResponse {
        success: true,
        metrics: MetricsBody::from(snapshot),
    }))
}
