//! HTTP API layer for the event pipeline.
//!
//! Writes raw events and reads the metrics snapshot. Never calls into the
//! worker. Also carries the incident-simulation endpoints used to exercise
//! monitoring.

pub mod response;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::{ApiConfig, AppState};
