//! Health check handler.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::server::AppState;

/// Health check response structure.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Overall service health status
    pub status: HealthStatus,
    /// Flow type served by this dispatcher
    pub flow_type: String,
    /// Event types with a registered handler
    pub event_types: Vec<String>,
    /// Service version information
    pub version: String,
}

/// Overall health status enumeration.
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Ready to dispatch
    Healthy,
}

/// Reports the flow type and registered event types.
#[instrument(name = "health_check", skip(state))]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let dispatcher = &state.dispatcher;

    let response = HealthResponse {
        status: HealthStatus::Healthy,
        flow_type: dispatcher.flow_type().to_string(),
        event_types: dispatcher.event_types().into_iter().map(str::to_string).collect(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    debug!(event_types = response.event_types.len(), "Health check completed");
    (StatusCode::OK, Json(response))
}
