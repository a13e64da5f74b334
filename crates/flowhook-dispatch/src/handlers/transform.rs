//! Inbound event handler.
//!
//! Accepts an event envelope posted by a forwarder, runs it through the
//! [`Dispatcher`](crate::Dispatcher) and maps the outcome onto HTTP:
//!
//! - `TransformResponse` values keep their own status code (200/400/401)
//! - a malformed envelope is 400 with the field error map
//! - a failing handler is 500
//! - a path that names another flow type is 404

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use flowhook_core::EventEnvelope;
use tracing::{instrument, warn};

use crate::{error::DispatchError, response::TransformResponse, server::AppState};

/// Header carrying the shared secret.
pub const SECRET_HEADER: &str = "x-secret";

/// Dispatches one inbound event.
#[instrument(name = "transform_event", skip(state, headers, body), fields(body_len = body.len()))]
pub async fn transform_event(
    State(state): State<AppState>,
    Path(flow_type): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let dispatcher = &state.dispatcher;

    if flow_type != dispatcher.flow_type() {
        warn!(expected = dispatcher.flow_type(), "no dispatcher for flow type");
        return respond(TransformResponse::ServerError {
            status_code: 404,
            message: format!("Unknown flow type {flow_type}"),
        });
    }

    let secret = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());

    let outcome = match EventEnvelope::from_slice(&body) {
        Ok(envelope) => dispatcher.dispatch(envelope, secret).await,
        Err(e) => Err(DispatchError::from(e)),
    };

    match outcome {
        Ok(response) => respond(response),
        Err(DispatchError::InvalidEnvelope(e)) => {
            warn!(error = %e, "rejected malformed envelope");
            respond(TransformResponse::ValidationError {
                message: "Invalid event".to_string(),
                errors: Some(e.errors),
            })
        },
        Err(e) => respond(TransformResponse::ServerError {
            status_code: 500,
            message: e.to_string(),
        }),
    }
}

fn respond(response: TransformResponse) -> Response {
    let status =
        StatusCode::from_u16(response.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response)).into_response()
}
