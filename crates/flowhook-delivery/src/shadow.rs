//! Shadow forwarding of accepted events to a local consumer.
//!
//! After the platform accepts an event, the same event is wrapped in an
//! [`EventEnvelope`] and POSTed to `{base_url}/{flow_type}` with the shared
//! secret in the `X-Secret` header, so local handlers see it immediately.

use std::sync::Arc;

use flowhook_core::{Clock, EventEnvelope, EventId, Metadata};
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{DeliveryError, Result};

/// Header carrying the shared secret on forwarded events.
pub const SECRET_HEADER: &str = "X-Secret";

/// Where accepted events are forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowTarget {
    /// Base URL of the local consumer, without trailing slash.
    pub base_url: String,
    /// Shared secret. Sent as an empty header when unset.
    pub secret: Option<String>,
}

impl ShadowTarget {
    /// Creates a target with a shared secret.
    pub fn new(base_url: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), secret: Some(secret.into()) }
    }
}

/// Forwards accepted events to a [`ShadowTarget`].
#[derive(Debug, Clone)]
pub struct ShadowForwarder {
    http: reqwest::Client,
    target: ShadowTarget,
    clock: Arc<dyn Clock>,
}

impl ShadowForwarder {
    /// Creates a forwarder sharing an existing HTTP client.
    pub fn new(http: reqwest::Client, target: ShadowTarget, clock: Arc<dyn Clock>) -> Self {
        Self { http, target, clock }
    }

    /// URL events of `flow_type` are forwarded to.
    pub fn url(&self, flow_type: &str) -> String {
        format!("{}/{}", self.target.base_url.trim_end_matches('/'), flow_type)
    }

    /// Forwards every accepted event, concurrently.
    ///
    /// Each event is attempted independently; one failure does not stop
    /// the others.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ShadowForward` naming the first failing
    /// event in input order, with the ids that were forwarded.
    pub async fn forward_all(
        &self,
        flow_type: &str,
        event_type: &str,
        events: &[(EventId, &Value)],
        metadata: Option<&Metadata>,
    ) -> Result<()> {
        let results = join_all(events.iter().map(|(event_id, payload)| {
            self.forward(flow_type, event_type, event_id, payload, metadata)
        }))
        .await;

        let forwarded: Vec<EventId> = events
            .iter()
            .zip(&results)
            .filter(|(_, result)| result.is_ok())
            .map(|((event_id, _), _)| event_id.clone())
            .collect();

        match results.into_iter().find_map(std::result::Result::err) {
            None => Ok(()),
            Some(DeliveryError::ShadowForward {
                event_id,
                flow_type,
                event_type,
                message,
                response,
                exception,
                ..
            }) => Err(DeliveryError::ShadowForward {
                event_id,
                flow_type,
                event_type,
                message,
                response,
                exception,
                forwarded,
            }),
            Some(other) => Err(other),
        }
    }

    /// Forwards one accepted event.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ShadowForward` on a transport failure or a
    /// non-2xx reply.
    pub async fn forward(
        &self,
        flow_type: &str,
        event_type: &str,
        event_id: &EventId,
        payload: &Value,
        metadata: Option<&Metadata>,
    ) -> Result<()> {
        let mut envelope = EventEnvelope::new(
            event_id.clone(),
            flow_type,
            event_type,
            self.clock.now_utc(),
            payload.clone(),
        );
        if let Some(metadata) = metadata {
            envelope = envelope.with_metadata(metadata.clone());
        }

        let failure = |message: String, response: Option<Value>, exception: Option<String>| {
            DeliveryError::ShadowForward {
                event_id: event_id.clone(),
                flow_type: flow_type.to_string(),
                event_type: event_type.to_string(),
                message,
                response,
                exception,
                forwarded: Vec::new(),
            }
        };

        let response = self
            .http
            .post(self.url(flow_type))
            .header(SECRET_HEADER, self.target.secret.as_deref().unwrap_or_default())
            .json(&envelope)
            .send()
            .await
            .map_err(|e| {
                warn!(event_id = %event_id, error = %e, "local consumer unreachable");
                failure("Failed to send event to local consumer".to_string(), None, Some(e.to_string()))
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(event_id = %event_id, status = status.as_u16(), "event forwarded");
            return Ok(());
        }

        let body = response.bytes().await.ok().map(|bytes| {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        });

        warn!(event_id = %event_id, status = status.as_u16(), "local consumer rejected event");
        Err(failure(format!("local consumer returned HTTP {}", status.as_u16()), body, None))
    }
}
