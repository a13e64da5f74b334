//! Error types for event delivery operations.
//!
//! Producer-side failures are raised to the immediate caller of a send.
//! Each variant carries enough context (flow type, event type, payload,
//! event ids, raw platform reply) to reconstruct what failed.

use flowhook_core::EventId;
use serde_json::Value;
use thiserror::Error;

/// Result type alias for delivery operations.
pub type Result<T> = std::result::Result<T, DeliveryError>;

/// Error types for event delivery operations.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// The platform rejected the request, replied with an unexpected shape,
    /// or every attempt failed locally.
    #[error("failed to send {flow_type}/{event_type}: {message}{}", suffix(.exception))]
    Send {
        /// What went wrong.
        message: String,
        /// Flow type of the rejected send.
        flow_type: String,
        /// Event type of the rejected send.
        event_type: String,
        /// Payload as sent (an array for batches, file details for files).
        payload: Value,
        /// Raw platform reply, if one was received.
        response: Option<Value>,
        /// Local exception text, if the final attempt never got a reply.
        exception: Option<String>,
    },

    /// The platform returned a different number of ids than payloads sent.
    #[error("platform returned {received} event ids for {expected} payloads ({flow_type}/{event_type})")]
    BatchCountMismatch {
        /// Flow type of the batch.
        flow_type: String,
        /// Event type of the batch.
        event_type: String,
        /// Number of payloads sent.
        expected: usize,
        /// Number of ids returned.
        received: usize,
        /// Raw platform reply.
        response: Value,
    },

    /// Forwarding an accepted event to the local consumer failed.
    ///
    /// The platform-side event is not retracted.
    #[error("failed to forward event {event_id} to local consumer: {message}{}", suffix(.exception))]
    ShadowForward {
        /// First event that could not be forwarded.
        event_id: EventId,
        /// Flow type of the event.
        flow_type: String,
        /// Event type of the event.
        event_type: String,
        /// What went wrong.
        message: String,
        /// Local consumer reply body, if one was received.
        response: Option<Value>,
        /// Transport error text, if no reply was received.
        exception: Option<String>,
        /// Events of the same send that were forwarded successfully.
        forwarded: Vec<EventId>,
    },

    /// Events were still unconfirmed after the last polling round.
    #[error("confirmation failed for {}{}", join_ids(.event_ids), suffix(.exception))]
    Confirmation {
        /// Ids that never passed the confirmation check.
        event_ids: Vec<EventId>,
        /// Error raised by the check during the final round, if any.
        exception: Option<String>,
    },

    /// Network-level connectivity failure.
    #[error("network connection failed: {message}")]
    NetworkError {
        /// Error message describing the network failure.
        message: String,
    },

    /// HTTP request timeout exceeded.
    #[error("request timeout after {timeout_seconds}s")]
    Timeout {
        /// Configured request timeout.
        timeout_seconds: u64,
    },

    /// A payload or metadata map could not be serialized.
    #[error("serialization failed: {message}")]
    Serialization {
        /// Serializer error message.
        message: String,
    },

    /// Invalid delivery configuration.
    #[error("invalid delivery configuration: {message}")]
    ConfigurationError {
        /// Configuration error message.
        message: String,
    },
}

impl DeliveryError {
    /// Creates a network error from a message.
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError { message: message.into() }
    }

    /// Creates a timeout error.
    pub fn timeout(timeout_seconds: u64) -> Self {
        Self::Timeout { timeout_seconds }
    }

    /// Creates a serialization error.
    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::Serialization { message: err.to_string() }
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError { message: message.into() }
    }

    /// Whether a local failure during an attempt may be retried.
    ///
    /// Only transport failures qualify. Protocol and bookkeeping failures
    /// are terminal for the send that raised them.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError { .. } | Self::Timeout { .. } => true,

            Self::Send { .. }
            | Self::BatchCountMismatch { .. }
            | Self::ShadowForward { .. }
            | Self::Confirmation { .. }
            | Self::Serialization { .. }
            | Self::ConfigurationError { .. } => false,
        }
    }

    /// Short stable label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send",
            Self::BatchCountMismatch { .. } => "batch_count_mismatch",
            Self::ShadowForward { .. } => "shadow_forward",
            Self::Confirmation { .. } => "confirmation",
            Self::NetworkError { .. } => "network",
            Self::Timeout { .. } => "timeout",
            Self::Serialization { .. } => "serialization",
            Self::ConfigurationError { .. } => "configuration",
        }
    }

    /// Raw reply attached to the error, if any.
    pub fn response(&self) -> Option<&Value> {
        match self {
            Self::Send { response, .. } | Self::ShadowForward { response, .. } => response.as_ref(),
            Self::BatchCountMismatch { response, .. } => Some(response),
            _ => None,
        }
    }
}

fn suffix(exception: &Option<String>) -> String {
    exception.as_ref().map(|e| format!(" ({e})")).unwrap_or_default()
}

fn join_ids(ids: &[EventId]) -> String {
    ids.iter().map(EventId::as_str).collect::<Vec<_>>().join(", ")
}
