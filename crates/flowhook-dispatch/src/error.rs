//! Errors raised by the dispatch engine.
//!
//! Protocol outcomes (bad secret, unknown event type, invalid payload) are
//! returned as [`TransformResponse`](crate::TransformResponse) values. Only
//! the failures below are raised as errors.

use flowhook_core::{EnvelopeValidationError, EventId};
use thiserror::Error;

/// Result type alias for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Dispatch failures outside the protocol's expected outcomes.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The inbound body is not a well-formed event envelope.
    #[error(transparent)]
    InvalidEnvelope(#[from] EnvelopeValidationError),

    /// A registered handler failed while processing an event.
    #[error("failed to handle event {event_id} ({event_type}): {source}")]
    Handler {
        /// Event being handled.
        event_id: EventId,
        /// Event type the handler is registered for.
        event_type: String,
        /// Error returned by the handler.
        #[source]
        source: anyhow::Error,
    },

    /// A success or error hook failed after the response was produced.
    #[error("failed to run after-response hook for event {event_id}: {source}")]
    Hook {
        /// Event the hook ran for.
        event_id: EventId,
        /// Error returned by the hook.
        #[source]
        source: anyhow::Error,
    },

    /// The dispatcher was built with invalid settings.
    #[error("invalid dispatcher configuration: {message}")]
    Configuration {
        /// What is wrong.
        message: String,
    },
}

impl DispatchError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }
}
