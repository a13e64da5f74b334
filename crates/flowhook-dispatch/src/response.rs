//! Structured dispatch outcomes.
//!
//! On the wire every outcome carries a `status` tag (`ok` or `error`) and a
//! `statusCode`, so a forwarder can branch on the body alone.

use flowhook_core::FieldErrors;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Outcome of dispatching one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformResponse {
    /// The handler ran to completion.
    Ok,
    /// The event was well-formed but not acceptable (400).
    ValidationError {
        /// Reason, e.g. `Invalid event type`.
        message: String,
        /// Per-field payload errors, if any.
        errors: Option<FieldErrors>,
    },
    /// The shared secret did not match (401).
    AuthError {
        /// Always `Unauthorized`.
        message: String,
    },
    /// Any other failure with an explicit status code.
    ServerError {
        /// HTTP status to report.
        status_code: u16,
        /// Reason.
        message: String,
    },
}

impl TransformResponse {
    pub(crate) fn invalid(message: &str) -> Self {
        Self::ValidationError { message: message.to_string(), errors: None }
    }

    pub(crate) fn invalid_payload(errors: FieldErrors) -> Self {
        Self::ValidationError { message: "Invalid payload".to_string(), errors: Some(errors) }
    }

    pub(crate) fn unauthorized() -> Self {
        Self::AuthError { message: "Unauthorized".to_string() }
    }

    /// HTTP status code for this outcome.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Ok => 200,
            Self::ValidationError { .. } => 400,
            Self::AuthError { .. } => 401,
            Self::ServerError { status_code, .. } => *status_code,
        }
    }

    /// Whether this is the `ok` outcome.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Human-readable reason for error outcomes.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Ok => None,
            Self::ValidationError { message, .. }
            | Self::AuthError { message }
            | Self::ServerError { message, .. } => Some(message),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Wire {
    status: String,
    status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    errors: Option<FieldErrors>,
}

impl Serialize for TransformResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (status, errors) = match self {
            Self::Ok => ("ok", None),
            Self::ValidationError { errors, .. } => ("error", errors.clone()),
            Self::AuthError { .. } | Self::ServerError { .. } => ("error", None),
        };

        Wire {
            status: status.to_string(),
            status_code: self.status_code(),
            message: self.message().map(str::to_string),
            errors,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TransformResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = Wire::deserialize(deserializer)?;
        let message = wire.message.unwrap_or_default();

        Ok(match (wire.status.as_str(), wire.status_code) {
            ("ok", _) => Self::Ok,
            (_, 400) => Self::ValidationError { message, errors: wire.errors },
            (_, 401) => Self::AuthError { message },
            (_, status_code) => Self::ServerError { status_code, message },
        })
    }
}
