//! Validation of platform acceptance replies.
//!
//! The platform acknowledges with one of three shapes depending on the
//! endpoint. A reply that is an explicit failure, a bare error object, or
//! simply the wrong shape is a rejection.

use flowhook_core::EventId;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

/// Accepted single event.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAccepted {
    /// Id assigned to the event.
    pub event_id: EventId,
}

/// Accepted batch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAccepted {
    /// Ids assigned to the events, in payload order.
    pub event_ids: Vec<EventId>,
}

/// Accepted file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAccepted {
    /// Checksum of the stored file.
    pub checksum: String,
    /// Algorithm used for the checksum.
    #[serde(default)]
    pub hash_type: Option<String>,
    /// Ids of the events produced from the file.
    pub event_ids: Vec<EventId>,
}

/// Which ingestion endpoint produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Single-event endpoint.
    Event,
    /// Batch endpoint.
    Batch,
    /// File endpoint.
    File,
}

impl ReplyKind {
    fn label(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Batch => "batch",
            Self::File => "file",
        }
    }
}

/// Why a reply was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Human-readable reason.
    pub message: String,
}

impl Rejection {
    fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Checks a reply body against the expected acceptance shape.
pub fn accept<T: DeserializeOwned>(
    kind: ReplyKind,
    status_code: u16,
    body: &Value,
) -> Result<T, Rejection> {
    let success = body.get("success").and_then(Value::as_bool);

    if success == Some(false) {
        return Err(Rejection::new(format!("Webhook failed: {}", reason(body))));
    }

    if is_error_object(body) {
        return Err(Rejection::new(format!("Webhook failed: {}", reason(body))));
    }

    if !(200..300).contains(&status_code) {
        return Err(Rejection::new(format!("Webhook failed with HTTP {status_code}")));
    }

    if success != Some(true) {
        return Err(Rejection::new("Webhook returned invalid response"));
    }

    serde_json::from_value(body.clone())
        .map_err(|e| Rejection::new(format!("Webhook returned invalid {} response: {e}", kind.label())))
}

/// `{statusCode, message}` without a success flag.
fn is_error_object(body: &Value) -> bool {
    body.get("success").is_none()
        && body.get("statusCode").is_some_and(Value::is_u64)
        && body.get("message").is_some_and(Value::is_string)
}

fn reason(body: &Value) -> String {
    ["error", "message"]
        .iter()
        .find_map(|key| body.get(key).and_then(Value::as_str))
        .unwrap_or("no reason given")
        .to_string()
}
