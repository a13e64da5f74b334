//! Event envelope and strongly-typed identifiers.
//!
//! The envelope is the canonical wrapper exchanged in both directions:
//! the delivery side builds one for every shadow-forwarded event and the
//! dispatch side validates one for every inbound call. Envelopes are
//! immutable once constructed.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::EnvelopeValidationError;

/// Free-form event metadata carried alongside a payload.
pub type Metadata = Map<String, Value>;

/// Field path to validation message.
///
/// Paths use a JSON-pointer style (`/`, `/eventId`, `/payload/name`).
pub type FieldErrors = BTreeMap<String, String>;

/// Platform-assigned event identifier.
///
/// The platform hands out UUID strings, but the value is treated as opaque
/// so ids round-trip exactly as the platform returned them.
///
/// # Example
///
/// ```
/// use flowhook_core::EventId;
///
/// let id = EventId::from("5d1c1a7e-0000-4000-8000-000000000001");
/// assert!(!id.is_nil());
/// assert!(EventId::nil().is_nil());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    /// Wraps a platform-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The all-zero UUID used when no platform id exists (shadow-only mode).
    pub fn nil() -> Self {
        Self(Uuid::nil().to_string())
    }

    /// Whether this is the all-zero placeholder id.
    pub fn is_nil(&self) -> bool {
        Uuid::parse_str(&self.0).is_ok_and(|uuid| uuid.is_nil())
    }

    /// Borrows the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EventId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl AsRef<str> for EventId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Canonical event wrapper.
///
/// Serialized with camelCase keys (`eventId`, `eventType`, `validTime`) and
/// an RFC 3339 `validTime` with millisecond precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    /// Identifier assigned by the platform.
    pub event_id: EventId,

    /// Flow type the event belongs to.
    pub aggregator: String,

    /// Sub-kind of event within the flow type.
    pub event_type: String,

    /// Business time of the event.
    #[serde(serialize_with = "serialize_valid_time")]
    pub valid_time: DateTime<Utc>,

    /// Opaque event payload.
    pub payload: Value,

    /// Optional metadata mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl EventEnvelope {
    /// Builds an envelope without metadata.
    pub fn new(
        event_id: EventId,
        aggregator: impl Into<String>,
        event_type: impl Into<String>,
        valid_time: DateTime<Utc>,
        payload: Value,
    ) -> Self {
        Self {
            event_id,
            aggregator: aggregator.into(),
            event_type: event_type.into(),
            valid_time,
            payload,
            metadata: None,
        }
    }

    /// Attaches metadata to the envelope.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Validates an untyped JSON value against the envelope shape.
    ///
    /// Every failing field is reported, not just the first one.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeValidationError`] with one entry per invalid field.
    pub fn parse(value: &Value) -> Result<Self, EnvelopeValidationError> {
        let Some(object) = value.as_object() else {
            return Err(EnvelopeValidationError::single("/", "Expected object"));
        };

        let mut errors = FieldErrors::new();

        let event_id = required_string(object, "eventId", &mut errors);
        let aggregator = required_string(object, "aggregator", &mut errors);
        let event_type = required_string(object, "eventType", &mut errors);

        let valid_time = required_string(object, "validTime", &mut errors).and_then(|raw| {
            match DateTime::parse_from_rfc3339(&raw) {
                Ok(parsed) => Some(parsed.with_timezone(&Utc)),
                Err(_) => {
                    errors.insert(
                        "/validTime".to_string(),
                        "Expected string to match 'date-time' format".to_string(),
                    );
                    None
                },
            }
        });

        let payload = object.get("payload").cloned();
        if payload.is_none() {
            errors.insert("/payload".to_string(), "Expected required property".to_string());
        }

        let metadata = match object.get("metadata") {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map.clone()),
            Some(_) => {
                errors.insert("/metadata".to_string(), "Expected object".to_string());
                None
            },
        };

        match (event_id, aggregator, event_type, valid_time, payload) {
            (Some(event_id), Some(aggregator), Some(event_type), Some(valid_time), Some(payload))
                if errors.is_empty() =>
            {
                Ok(Self {
                    event_id: EventId(event_id),
                    aggregator,
                    event_type,
                    valid_time,
                    payload,
                    metadata,
                })
            },
            _ => Err(EnvelopeValidationError::new(errors)),
        }
    }

    /// Parses raw request bytes into a validated envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeValidationError`] for non-JSON input or an invalid
    /// envelope shape.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EnvelopeValidationError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| EnvelopeValidationError::single("/", format!("Invalid JSON: {e}")))?;
        Self::parse(&value)
    }
}

fn required_string(
    object: &Map<String, Value>,
    field: &str,
    errors: &mut FieldErrors,
) -> Option<String> {
    match object.get(field) {
        Some(Value::String(value)) => Some(value.clone()),
        Some(_) => {
            errors.insert(format!("/{field}"), "Expected string".to_string());
            None
        },
        None => {
            errors.insert(format!("/{field}"), "Expected required property".to_string());
            None
        },
    }
}

fn serialize_valid_time<S: Serializer>(
    valid_time: &DateTime<Utc>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&valid_time.to_rfc3339_opts(SecondsFormat::Millis, true))
}
