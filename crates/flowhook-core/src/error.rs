//! Validation errors for inbound event envelopes.
//!
//! A malformed envelope is not a protocol outcome: it is raised to the
//! caller with a field-to-message map so the offending request can be
//! reported precisely.

use thiserror::Error;

use crate::models::FieldErrors;

/// Inbound envelope did not match the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid event: {}", summarize(.errors))]
pub struct EnvelopeValidationError {
    /// Field path to message, e.g. `/validTime` -> `Expected string`.
    pub errors: FieldErrors,
}

impl EnvelopeValidationError {
    /// Creates an error from a populated field map.
    pub fn new(errors: FieldErrors) -> Self {
        Self { errors }
    }

    /// Creates an error carrying a single field failure.
    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(path.into(), message.into());
        Self { errors }
    }
}

fn summarize(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(path, message)| format!("{path}: {message}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_every_field() {
        let mut errors = FieldErrors::new();
        errors.insert("/eventId".to_string(), "Expected required property".to_string());
        errors.insert("/validTime".to_string(), "Expected string".to_string());

        let error = EnvelopeValidationError::new(errors);
        assert_eq!(
            error.to_string(),
            "invalid event: /eventId: Expected required property, /validTime: Expected string"
        );
    }

    #[test]
    fn single_field_error() {
        let error = EnvelopeValidationError::single("/", "Expected object");
        assert_eq!(error.errors.len(), 1);
        assert_eq!(error.errors.get("/").map(String::as_str), Some("Expected object"));
    }
}
