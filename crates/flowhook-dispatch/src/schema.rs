//! Payload shapes registered per event type.
//!
//! A [`PayloadSchema`] turns the untyped envelope payload into the value a
//! handler receives, or reports field-level errors. [`Validated`] covers the
//! common case of a serde type carrying `validator` rules.

use std::{fmt, marker::PhantomData};

use flowhook_core::FieldErrors;
use serde::de::DeserializeOwned;
use serde_json::Value;
use validator::Validate;

/// Checks a payload and produces the typed value for the handler.
pub trait PayloadSchema: Send + Sync + 'static {
    /// Typed payload handed to the handler.
    type Output: Send + 'static;

    /// Validates `payload`, returning per-field errors on failure.
    ///
    /// # Errors
    ///
    /// Returns a map from field path (e.g. `/name`) to message.
    fn validate(&self, payload: &Value) -> Result<Self::Output, FieldErrors>;
}

/// Schema backed by `serde` deserialization plus `validator` rules.
pub struct Validated<T>(PhantomData<fn() -> T>);

impl<T> Validated<T> {
    /// Creates the schema.
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Validated<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Validated<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Validated<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Validated").field(&std::any::type_name::<T>()).finish()
    }
}

impl<T> PayloadSchema for Validated<T>
where
    T: DeserializeOwned + Validate + Send + 'static,
{
    type Output = T;

    fn validate(&self, payload: &Value) -> Result<T, FieldErrors> {
        let parsed: T = serde_json::from_value(payload.clone()).map_err(|e| {
            let mut errors = FieldErrors::new();
            errors.insert("/".to_string(), e.to_string());
            errors
        })?;

        parsed.validate().map_err(|e| {
            let mut errors: FieldErrors = e
                .field_errors()
                .into_iter()
                .filter_map(|(field, failures)| {
                    failures.first().map(|failure| {
                        let message = failure
                            .message
                            .as_ref()
                            .map_or_else(|| failure.code.to_string(), ToString::to_string);
                        (format!("/{field}"), message)
                    })
                })
                .collect();

            // Nested struct and list failures are not in field_errors.
            if errors.is_empty() {
                errors.insert("/".to_string(), e.to_string());
            }
            errors
        })?;

        Ok(parsed)
    }
}

/// Schema that accepts any payload and passes it through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyPayload;

impl PayloadSchema for AnyPayload {
    type Output = Value;

    fn validate(&self, payload: &Value) -> Result<Value, FieldErrors> {
        Ok(payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Deserialize, Validate)]
    struct Signup {
        #[validate(length(min = 1, message = "name must not be empty"))]
        name: String,
        #[validate(range(min = 18))]
        age: u32,
    }

    #[test]
    fn accepts_valid_payload() {
        let signup = Validated::<Signup>::new().validate(&json!({ "name": "ada", "age": 36 })).unwrap();
        assert_eq!(signup.name, "ada");
        assert_eq!(signup.age, 36);
    }

    #[test]
    fn reports_each_failing_field() {
        let errors = Validated::<Signup>::new()
            .validate(&json!({ "name": "", "age": 12 }))
            .unwrap_err();

        assert_eq!(errors.get("/name").map(String::as_str), Some("name must not be empty"));
        assert_eq!(errors.get("/age").map(String::as_str), Some("range"));
    }

    #[test]
    fn shape_mismatch_is_reported_at_root() {
        let errors = Validated::<Signup>::new().validate(&json!({ "name": 5 })).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors.contains_key("/"));
    }

    #[test]
    fn any_payload_passes_through() {
        let payload = json!([1, 2, 3]);
        assert_eq!(AnyPayload.validate(&payload).unwrap(), payload);
    }
}
