//! Core event model shared by the delivery and dispatch sides.
//!
//! Provides the canonical event envelope exchanged with the platform and
//! with local consumers, strongly-typed identifiers, envelope validation
//! with field-level error reporting, and a clock abstraction so retry and
//! polling delays can be driven deterministically in tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod time;

pub use error::EnvelopeValidationError;
pub use models::{EventEnvelope, EventId, FieldErrors, Metadata};
pub use time::{Clock, RealClock, TestClock};
