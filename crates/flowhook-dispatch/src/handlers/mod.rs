//! HTTP request handlers for the dispatch server.
//!
//! - `transform` - inbound event delivery, `POST /{flow_type}`
//! - `health` - service status, `GET /health`

pub mod health;
pub mod transform;

pub use health::health_check;
pub use transform::transform_event;
