//! Inbound event dispatch for Flowcore consumers.
//!
//! Validates event envelopes posted by a forwarder, checks the shared
//! secret, flow type, event type and payload shape, then runs the typed
//! handler registered for the event type.
//!
//! # Example
//!
//! ```no_run
//! use flowhook_dispatch::{Dispatcher, Validated};
//! use serde::Deserialize;
//! use validator::Validate;
//!
//! #[derive(Deserialize, Validate)]
//! struct OrderCreated {
//!     #[validate(length(min = 1))]
//!     order_id: String,
//! }
//!
//! # async fn example(body: serde_json::Value) -> Result<(), flowhook_dispatch::DispatchError> {
//! let dispatcher = Dispatcher::builder("order.0")
//!     .with_secret("s3cret")
//!     .on_event_type("order.created.0", Validated::<OrderCreated>::new(), |order, _envelope| async move {
//!         println!("order {} created", order.order_id);
//!         Ok(())
//!     })
//!     .build()?;
//!
//! let response = dispatcher.dispatch_value(&body, Some("s3cret")).await?;
//! assert!(response.is_ok());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod response;
pub mod schema;
pub mod server;

pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{DispatchError, Result};
pub use handlers::transform::SECRET_HEADER;
pub use response::TransformResponse;
pub use schema::{AnyPayload, PayloadSchema, Validated};
pub use server::{router, serve, serve_on};
