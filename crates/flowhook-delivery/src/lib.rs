//! Event delivery to the Flowcore platform.
//!
//! Sends single events, batches and files to the platform ingestion
//! endpoints with classified retry, then optionally forwards each accepted
//! event to a local consumer and polls until every event is confirmed.
//!
//! # Key Features
//!
//! - **Classified retry** - only 408, 429, 500, 502, 503 and 504 are retried
//! - **Shadow forwarding** - accepted events reach a local consumer at once
//! - **Confirmation polling** - rounds shrink as events are confirmed
//! - **Deterministic tests** - every delay goes through an injected clock
//!
//! # Example
//!
//! ```no_run
//! use flowhook_delivery::{DeliveryConfig, DeliveryEngine, DeliveryError};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct OrderCreated {
//!     order_id: String,
//! }
//!
//! # async fn example() -> Result<(), DeliveryError> {
//! let engine = DeliveryEngine::new(DeliveryConfig::new("acme", "sales", "fc_key"))?;
//! let orders = engine.webhook::<OrderCreated>("order.0", "order.created.0");
//!
//! let event_id = orders.send(&OrderCreated { order_id: "o-1".into() }, None).await?;
//! println!("accepted as {event_id}");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod confirm;
pub mod engine;
pub mod error;
pub mod response;
pub mod retry;
pub mod shadow;
pub mod store;

pub use client::{ClientConfig, FileData};
pub use config::Settings;
pub use confirm::{confirm_fn, ConfirmationCheck, ConfirmationTracker};
pub use engine::{
    ConfirmationConfig, DeliveryConfig, DeliveryEngine, FileWebhook, SendOptions, Webhook,
};
pub use error::{DeliveryError, Result};
pub use retry::{Backoff, RetryPolicy, RETRYABLE_STATUS_CODES};
pub use shadow::{ShadowTarget, SECRET_HEADER};
#[cfg(feature = "redis")]
pub use store::RedisStore;
pub use store::{ConfirmationStore, InMemoryStore, StoreConfirmation};

/// Default platform ingestion base URL.
pub const DEFAULT_BASE_URL: &str = "https://webhook.api.flowcore.io";

/// Default HTTP request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
