//! Flowcore event delivery and dispatch.
//!
//! Facade over the workspace crates:
//!
//! - [`flowhook_core`] - event envelope, identifiers and the clock
//! - [`flowhook_delivery`] - sends events to the platform with retry,
//!   shadow forwarding and confirmation polling
//! - [`flowhook_dispatch`] - validates inbound events and runs typed handlers

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub use flowhook_core::{self, EventEnvelope, EventId, Metadata};
pub use flowhook_delivery::{self, DeliveryConfig, DeliveryEngine, DeliveryError, Settings};
pub use flowhook_dispatch::{self, DispatchError, Dispatcher, TransformResponse};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

/// Default filter when `RUST_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "info,flowhook=debug";

/// Installs a global `tracing` subscriber.
///
/// Honours `RUST_LOG` and falls back to [`DEFAULT_LOG_FILTER`].
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing() -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).try_init()
}
