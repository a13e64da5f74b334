//! HTTP server exposing a [`Dispatcher`] to forwarders.
//!
//! Requests flow through middleware in order:
//! 1. Request ID generation
//! 2. Request/response logging
//! 3. Timeout enforcement (30s)
//! 4. Handler execution
//!
//! The server stops on CTRL+C or SIGTERM after in-flight requests finish.

use std::{net::SocketAddr, time::Duration};

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{dispatcher::Dispatcher, handlers};

/// Request timeout applied to every route.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Dispatcher serving the flow type route.
    pub dispatcher: Dispatcher,
}

/// Creates the router for `dispatcher`.
///
/// # Example
///
/// ```no_run
/// use flowhook_dispatch::{server::router, AnyPayload, Dispatcher};
///
/// # fn example() -> Result<(), flowhook_dispatch::DispatchError> {
/// let dispatcher = Dispatcher::builder("order.0")
///     .on_event_type("order.created.0", AnyPayload, |_, _| async { Ok(()) })
///     .build()?;
/// let app = router(dispatcher);
/// # Ok(())
/// # }
/// ```
pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/{flow_type}", post(handlers::transform_event))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(AppState { dispatcher })
}

/// Adds an `X-Request-Id` header to every response.
async fn inject_request_id(mut req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }

    response
}

/// Serves `dispatcher` on `addr` until a shutdown signal arrives.
///
/// # Errors
///
/// Returns `std::io::Error` if the address cannot be bound.
pub async fn serve(dispatcher: Dispatcher, addr: SocketAddr) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    serve_on(dispatcher, listener, shutdown_signal()).await
}

/// Serves `dispatcher` on an already bound listener until `shutdown`
/// resolves.
///
/// # Errors
///
/// Returns `std::io::Error` if the listener fails.
pub async fn serve_on<F>(dispatcher: Dispatcher, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let flow_type = dispatcher.flow_type().to_string();
    let app = router(dispatcher);

    info!(flow_type = %flow_type, "Dispatch server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    info!("Dispatch server stopped gracefully");
    Ok(())
}

/// Waits for CTRL+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    warn!("Waiting for in-flight requests to complete");
}
