//! Event-type registry and the per-event dispatch state machine.
//!
//! A [`Dispatcher`] is bound to one flow type. Each inbound envelope is
//! checked in a fixed order: shared secret, flow type, event type, payload.
//! The first failing check becomes the response. When every check passes
//! the registered handler runs with the typed payload.
//!
//! Success and error hooks run detached after the response is produced.
//! A failing hook never changes the response. It is logged and, when a
//! channel is attached, sent to it.

use std::{collections::HashMap, fmt, future::Future, pin::Pin, sync::Arc};

use flowhook_core::{EventEnvelope, FieldErrors};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    error::{DispatchError, Result},
    response::TransformResponse,
    schema::PayloadSchema,
};

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

type HandlerFn =
    Arc<dyn Fn(EventEnvelope) -> std::result::Result<BoxFuture<anyhow::Result<()>>, FieldErrors> + Send + Sync>;

type HookFn = Arc<dyn Fn(EventEnvelope, TransformResponse) -> BoxFuture<anyhow::Result<()>> + Send + Sync>;

/// Builder collecting the flow type, secret, handlers and hooks.
///
/// Registration errors are deferred to [`DispatcherBuilder::build`] so the
/// builder can be chained.
pub struct DispatcherBuilder {
    flow_type: String,
    secret: Option<String>,
    handlers: HashMap<String, HandlerFn>,
    on_success: Option<HookFn>,
    on_error: Option<HookFn>,
    hook_errors: Option<UnboundedSender<DispatchError>>,
    problem: Option<DispatchError>,
}

impl DispatcherBuilder {
    fn new(flow_type: impl Into<String>) -> Self {
        let flow_type = flow_type.into();
        let problem = flow_type
            .trim()
            .is_empty()
            .then(|| DispatchError::configuration("flow type must not be empty"));

        Self {
            flow_type,
            secret: None,
            handlers: HashMap::new(),
            on_success: None,
            on_error: None,
            hook_errors: None,
            problem,
        }
    }

    /// Requires inbound calls to present this shared secret.
    ///
    /// An empty secret leaves the dispatcher open.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        self.secret = (!secret.is_empty()).then_some(secret);
        self
    }

    /// Registers the handler for an event type.
    ///
    /// Registering the same event type again replaces the earlier handler.
    #[must_use]
    pub fn on_event_type<S, F, Fut>(mut self, event_type: impl Into<String>, schema: S, handler: F) -> Self
    where
        S: PayloadSchema,
        F: Fn(S::Output, EventEnvelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let event_type = event_type.into();
        if event_type.trim().is_empty() {
            self.problem
                .get_or_insert_with(|| DispatchError::configuration("event type must not be empty"));
            return self;
        }

        let run: HandlerFn = Arc::new(
            move |envelope: EventEnvelope| -> std::result::Result<BoxFuture<anyhow::Result<()>>, FieldErrors> {
                let payload = schema.validate(&envelope.payload)?;
                Ok(Box::pin(handler(payload, envelope)))
            },
        );

        if self.handlers.insert(event_type.clone(), run).is_some() {
            debug!(flow_type = %self.flow_type, event_type = %event_type, "replaced handler registration");
        }
        self
    }

    /// Runs after every `Ok` response.
    #[must_use]
    pub fn on_success<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(EventEnvelope, TransformResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_success = Some(boxed_hook(hook));
        self
    }

    /// Runs after every error response.
    #[must_use]
    pub fn on_error<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(EventEnvelope, TransformResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.on_error = Some(boxed_hook(hook));
        self
    }

    /// Sends every hook failure to `sender` in addition to logging it.
    #[must_use]
    pub fn with_hook_errors(mut self, sender: UnboundedSender<DispatchError>) -> Self {
        self.hook_errors = Some(sender);
        self
    }

    /// Finishes the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Configuration`] if the flow type or any
    /// registered event type was empty.
    pub fn build(self) -> Result<Dispatcher> {
        if let Some(problem) = self.problem {
            return Err(problem);
        }

        Ok(Dispatcher {
            inner: Arc::new(Inner {
                flow_type: self.flow_type,
                secret: self.secret,
                handlers: self.handlers,
                on_success: self.on_success,
                on_error: self.on_error,
                hook_errors: self.hook_errors,
            }),
        })
    }
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("flow_type", &self.flow_type)
            .field("event_types", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

struct Inner {
    flow_type: String,
    secret: Option<String>,
    handlers: HashMap<String, HandlerFn>,
    on_success: Option<HookFn>,
    on_error: Option<HookFn>,
    hook_errors: Option<UnboundedSender<DispatchError>>,
}

/// Immutable dispatcher for one flow type. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    /// Starts building a dispatcher for `flow_type`.
    pub fn builder(flow_type: impl Into<String>) -> DispatcherBuilder {
        DispatcherBuilder::new(flow_type)
    }

    /// Flow type this dispatcher accepts.
    pub fn flow_type(&self) -> &str {
        &self.inner.flow_type
    }

    /// Registered event types, sorted.
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.inner.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Parses an untyped body and dispatches it.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidEnvelope`] if `body` is not an event
    /// envelope, otherwise the same errors as [`Dispatcher::dispatch`].
    pub async fn dispatch_value(&self, body: &Value, secret: Option<&str>) -> Result<TransformResponse> {
        let envelope = EventEnvelope::parse(body)?;
        self.dispatch(envelope, secret).await
    }

    /// Runs the dispatch state machine for one envelope.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Handler`] if the registered handler fails.
    /// No hook runs in that case.
    pub async fn dispatch(&self, envelope: EventEnvelope, secret: Option<&str>) -> Result<TransformResponse> {
        let span = info_span!(
            "dispatch",
            flow_type = %self.inner.flow_type,
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
        );

        async move {
            let response = self.process(envelope.clone(), secret).await?;

            if response.is_ok() {
                info!("event handled");
            } else {
                warn!(status = response.status_code(), reason = response.message(), "event rejected");
            }

            self.after_response(envelope, response.clone());
            Ok(response)
        }
        .instrument(span)
        .await
    }

    async fn process(&self, envelope: EventEnvelope, secret: Option<&str>) -> Result<TransformResponse> {
        if let Some(expected) = &self.inner.secret {
            if !secret.is_some_and(|given| timing_safe_eq(given, expected)) {
                return Ok(TransformResponse::unauthorized());
            }
        }

        if envelope.aggregator != self.inner.flow_type {
            return Ok(TransformResponse::invalid("Invalid flow type"));
        }

        let Some(handler) = self.inner.handlers.get(&envelope.event_type) else {
            return Ok(TransformResponse::invalid("Invalid event type"));
        };

        let event_id = envelope.event_id.clone();
        let event_type = envelope.event_type.clone();

        let run = match handler(envelope) {
            Ok(run) => run,
            Err(errors) => return Ok(TransformResponse::invalid_payload(errors)),
        };

        debug!("invoking handler");
        run.await.map_err(|source| {
            error!(error = %source, "handler failed");
            DispatchError::Handler { event_id, event_type, source }
        })?;

        Ok(TransformResponse::Ok)
    }

    fn after_response(&self, envelope: EventEnvelope, response: TransformResponse) {
        let hook = if response.is_ok() { &self.inner.on_success } else { &self.inner.on_error };
        let Some(hook) = hook.clone() else {
            return;
        };

        let sink = self.inner.hook_errors.clone();
        let event_id = envelope.event_id.clone();

        tokio::spawn(
            async move {
                if let Err(source) = hook(envelope, response).await {
                    error!(error = %source, "after-response hook failed");
                    if let Some(sink) = sink {
                        if sink.send(DispatchError::Hook { event_id, source }).is_err() {
                            debug!("hook error receiver dropped");
                        }
                    }
                }
            }
            .in_current_span(),
        );
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("flow_type", &self.inner.flow_type)
            .field("event_types", &self.event_types())
            .field("has_secret", &self.inner.secret.is_some())
            .finish_non_exhaustive()
    }
}

fn boxed_hook<F, Fut>(hook: F) -> HookFn
where
    F: Fn(EventEnvelope, TransformResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |envelope: EventEnvelope, response: TransformResponse| -> BoxFuture<anyhow::Result<()>> {
        Box::pin(hook(envelope, response))
    })
}

fn timing_safe_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AnyPayload;

    #[test]
    fn empty_flow_type_is_rejected() {
        let err = Dispatcher::builder("  ").build().unwrap_err();
        assert!(matches!(err, DispatchError::Configuration { .. }));
    }

    #[test]
    fn empty_event_type_is_rejected() {
        let err = Dispatcher::builder("order.0")
            .on_event_type("", AnyPayload, |_, _| async { Ok(()) })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("event type"));
    }

    #[test]
    fn re_registration_keeps_one_entry() {
        let dispatcher = Dispatcher::builder("order.0")
            .on_event_type("order.created.0", AnyPayload, |_, _| async { Ok(()) })
            .on_event_type("order.created.0", AnyPayload, |_, _| async { Ok(()) })
            .on_event_type("order.cancelled.0", AnyPayload, |_, _| async { Ok(()) })
            .build()
            .unwrap();

        assert_eq!(dispatcher.event_types(), vec!["order.cancelled.0", "order.created.0"]);
    }

    #[test]
    fn secret_comparison() {
        assert!(timing_safe_eq("s3cret", "s3cret"));
        assert!(!timing_safe_eq("s3cret", "s3creT"));
        assert!(!timing_safe_eq("s3cret", "s3cre"));
    }
}
