//! Delivery engine: send, batch and file ingestion with shadow forwarding
//! and confirmation polling.
//!
//! # Flow
//!
//! ```text
//! ┌────────────────┐   ┌────────────────┐   ┌──────────────────┐   ┌───────────────┐
//! │ PlatformClient │──▶│ reply accepted │──▶│ ShadowForwarder  │──▶│ Confirmation  │
//! │ (with retry)   │   │ (ids checked)  │   │ (if configured)  │   │ (if enabled)  │
//! └────────────────┘   └────────────────┘   └──────────────────┘   └───────────────┘
//! ```
//!
//! Each stage runs only if the previous one succeeded. The engine is built
//! once from a [`DeliveryConfig`] and is cheap to clone and share across
//! concurrent sends.

use std::{fmt, marker::PhantomData, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use flowhook_core::{Clock, EventId, Metadata, RealClock};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

use crate::{
    client::{ClientConfig, FileData, PlatformClient, PlatformReply, PlatformRequest, RequestBody},
    confirm::{ConfirmationCheck, ConfirmationTracker},
    error::{DeliveryError, Result},
    response::{accept, BatchAccepted, EventAccepted, FileAccepted, ReplyKind},
    retry::RetryPolicy,
    shadow::{ShadowForwarder, ShadowTarget},
    DEFAULT_BASE_URL,
};

const METADATA_HEADER: HeaderName = HeaderName::from_static("x-flowcore-metadata-json");
const EVENT_TIME_HEADER: HeaderName = HeaderName::from_static("x-flowcore-event-time");
const VALID_TIME_HEADER: HeaderName = HeaderName::from_static("x-flowcore-valid-time");
const EVENT_TIME_KEY_HEADER: HeaderName = HeaderName::from_static("x-flowcore-event-time-key");
const VALID_TIME_KEY_HEADER: HeaderName = HeaderName::from_static("x-flowcore-valid-time-key");

/// Confirmation check plus its polling policy.
#[derive(Clone)]
pub struct ConfirmationConfig {
    /// Decides whether an event id is confirmed.
    pub check: Arc<dyn ConfirmationCheck>,
    /// Round budget and delay between rounds.
    pub policy: RetryPolicy,
}

impl ConfirmationConfig {
    /// Polls `check` under the default policy (8 rounds, 250ms apart).
    pub fn new(check: Arc<dyn ConfirmationCheck>) -> Self {
        Self { check, policy: RetryPolicy::confirmation_default() }
    }

    /// Overrides the polling policy.
    #[must_use]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl fmt::Debug for ConfirmationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfirmationConfig").field("policy", &self.policy).finish_non_exhaustive()
    }
}

/// Configuration for the delivery engine.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Platform ingestion base URL.
    pub base_url: String,

    /// Tenant the events belong to.
    pub tenant: String,

    /// Data core within the tenant.
    pub data_core: String,

    /// API key sent as the `Authorization` header.
    pub api_key: String,

    /// Retry policy for platform requests.
    pub retry: RetryPolicy,

    /// HTTP client configuration.
    pub client: ClientConfig,

    /// Local consumer that receives accepted events.
    pub shadow: Option<ShadowTarget>,

    /// Post-acceptance confirmation polling.
    pub confirmation: Option<ConfirmationConfig>,

    /// Skip the platform entirely and only forward to the local consumer.
    pub shadow_only: bool,
}

impl DeliveryConfig {
    /// Creates a configuration against the default platform URL.
    pub fn new(
        tenant: impl Into<String>,
        data_core: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            tenant: tenant.into(),
            data_core: data_core.into(),
            api_key: api_key.into(),
            retry: RetryPolicy::default(),
            client: ClientConfig::default(),
            shadow: None,
            confirmation: None,
            shadow_only: false,
        }
    }

    /// Overrides the platform base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the platform retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the HTTP client configuration.
    #[must_use]
    pub fn with_client(mut self, client: ClientConfig) -> Self {
        self.client = client;
        self
    }

    /// Forwards accepted events to a local consumer.
    #[must_use]
    pub fn with_shadow(mut self, target: ShadowTarget) -> Self {
        self.shadow = Some(target);
        self
    }

    /// Enables confirmation polling.
    #[must_use]
    pub fn with_confirmation(mut self, confirmation: ConfirmationConfig) -> Self {
        self.confirmation = Some(confirmation);
        self
    }

    /// Bypasses the platform; requires a shadow target.
    #[must_use]
    pub fn shadow_only(mut self) -> Self {
        self.shadow_only = true;
        self
    }

    /// Checks the configuration for missing required values.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` naming the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.shadow_only {
            return match self.shadow {
                Some(_) => Ok(()),
                None => Err(DeliveryError::configuration("shadow-only mode requires a shadow target")),
            };
        }

        for (name, value) in [
            ("base_url", &self.base_url),
            ("tenant", &self.tenant),
            ("data_core", &self.data_core),
            ("api_key", &self.api_key),
        ] {
            if value.trim().is_empty() {
                return Err(DeliveryError::configuration(format!("{name} must not be empty")));
            }
        }

        Ok(())
    }
}

/// Which ingestion endpoint a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Single event.
    Event,
    /// Batch of events.
    Events,
    /// File upload.
    File,
}

impl Endpoint {
    fn path(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Events => "events",
            Self::File => "file",
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Sent as `x-flowcore-event-time`.
    pub event_time: Option<DateTime<Utc>>,
    /// Sent as `x-flowcore-valid-time`.
    pub valid_time: Option<DateTime<Utc>>,
    /// Payload field holding the event time, sent as `x-flowcore-event-time-key`.
    pub event_time_key: Option<String>,
    /// Payload field holding the valid time, sent as `x-flowcore-valid-time-key`.
    pub valid_time_key: Option<String>,
    /// Skip confirmation polling for this call.
    pub skip_confirmation: bool,
}

/// Sends events to the platform.
#[derive(Debug, Clone)]
pub struct DeliveryEngine {
    inner: Arc<EngineInner>,
}

#[derive(Debug)]
struct EngineInner {
    config: DeliveryConfig,
    client: PlatformClient,
    shadow: Option<ShadowForwarder>,
    tracker: Option<ConfirmationTracker>,
}

/// Context attached to send errors.
struct SendContext<'a> {
    flow_type: &'a str,
    event_type: &'a str,
    payload: Value,
}

impl SendContext<'_> {
    fn failure(&self, message: String, response: Option<Value>, exception: Option<String>) -> DeliveryError {
        DeliveryError::Send {
            message,
            flow_type: self.flow_type.to_string(),
            event_type: self.event_type.to_string(),
            payload: self.payload.clone(),
            response,
            exception,
        }
    }
}

impl DeliveryEngine {
    /// Creates an engine on the real clock.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` for an invalid
    /// configuration or an HTTP client that cannot be built.
    pub fn new(config: DeliveryConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(RealClock::new()))
    }

    /// Creates an engine whose delays go through `clock`.
    ///
    /// # Errors
    ///
    /// Same as [`DeliveryEngine::new`].
    pub fn with_clock(config: DeliveryConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let client = PlatformClient::new(config.client.clone(), Arc::clone(&clock))?;
        let shadow = config.shadow.clone().map(|target| {
            ShadowForwarder::new(client.http().clone(), target, Arc::clone(&clock))
        });
        let tracker = config
            .confirmation
            .as_ref()
            .map(|confirmation| ConfirmationTracker::new(confirmation.policy.clone(), clock));

        info!(
            tenant = %config.tenant,
            data_core = %config.data_core,
            shadow = shadow.is_some(),
            confirmation = tracker.is_some(),
            shadow_only = config.shadow_only,
            "delivery engine ready"
        );

        Ok(Self { inner: Arc::new(EngineInner { config, client, shadow, tracker }) })
    }

    /// Configuration the engine was built from.
    pub fn config(&self) -> &DeliveryConfig {
        &self.inner.config
    }

    /// Ingestion URL for an endpoint, flow type and event type.
    pub fn url(&self, endpoint: Endpoint, flow_type: &str, event_type: &str) -> String {
        let config = &self.inner.config;
        format!(
            "{}/{}/{}/{}/{}/{}",
            config.base_url.trim_end_matches('/'),
            endpoint.path(),
            config.tenant,
            config.data_core,
            flow_type,
            event_type
        )
    }

    /// Handle bound to one flow type and event type with a typed payload.
    pub fn webhook<P: Serialize>(
        &self,
        flow_type: impl Into<String>,
        event_type: impl Into<String>,
    ) -> Webhook<P> {
        Webhook {
            engine: self.clone(),
            flow_type: flow_type.into(),
            event_type: event_type.into(),
            default_metadata: None,
            _payload: PhantomData,
        }
    }

    /// Handle bound to one flow type and event type for file uploads.
    pub fn file_webhook(
        &self,
        flow_type: impl Into<String>,
        event_type: impl Into<String>,
    ) -> FileWebhook {
        FileWebhook { engine: self.clone(), flow_type: flow_type.into(), event_type: event_type.into() }
    }

    /// Sends a single event and returns its platform id.
    ///
    /// # Errors
    ///
    /// `Send` if the platform rejects the event or every attempt fails,
    /// `ShadowForward` if the local consumer rejects it, `Confirmation` if
    /// it is never confirmed.
    #[instrument(name = "send_event", skip(self, payload, metadata, options))]
    pub async fn send(
        &self,
        flow_type: &str,
        event_type: &str,
        payload: &Value,
        metadata: Option<&Metadata>,
        options: &SendOptions,
    ) -> Result<EventId> {
        if self.inner.config.shadow_only {
            let event_id = EventId::nil();
            self.forward(flow_type, event_type, &[(event_id.clone(), payload)], metadata).await?;
            return Ok(event_id);
        }

        let context = SendContext { flow_type, event_type, payload: payload.clone() };
        let body = serde_json::to_vec(payload).map_err(DeliveryError::serialization)?;
        let request = PlatformRequest {
            url: self.url(Endpoint::Event, flow_type, event_type),
            headers: self.headers(true, metadata, options)?,
            body: RequestBody::Json(body.into()),
        };

        let reply = self.execute(&request, &context).await?;
        let accepted: EventAccepted = accept_reply(ReplyKind::Event, &reply, &context)?;
        info!(event_id = %accepted.event_id, attempts = reply.attempts, "event accepted");

        self.forward(flow_type, event_type, &[(accepted.event_id.clone(), payload)], metadata)
            .await?;
        self.confirm(std::slice::from_ref(&accepted.event_id), options).await?;

        Ok(accepted.event_id)
    }

    /// Sends a batch and returns the platform ids in payload order.
    ///
    /// # Errors
    ///
    /// As [`DeliveryEngine::send`], plus `BatchCountMismatch` when the
    /// platform returns a different number of ids. A mismatch stops before
    /// forwarding or confirmation.
    #[instrument(name = "send_batch", skip(self, payloads, metadata, options), fields(events = payloads.len()))]
    pub async fn send_batch(
        &self,
        flow_type: &str,
        event_type: &str,
        payloads: &[Value],
        metadata: Option<&Metadata>,
        options: &SendOptions,
    ) -> Result<Vec<EventId>> {
        if self.inner.config.shadow_only {
            let event_ids = vec![EventId::nil(); payloads.len()];
            let events: Vec<_> = event_ids.iter().cloned().zip(payloads).collect();
            self.forward(flow_type, event_type, &events, metadata).await?;
            return Ok(event_ids);
        }

        let batch = Value::Array(payloads.to_vec());
        let body = serde_json::to_vec(&batch).map_err(DeliveryError::serialization)?;
        let context = SendContext { flow_type, event_type, payload: batch };
        let request = PlatformRequest {
            url: self.url(Endpoint::Events, flow_type, event_type),
            headers: self.headers(true, metadata, options)?,
            body: RequestBody::Json(body.into()),
        };

        let reply = self.execute(&request, &context).await?;
        let accepted: BatchAccepted = accept_reply(ReplyKind::Batch, &reply, &context)?;

        if accepted.event_ids.len() != payloads.len() {
            return Err(DeliveryError::BatchCountMismatch {
                flow_type: flow_type.to_string(),
                event_type: event_type.to_string(),
                expected: payloads.len(),
                received: accepted.event_ids.len(),
                response: reply.body,
            });
        }
        info!(events = accepted.event_ids.len(), attempts = reply.attempts, "batch accepted");

        let events: Vec<_> = accepted.event_ids.iter().cloned().zip(payloads).collect();
        self.forward(flow_type, event_type, &events, metadata).await?;
        self.confirm(&accepted.event_ids, options).await?;

        Ok(accepted.event_ids)
    }

    /// Uploads a file and returns the ids of the events it produced.
    ///
    /// Files are not forwarded to the local consumer.
    ///
    /// # Errors
    ///
    /// As [`DeliveryEngine::send`], without `ShadowForward`. In shadow-only
    /// mode there is nowhere to deliver a file, so `ConfigurationError` is
    /// returned.
    #[instrument(name = "send_file", skip(self, file, metadata, options), fields(file_id = %file.file_id))]
    pub async fn send_file(
        &self,
        flow_type: &str,
        event_type: &str,
        file: &FileData,
        metadata: Option<&Metadata>,
        options: &SendOptions,
    ) -> Result<Vec<EventId>> {
        if self.inner.config.shadow_only {
            return Err(DeliveryError::configuration(
                "file uploads are not supported in shadow-only mode",
            ));
        }

        let context = SendContext { flow_type, event_type, payload: file.describe() };
        let request = PlatformRequest {
            url: self.url(Endpoint::File, flow_type, event_type),
            headers: self.headers(false, metadata, options)?,
            body: RequestBody::Multipart(file.clone()),
        };

        let reply = self.execute(&request, &context).await?;
        let accepted: FileAccepted = accept_reply(ReplyKind::File, &reply, &context)?;
        info!(
            events = accepted.event_ids.len(),
            checksum = %accepted.checksum,
            attempts = reply.attempts,
            "file accepted"
        );

        self.confirm(&accepted.event_ids, options).await?;

        Ok(accepted.event_ids)
    }

    async fn execute(&self, request: &PlatformRequest, context: &SendContext<'_>) -> Result<PlatformReply> {
        self.inner.client.execute(request, &self.inner.config.retry).await.map_err(|error| match error {
            DeliveryError::ConfigurationError { .. } => error,
            other => context.failure(
                "Failed with local exception".to_string(),
                None,
                Some(other.to_string()),
            ),
        })
    }

    async fn forward(
        &self,
        flow_type: &str,
        event_type: &str,
        events: &[(EventId, &Value)],
        metadata: Option<&Metadata>,
    ) -> Result<()> {
        match &self.inner.shadow {
            Some(shadow) => shadow.forward_all(flow_type, event_type, events, metadata).await,
            None => Ok(()),
        }
    }

    async fn confirm(&self, event_ids: &[EventId], options: &SendOptions) -> Result<()> {
        if options.skip_confirmation || event_ids.is_empty() {
            return Ok(());
        }

        match (&self.inner.tracker, &self.inner.config.confirmation) {
            (Some(tracker), Some(confirmation)) => {
                tracker.wait_for(confirmation.check.as_ref(), event_ids).await
            },
            _ => Ok(()),
        }
    }

    fn headers(
        &self,
        json: bool,
        metadata: Option<&Metadata>,
        options: &SendOptions,
    ) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        insert(&mut headers, AUTHORIZATION, &self.inner.config.api_key)?;

        if json {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        if let Some(metadata) = metadata.filter(|metadata| !metadata.is_empty()) {
            let encoded = serde_json::to_vec(metadata).map_err(DeliveryError::serialization)?;
            insert(&mut headers, METADATA_HEADER, &STANDARD.encode(encoded))?;
        }

        if let Some(event_time) = options.event_time {
            insert(&mut headers, EVENT_TIME_HEADER, &format_time(event_time))?;
        }
        if let Some(valid_time) = options.valid_time {
            insert(&mut headers, VALID_TIME_HEADER, &format_time(valid_time))?;
        }
        if let Some(key) = &options.event_time_key {
            insert(&mut headers, EVENT_TIME_KEY_HEADER, key)?;
        }
        if let Some(key) = &options.valid_time_key {
            insert(&mut headers, VALID_TIME_KEY_HEADER, key)?;
        }

        Ok(headers)
    }
}

fn insert(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<()> {
    let value = HeaderValue::from_str(value)
        .map_err(|e| DeliveryError::configuration(format!("invalid {name} header value: {e}")))?;
    headers.insert(name, value);
    Ok(())
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn accept_reply<T: serde::de::DeserializeOwned>(
    kind: ReplyKind,
    reply: &PlatformReply,
    context: &SendContext<'_>,
) -> Result<T> {
    accept(kind, reply.status_code, &reply.body)
        .map_err(|rejection| context.failure(rejection.message, Some(reply.body.clone()), None))
}

/// Typed handle for one flow type and event type.
pub struct Webhook<P> {
    engine: DeliveryEngine,
    flow_type: String,
    event_type: String,
    default_metadata: Option<Metadata>,
    _payload: PhantomData<fn(&P)>,
}

impl<P> Clone for Webhook<P> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            flow_type: self.flow_type.clone(),
            event_type: self.event_type.clone(),
            default_metadata: self.default_metadata.clone(),
            _payload: PhantomData,
        }
    }
}

impl<P> fmt::Debug for Webhook<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Webhook")
            .field("flow_type", &self.flow_type)
            .field("event_type", &self.event_type)
            .field("default_metadata", &self.default_metadata)
            .finish_non_exhaustive()
    }
}

impl<P: Serialize> Webhook<P> {
    /// Merges fixed metadata into every send. Fixed entries win over
    /// per-call entries with the same key.
    #[must_use]
    pub fn with_default_metadata(mut self, metadata: Metadata) -> Self {
        self.default_metadata = Some(metadata);
        self
    }

    /// Sends one payload.
    ///
    /// # Errors
    ///
    /// See [`DeliveryEngine::send`].
    pub async fn send(&self, payload: &P, metadata: Option<Metadata>) -> Result<EventId> {
        self.send_with_options(payload, metadata, &SendOptions::default()).await
    }

    /// Sends one payload with per-call options.
    ///
    /// # Errors
    ///
    /// See [`DeliveryEngine::send`].
    pub async fn send_with_options(
        &self,
        payload: &P,
        metadata: Option<Metadata>,
        options: &SendOptions,
    ) -> Result<EventId> {
        let payload = serde_json::to_value(payload).map_err(DeliveryError::serialization)?;
        let metadata = self.merge_metadata(metadata);
        self.engine
            .send(&self.flow_type, &self.event_type, &payload, metadata.as_ref(), options)
            .await
    }

    /// Sends several payloads in one request.
    ///
    /// # Errors
    ///
    /// See [`DeliveryEngine::send_batch`].
    pub async fn send_batch(&self, payloads: &[P], metadata: Option<Metadata>) -> Result<Vec<EventId>> {
        self.send_batch_with_options(payloads, metadata, &SendOptions::default()).await
    }

    /// Sends several payloads with per-call options.
    ///
    /// # Errors
    ///
    /// See [`DeliveryEngine::send_batch`].
    pub async fn send_batch_with_options(
        &self,
        payloads: &[P],
        metadata: Option<Metadata>,
        options: &SendOptions,
    ) -> Result<Vec<EventId>> {
        let payloads = payloads
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(DeliveryError::serialization)?;
        let metadata = self.merge_metadata(metadata);
        self.engine
            .send_batch(&self.flow_type, &self.event_type, &payloads, metadata.as_ref(), options)
            .await
    }

    fn merge_metadata(&self, metadata: Option<Metadata>) -> Option<Metadata> {
        match (metadata, &self.default_metadata) {
            (None, None) => None,
            (Some(metadata), None) => Some(metadata),
            (None, Some(fixed)) => Some(fixed.clone()),
            (Some(mut metadata), Some(fixed)) => {
                metadata.extend(fixed.clone());
                Some(metadata)
            },
        }
    }
}

/// File upload handle for one flow type and event type.
#[derive(Debug, Clone)]
pub struct FileWebhook {
    engine: DeliveryEngine,
    flow_type: String,
    event_type: String,
}

impl FileWebhook {
    /// Uploads a file.
    ///
    /// # Errors
    ///
    /// See [`DeliveryEngine::send_file`].
    pub async fn send(&self, file: &FileData, metadata: Option<Metadata>) -> Result<Vec<EventId>> {
        self.engine
            .send_file(&self.flow_type, &self.event_type, file, metadata.as_ref(), &SendOptions::default())
            .await
    }

    /// Uploads a file with per-call options.
    ///
    /// # Errors
    ///
    /// See [`DeliveryEngine::send_file`].
    pub async fn send_with_options(
        &self,
        file: &FileData,
        metadata: Option<Metadata>,
        options: &SendOptions,
    ) -> Result<Vec<EventId>> {
        self.engine
            .send_file(&self.flow_type, &self.event_type, file, metadata.as_ref(), options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use serde_json::json;

    use super::*;

    fn engine() -> DeliveryEngine {
        DeliveryEngine::new(
            DeliveryConfig::new("acme", "core", "key-123").with_base_url("https://ingest.test/"),
        )
        .unwrap()
    }

    #[test]
    fn url_includes_tenant_and_types() {
        let engine = engine();

        assert_eq!(
            engine.url(Endpoint::Event, "orders.0", "created.0"),
            "https://ingest.test/event/acme/core/orders.0/created.0"
        );
        assert_eq!(
            engine.url(Endpoint::Events, "orders.0", "created.0"),
            "https://ingest.test/events/acme/core/orders.0/created.0"
        );
        assert_eq!(
            engine.url(Endpoint::File, "orders.0", "created.0"),
            "https://ingest.test/file/acme/core/orders.0/created.0"
        );
    }

    #[test]
    fn metadata_travels_base64_encoded() {
        let engine = engine();
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), json!("billing"));

        let headers = engine.headers(true, Some(&metadata), &SendOptions::default()).unwrap();

        let encoded = headers.get("x-flowcore-metadata-json").unwrap().to_str().unwrap();
        let decoded: Value = serde_json::from_slice(&STANDARD.decode(encoded).unwrap()).unwrap();
        assert_eq!(decoded, json!({ "source": "billing" }));
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "key-123");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn empty_metadata_omits_header() {
        let engine = engine();
        let headers = engine.headers(false, Some(&Metadata::new()), &SendOptions::default()).unwrap();

        assert!(headers.get("x-flowcore-metadata-json").is_none());
        assert!(headers.get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn time_options_become_headers() {
        let engine = engine();
        let options = SendOptions {
            event_time: Some(DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z").unwrap().into()),
            valid_time_key: Some("occurredAt".to_string()),
            ..SendOptions::default()
        };

        let headers = engine.headers(true, None, &options).unwrap();

        assert_eq!(headers.get("x-flowcore-event-time").unwrap(), "2024-05-01T10:00:00.000Z");
        assert_eq!(headers.get("x-flowcore-valid-time-key").unwrap(), "occurredAt");
        assert!(headers.get("x-flowcore-valid-time").is_none());
    }

    #[test]
    fn fixed_metadata_wins_over_call_metadata() {
        let mut fixed = Metadata::new();
        fixed.insert("source".to_string(), json!("fixed"));
        let webhook = engine().webhook::<Value>("orders.0", "created.0").with_default_metadata(fixed);

        let mut call = Metadata::new();
        call.insert("source".to_string(), json!("call"));
        call.insert("trace".to_string(), json!("t-1"));

        let merged = webhook.merge_metadata(Some(call)).unwrap();
        assert_eq!(merged["source"], "fixed");
        assert_eq!(merged["trace"], "t-1");
    }

    #[test]
    fn missing_credentials_rejected() {
        let error = DeliveryEngine::new(DeliveryConfig::new("acme", "", "key")).unwrap_err();
        assert!(error.to_string().contains("data_core"));

        let error = DeliveryEngine::new(DeliveryConfig::new("", "", "").shadow_only()).unwrap_err();
        assert!(error.to_string().contains("shadow target"));
    }
}
