//! HTTP client for platform ingestion requests.
//!
//! Owns request construction, the retry loop and reply decoding. Every
//! attempt rebuilds its body from the same [`PlatformRequest`], so JSON and
//! multipart sends are retried identically. Delays go through the injected
//! [`Clock`].

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use bytes::Bytes;
use flowhook_core::Clock;
use reqwest::{
    header::HeaderMap,
    multipart::{Form, Part},
};
use serde_json::{json, Value};
use tracing::{debug, info_span, warn, Instrument};

use crate::{
    error::{DeliveryError, Result},
    retry::{RetryDecision, RetryPolicy},
    DEFAULT_TIMEOUT_SECONDS,
};

/// Configuration for the platform HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Timeout for a single HTTP attempt.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            user_agent: concat!("flowhook/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// A file to ingest through the multipart file endpoint.
#[derive(Debug, Clone)]
pub struct FileData {
    /// Caller-chosen file identifier.
    pub file_id: String,
    /// File name sent with the `file` part.
    pub file_name: String,
    /// Content type of the file, sent as the `type` field.
    pub file_type: String,
    /// Raw file contents.
    pub content: Bytes,
    /// Extra string fields appended to the form.
    pub metadata: BTreeMap<String, String>,
    /// Arbitrary JSON sent as the `additionalProperties` field.
    pub additional_properties: Option<Value>,
}

impl FileData {
    /// Creates a file with no extra fields.
    pub fn new(
        file_id: impl Into<String>,
        file_name: impl Into<String>,
        file_type: impl Into<String>,
        content: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: file_name.into(),
            file_type: file_type.into(),
            content: content.into(),
            metadata: BTreeMap::new(),
            additional_properties: None,
        }
    }

    /// Adds a string field to the form.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Sets the `additionalProperties` field.
    #[must_use]
    pub fn with_additional_properties(mut self, properties: Value) -> Self {
        self.additional_properties = Some(properties);
        self
    }

    /// Summary used as error context in place of the file contents.
    pub fn describe(&self) -> Value {
        json!({
            "fileId": self.file_id,
            "fileName": self.file_name,
            "fileType": self.file_type,
            "size": self.content.len(),
        })
    }

    fn to_form(&self) -> Form {
        let mut form = Form::new();
        for (key, value) in &self.metadata {
            form = form.text(key.clone(), value.clone());
        }

        let additional = self.additional_properties.clone().unwrap_or_else(|| json!({}));

        form.text("additionalProperties", additional.to_string())
            .text("fileId", self.file_id.clone())
            .text("type", self.file_type.clone())
            .part("file", self.file_part())
    }

    fn file_part(&self) -> Part {
        let part = || Part::bytes(self.content.to_vec()).file_name(self.file_name.clone());
        part().mime_str(&self.file_type).unwrap_or_else(|_| part())
    }
}

/// Body of a platform request.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// Pre-serialized JSON body.
    Json(Bytes),
    /// Multipart file upload, rebuilt for every attempt.
    Multipart(FileData),
}

/// A fully prepared platform request.
#[derive(Debug, Clone)]
pub struct PlatformRequest {
    /// Destination URL.
    pub url: String,
    /// Request headers, without content type for multipart bodies.
    pub headers: HeaderMap,
    /// Request body.
    pub body: RequestBody,
}

/// Final reply from the platform, after retries.
#[derive(Debug, Clone)]
pub struct PlatformReply {
    /// HTTP status of the final attempt.
    pub status_code: u16,
    /// Decoded reply body. Non-JSON bodies are replaced by a failure shape.
    pub body: Value,
    /// Number of attempts made.
    pub attempts: u32,
    /// Total time spent, including delays.
    pub duration: Duration,
}

impl PlatformReply {
    /// Whether the final attempt returned a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// HTTP client for the platform ingestion endpoints.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    client: reqwest::Client,
    config: ClientConfig,
    clock: Arc<dyn Clock>,
}

impl PlatformClient {
    /// Creates a client with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::ConfigurationError` if the HTTP client cannot
    /// be built.
    pub fn new(config: ClientConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                DeliveryError::configuration(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self { client, config, clock })
    }

    /// Underlying HTTP client, shared with the shadow forwarder.
    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    /// Sends a request, retrying per `policy`.
    ///
    /// Any HTTP reply ends the loop once it is 2xx, non-retryable, or the
    /// budget is spent, and is returned as `Ok`. Local failures are retried
    /// while budget remains.
    ///
    /// # Errors
    ///
    /// Returns the local failure of the final attempt when no attempt
    /// produced a reply that ended the loop.
    pub async fn execute(
        &self,
        request: &PlatformRequest,
        policy: &RetryPolicy,
    ) -> Result<PlatformReply> {
        let start = self.clock.now();
        let mut attempt = 1;

        loop {
            let span = info_span!("platform_request", url = %request.url, attempt);

            match self.attempt(request).instrument(span).await {
                Ok((status_code, body)) => {
                    let reply = PlatformReply {
                        status_code,
                        body,
                        attempts: attempt,
                        duration: self.clock.now().duration_since(start),
                    };

                    if reply.is_success() {
                        return Ok(reply);
                    }

                    match policy.decide_status(attempt, status_code) {
                        RetryDecision::Retry { delay } => {
                            warn!(
                                status = status_code,
                                attempt,
                                delay_ms = delay.as_millis(),
                                "retryable platform status"
                            );
                            self.clock.sleep(delay).await;
                        },
                        RetryDecision::GiveUp { reason } => {
                            debug!(status = status_code, attempt, %reason, "giving up");
                            return Ok(reply);
                        },
                    }
                },
                Err(error) => match policy.decide_error(attempt, &error) {
                    RetryDecision::Retry { delay } => {
                        warn!(
                            error = %error,
                            attempt,
                            delay_ms = delay.as_millis(),
                            "platform request failed locally"
                        );
                        self.clock.sleep(delay).await;
                    },
                    RetryDecision::GiveUp { reason } => {
                        debug!(error = %error, attempt, %reason, "giving up");
                        return Err(error);
                    },
                },
            }

            attempt += 1;
        }
    }

    async fn attempt(&self, request: &PlatformRequest) -> Result<(u16, Value)> {
        let builder = self.client.post(&request.url).headers(request.headers.clone());
        let builder = match &request.body {
            RequestBody::Json(body) => builder.body(body.clone()),
            RequestBody::Multipart(file) => builder.multipart(file.to_form()),
        };

        let response = builder.send().await.map_err(|e| self.classify(&e))?;
        let status = response.status().as_u16();
        let bytes = response.bytes().await.map_err(|e| self.classify(&e))?;

        debug!(status, bytes = bytes.len(), "received platform reply");

        Ok((status, decode_body(status, &bytes)))
    }

    fn classify(&self, error: &reqwest::Error) -> DeliveryError {
        if error.is_timeout() {
            DeliveryError::timeout(self.config.timeout.as_secs())
        } else if error.is_builder() {
            DeliveryError::configuration(format!("invalid request: {error}"))
        } else {
            DeliveryError::network(error.to_string())
        }
    }
}

/// Decodes a reply body, substituting a failure shape for non-JSON.
fn decode_body(status: u16, bytes: &[u8]) -> Value {
    match serde_json::from_slice(bytes) {
        Ok(body) => body,
        Err(e) if (200..300).contains(&status) => json!({
            "success": false,
            "message": "Failed to parse response",
            "error": e.to_string(),
        }),
        Err(_) => json!({
            "success": false,
            "statusCode": status,
            "message": "Failed to parse error response",
            "body": String::from_utf8_lossy(bytes),
        }),
    }
}
