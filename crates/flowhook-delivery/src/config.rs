//! Layered settings for producers.
//!
//! Values come from built-in defaults, then `flowhook.toml`, then
//! `FLOWCORE_*` environment variables, highest priority last.

use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::{
    client::ClientConfig,
    engine::DeliveryConfig,
    retry::{Backoff, RetryPolicy, DEFAULT_CONFIRM_ATTEMPTS, DEFAULT_MAX_ATTEMPTS},
    shadow::ShadowTarget,
    DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECONDS,
};

const CONFIG_FILE: &str = "flowhook.toml";
const ENV_PREFIX: &str = "FLOWCORE_";

/// Producer settings.
///
/// # Example
///
/// ```no_run
/// use flowhook_delivery::{DeliveryEngine, Settings};
///
/// # fn main() -> anyhow::Result<()> {
/// let settings = Settings::load()?;
/// let engine = DeliveryEngine::new(settings.to_delivery_config())?;
/// # let _ = engine;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Platform ingestion base URL.
    ///
    /// Environment variable: `FLOWCORE_WEBHOOK_BASEURL`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Environment variable: `FLOWCORE_TENANT`
    #[serde(default)]
    pub tenant: String,

    /// Environment variable: `FLOWCORE_DATACORE`
    #[serde(default)]
    pub data_core: String,

    /// Environment variable: `FLOWCORE_KEY`
    #[serde(default)]
    pub api_key: String,

    /// Environment variable: `FLOWCORE_RETRY_MAX_ATTEMPTS`
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Environment variable: `FLOWCORE_RETRY_DELAY_MS`
    #[serde(default = "default_delay_ms")]
    pub retry_delay_ms: u64,

    /// Environment variable: `FLOWCORE_CONFIRM_MAX_ATTEMPTS`
    #[serde(default = "default_confirm_max_attempts")]
    pub confirm_max_attempts: u32,

    /// Environment variable: `FLOWCORE_CONFIRM_DELAY_MS`
    #[serde(default = "default_delay_ms")]
    pub confirm_delay_ms: u64,

    /// Local consumer for shadow forwarding.
    ///
    /// Environment variable: `FLOWCORE_LOCAL_BASEURL`
    #[serde(default)]
    pub local_base_url: Option<String>,

    /// Environment variable: `FLOWCORE_LOCAL_SECRET`
    #[serde(default)]
    pub local_secret: Option<String>,

    /// Environment variable: `FLOWCORE_SHADOW_ONLY`
    #[serde(default)]
    pub shadow_only: bool,

    /// Confirmation store, `redis://host:port/db`.
    ///
    /// Environment variable: `FLOWCORE_REDIS_URL`
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Environment variable: `FLOWCORE_REDIS_KEY_PREFIX`
    #[serde(default = "default_redis_key_prefix")]
    pub redis_key_prefix: String,

    /// Environment variable: `FLOWCORE_REQUEST_TIMEOUT_SECONDS`
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Settings {
    /// Loads settings from defaults, `flowhook.toml` and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result fails
    /// [`Settings::validate`].
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    /// The provider stack [`Settings::load`] reads.
    pub fn figment() -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).map(|key| {
                let key = key.as_str().to_ascii_lowercase();
                match key.as_str() {
                    "webhook_baseurl" => "base_url".to_string(),
                    "datacore" => "data_core".to_string(),
                    "key" => "api_key".to_string(),
                    "local_baseurl" => "local_base_url".to_string(),
                    _ => key,
                }
                .into()
            }))
    }

    /// Extracts and validates settings from a custom provider stack.
    ///
    /// # Errors
    ///
    /// Same as [`Settings::load`].
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let settings: Self = figment.extract().context("failed to load flowhook settings")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks required values and ranges.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.shadow_only {
            if self.local_base_url.is_none() {
                anyhow::bail!("shadow_only requires local_base_url");
            }
        } else {
            if self.tenant.trim().is_empty() {
                anyhow::bail!("tenant must be set");
            }
            if self.data_core.trim().is_empty() {
                anyhow::bail!("data_core must be set");
            }
            if self.api_key.trim().is_empty() {
                anyhow::bail!("api_key must be set");
            }
        }

        if self.retry_max_attempts == 0 {
            anyhow::bail!("retry_max_attempts must be greater than 0");
        }

        if self.confirm_max_attempts == 0 {
            anyhow::bail!("confirm_max_attempts must be greater than 0");
        }

        if self.request_timeout_seconds == 0 {
            anyhow::bail!("request_timeout_seconds must be greater than 0");
        }

        Ok(())
    }

    /// API key with everything after the first four characters masked.
    pub fn api_key_masked(&self) -> String {
        let visible: String = self.api_key.chars().take(4).collect();
        format!("{visible}***")
    }

    /// Retry policy for platform requests.
    pub fn to_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_max_attempts, Backoff::fixed_ms(self.retry_delay_ms))
    }

    /// Polling policy for confirmation.
    pub fn to_confirmation_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.confirm_max_attempts, Backoff::fixed_ms(self.confirm_delay_ms))
    }

    /// HTTP client configuration.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_secs(self.request_timeout_seconds),
            ..ClientConfig::default()
        }
    }

    /// Shadow target, when a local base URL is set.
    pub fn shadow_target(&self) -> Option<ShadowTarget> {
        self.local_base_url.as_ref().map(|base_url| ShadowTarget {
            base_url: base_url.clone(),
            secret: self.local_secret.clone(),
        })
    }

    /// Engine configuration without confirmation.
    ///
    /// Attach a check with [`DeliveryConfig::with_confirmation`], or use
    /// `redis_confirmation` with the `redis` feature.
    pub fn to_delivery_config(&self) -> DeliveryConfig {
        let mut config = DeliveryConfig::new(&self.tenant, &self.data_core, &self.api_key)
            .with_base_url(&self.base_url)
            .with_retry(self.to_retry_policy())
            .with_client(self.to_client_config());

        if let Some(target) = self.shadow_target() {
            config = config.with_shadow(target);
        }
        if self.shadow_only {
            config = config.shadow_only();
        }

        config
    }

    /// Confirmation against the configured Redis store, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis URL is malformed.
    #[cfg(feature = "redis")]
    pub fn redis_confirmation(&self) -> Result<Option<crate::engine::ConfirmationConfig>> {
        use std::sync::Arc;

        use crate::{
            engine::ConfirmationConfig,
            store::{RedisStore, StoreConfirmation},
        };

        let Some(url) = &self.redis_url else {
            return Ok(None);
        };

        let store = RedisStore::open(url).context("invalid FLOWCORE_REDIS_URL")?;
        let check = StoreConfirmation::new(Arc::new(store), &self.redis_key_prefix);

        Ok(Some(ConfirmationConfig::new(Arc::new(check)).with_policy(self.to_confirmation_policy())))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            tenant: String::new(),
            data_core: String::new(),
            api_key: String::new(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_delay_ms: default_delay_ms(),
            confirm_max_attempts: default_confirm_max_attempts(),
            confirm_delay_ms: default_delay_ms(),
            local_base_url: None,
            local_secret: None,
            shadow_only: false,
            redis_url: None,
            redis_key_prefix: default_redis_key_prefix(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_retry_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_confirm_max_attempts() -> u32 {
    DEFAULT_CONFIRM_ATTEMPTS
}

fn default_delay_ms() -> u64 {
    250
}

fn default_redis_key_prefix() -> String {
    "flowcore:event".to_string()
}

fn default_request_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, env, sync::Mutex};

    use super::*;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct TestEnvGuard {
        _lock: std::sync::MutexGuard<'static, ()>,
        originals: HashMap<String, Option<String>>,
    }

    impl TestEnvGuard {
        fn new() -> Self {
            let lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            Self { _lock: lock, originals: HashMap::new() }
        }

        fn set_var(&mut self, key: &str, value: &str) {
            self.originals.entry(key.to_string()).or_insert_with(|| env::var(key).ok());
            env::set_var(key, value);
        }
    }

    impl Drop for TestEnvGuard {
        fn drop(&mut self) {
            for (key, original) in &self.originals {
                match original {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
        }
    }

    fn credentials(guard: &mut TestEnvGuard) {
        guard.set_var("FLOWCORE_TENANT", "acme");
        guard.set_var("FLOWCORE_DATACORE", "core");
        guard.set_var("FLOWCORE_KEY", "fc_live_0123456789");
    }

    #[test]
    fn defaults_require_credentials() {
        let settings = Settings::default();

        assert_eq!(settings.base_url, "https://webhook.api.flowcore.io");
        assert_eq!(settings.retry_max_attempts, 1);
        assert_eq!(settings.confirm_max_attempts, 8);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn environment_overrides_defaults() {
        let mut guard = TestEnvGuard::new();
        credentials(&mut guard);
        guard.set_var("FLOWCORE_WEBHOOK_BASEURL", "http://localhost:8888");
        guard.set_var("FLOWCORE_RETRY_MAX_ATTEMPTS", "4");
        guard.set_var("FLOWCORE_RETRY_DELAY_MS", "50");
        guard.set_var("FLOWCORE_LOCAL_BASEURL", "http://localhost:3000/transformers");
        guard.set_var("FLOWCORE_LOCAL_SECRET", "s3cret");

        let settings = Settings::load().unwrap();

        assert_eq!(settings.tenant, "acme");
        assert_eq!(settings.data_core, "core");
        assert_eq!(settings.api_key, "fc_live_0123456789");
        assert_eq!(settings.base_url, "http://localhost:8888");
        assert_eq!(settings.retry_max_attempts, 4);
        assert_eq!(
            settings.shadow_target(),
            Some(ShadowTarget::new("http://localhost:3000/transformers", "s3cret"))
        );

        let policy = settings.to_retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.delay_after(1), Duration::from_millis(50));
    }

    #[test]
    fn delivery_config_carries_settings() {
        let mut guard = TestEnvGuard::new();
        credentials(&mut guard);
        guard.set_var("FLOWCORE_REQUEST_TIMEOUT_SECONDS", "5");

        let config = Settings::load().unwrap().to_delivery_config();

        assert_eq!(config.tenant, "acme");
        assert_eq!(config.client.timeout, Duration::from_secs(5));
        assert!(config.shadow.is_none());
        assert!(!config.shadow_only);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn shadow_only_needs_local_target() {
        let settings = Settings { shadow_only: true, ..Settings::default() };
        assert!(settings.validate().is_err());

        let settings = Settings {
            shadow_only: true,
            local_base_url: Some("http://localhost:3000".to_string()),
            ..Settings::default()
        };
        assert!(settings.validate().is_ok());
        assert!(settings.to_delivery_config().validate().is_ok());
    }

    #[test]
    fn zero_attempts_rejected() {
        let settings = Settings {
            tenant: "acme".to_string(),
            data_core: "core".to_string(),
            api_key: "key".to_string(),
            confirm_max_attempts: 0,
            ..Settings::default()
        };

        assert!(settings.validate().is_err());
    }

    #[test]
    fn api_key_masking() {
        let settings = Settings { api_key: "fc_live_0123456789".to_string(), ..Settings::default() };
        assert_eq!(settings.api_key_masked(), "fc_l***");
    }
}
