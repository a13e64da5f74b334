//! Key-value confirmation backed by a shared store.
//!
//! A local consumer marks each event it processed by writing `"1"` under
//! `{prefix}:{event_id}` with a short TTL; the producer polls the same key
//! through [`StoreConfirmation`]. [`InMemoryStore`] serves single-process
//! setups and tests, `RedisStore` (feature `redis`) serves everything else.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use flowhook_core::{Clock, EventId, RealClock};
use tokio::sync::Mutex;

use crate::confirm::ConfirmationCheck;

/// How long a confirmation marker lives.
pub const DEFAULT_CONFIRMATION_TTL: Duration = Duration::from_secs(60);

/// Value written for a confirmed event.
pub const CONFIRMED_MARKER: &str = "1";

/// Minimal string key-value store with expiry.
#[async_trait]
pub trait ConfirmationStore: Send + Sync {
    /// Reads a key, `None` when absent or expired.
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Writes a key that expires after `ttl`.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()>;
}

/// Process-local store. Expiry follows the injected clock.
#[derive(Debug)]
pub struct InMemoryStore {
    entries: Mutex<HashMap<String, (String, Instant)>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryStore {
    /// Creates an empty store on the real clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(RealClock::new()))
    }

    /// Creates an empty store on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { entries: Mutex::new(HashMap::new()), clock }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfirmationStore for InMemoryStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, now);

        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        purge_expired(&mut entries, now);

        entries.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(())
    }
}

/// Drops every entry whose TTL has elapsed.
fn purge_expired(entries: &mut HashMap<String, (String, Instant)>, now: Instant) {
    entries.retain(|_, (_, expires_at)| *expires_at > now);
}

/// Redis-backed store.
#[cfg(feature = "redis")]
#[derive(Debug, Clone)]
pub struct RedisStore {
    client: redis::Client,
}

#[cfg(feature = "redis")]
impl RedisStore {
    /// Wraps an existing client.
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Opens a client for `url` (`redis://host:port/db`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed.
    pub fn open(url: &str) -> anyhow::Result<Self> {
        Ok(Self::new(redis::Client::open(url)?))
    }
}

#[cfg(feature = "redis")]
#[async_trait]
impl ConfirmationStore for RedisStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        use redis::AsyncCommands;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        use redis::AsyncCommands;

        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }
}

/// Confirms events by looking up `{prefix}:{event_id}` in a store.
#[derive(Clone)]
pub struct StoreConfirmation {
    store: Arc<dyn ConfirmationStore>,
    key_prefix: String,
    ttl: Duration,
}

impl StoreConfirmation {
    /// Creates a confirmation over `store` using `key_prefix`.
    pub fn new(store: Arc<dyn ConfirmationStore>, key_prefix: impl Into<String>) -> Self {
        Self { store, key_prefix: key_prefix.into(), ttl: DEFAULT_CONFIRMATION_TTL }
    }

    /// Overrides the marker TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Store key for an event.
    pub fn key(&self, event_id: &EventId) -> String {
        format!("{}:{}", self.key_prefix, event_id)
    }

    /// Marks an event as processed. Called from the consuming side.
    ///
    /// # Errors
    ///
    /// Returns the store error if the write fails.
    pub async fn mark_confirmed(&self, event_id: &EventId) -> anyhow::Result<()> {
        self.store.set(&self.key(event_id), CONFIRMED_MARKER, self.ttl).await
    }
}

impl std::fmt::Debug for StoreConfirmation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfirmation")
            .field("key_prefix", &self.key_prefix)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ConfirmationCheck for StoreConfirmation {
    async fn is_confirmed(&self, event_id: &EventId) -> anyhow::Result<bool> {
        Ok(self.store.get(&self.key(event_id)).await?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use flowhook_core::TestClock;

    use super::*;

    #[tokio::test]
    async fn marked_event_is_confirmed() {
        let store = Arc::new(InMemoryStore::new());
        let confirmation = StoreConfirmation::new(store.clone(), "flowcore:event");
        let event_id = EventId::from("e-1");

        assert!(!confirmation.is_confirmed(&event_id).await.unwrap());

        confirmation.mark_confirmed(&event_id).await.unwrap();

        assert!(confirmation.is_confirmed(&event_id).await.unwrap());
        assert_eq!(store.get("flowcore:event:e-1").await.unwrap().as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn marker_expires_after_ttl() {
        let clock = TestClock::new();
        let store = Arc::new(InMemoryStore::with_clock(Arc::new(clock.clone())));
        let confirmation = StoreConfirmation::new(store, "p").with_ttl(Duration::from_secs(60));
        let event_id = EventId::from("e-1");

        confirmation.mark_confirmed(&event_id).await.unwrap();
        clock.advance(Duration::from_secs(59));
        assert!(confirmation.is_confirmed(&event_id).await.unwrap());

        clock.advance(Duration::from_secs(1));
        assert!(!confirmation.is_confirmed(&event_id).await.unwrap());
    }

    #[tokio::test]
    async fn expired_markers_are_evicted_without_being_read_again() {
        let clock = TestClock::new();
        let store = Arc::new(InMemoryStore::with_clock(Arc::new(clock.clone())));
        let confirmation = StoreConfirmation::new(store.clone(), "p").with_ttl(Duration::from_secs(60));

        for n in 0..100 {
            let event_id = EventId::from(format!("e-{n}"));
            confirmation.mark_confirmed(&event_id).await.unwrap();
            assert!(confirmation.is_confirmed(&event_id).await.unwrap());
        }
        assert_eq!(store.entries.lock().await.len(), 100);

        clock.advance(Duration::from_secs(3600));
        assert_eq!(store.get("p:unrelated").await.unwrap(), None);

        assert!(store.entries.lock().await.is_empty());
    }

    #[tokio::test]
    async fn write_evicts_expired_entries() {
        let clock = TestClock::new();
        let store = InMemoryStore::with_clock(Arc::new(clock.clone()));

        store.set("old", "1", Duration::from_secs(10)).await.unwrap();
        clock.advance(Duration::from_secs(11));
        store.set("new", "1", Duration::from_secs(10)).await.unwrap();

        let entries = store.entries.lock().await;
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("new"));
    }

    #[test]
    fn key_joins_prefix_and_id() {
        let confirmation = StoreConfirmation::new(Arc::new(InMemoryStore::new()), "orders");
        assert_eq!(confirmation.key(&EventId::from("abc")), "orders:abc");
    }
}
