//! Confirmation polling for accepted events.
//!
//! After acceptance, a caller-supplied [`ConfirmationCheck`] is polled until
//! every event id passes or the round budget is spent. Each round checks
//! only the ids still pending, concurrently; a confirmed id is never
//! checked again.

use std::{collections::HashSet, future::Future, sync::Arc};

use async_trait::async_trait;
use flowhook_core::{Clock, EventId};
use futures::future::join_all;
use tracing::{debug, instrument, warn};

use crate::{
    error::{DeliveryError, Result},
    retry::RetryPolicy,
};

/// Decides whether an event has been observed downstream.
#[async_trait]
pub trait ConfirmationCheck: Send + Sync {
    /// Returns `true` once the event is confirmed.
    ///
    /// An error counts as "not yet" until the final round.
    async fn is_confirmed(&self, event_id: &EventId) -> anyhow::Result<bool>;
}

/// [`ConfirmationCheck`] backed by an async closure. See [`confirm_fn`].
pub struct FnCheck<F>(F);

/// Wraps an async closure as a [`ConfirmationCheck`].
///
/// ```
/// use flowhook_delivery::confirm::confirm_fn;
///
/// let check = confirm_fn(|event_id| async move {
///     Ok::<_, std::io::Error>(!event_id.is_nil())
/// });
/// # let _ = check;
/// ```
pub fn confirm_fn<F, Fut, E>(check: F) -> FnCheck<F>
where
    F: Fn(EventId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<bool, E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
{
    FnCheck(check)
}

#[async_trait]
impl<F, Fut, E> ConfirmationCheck for FnCheck<F>
where
    F: Fn(EventId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<bool, E>> + Send + 'static,
    E: Into<anyhow::Error> + 'static,
{
    async fn is_confirmed(&self, event_id: &EventId) -> anyhow::Result<bool> {
        (self.0)(event_id.clone()).await.map_err(Into::into)
    }
}

/// Polls a [`ConfirmationCheck`] under a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct ConfirmationTracker {
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl ConfirmationTracker {
    /// Creates a tracker; `policy.max_attempts` is the number of rounds.
    pub fn new(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock }
    }

    /// Waits until every id is confirmed.
    ///
    /// Duplicate ids are checked once.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Confirmation` listing exactly the ids that
    /// were still unconfirmed after the final round. If the check errored
    /// on the final round, that error is attached.
    #[instrument(name = "confirm_events", skip_all, fields(events = event_ids.len()))]
    pub async fn wait_for(
        &self,
        check: &dyn ConfirmationCheck,
        event_ids: &[EventId],
    ) -> Result<()> {
        let mut seen: HashSet<&EventId> = HashSet::with_capacity(event_ids.len());
        let mut pending: Vec<EventId> =
            event_ids.iter().filter(|event_id| seen.insert(*event_id)).cloned().collect();

        let rounds = self.policy.attempts();
        let mut round = 1;

        loop {
            if pending.is_empty() {
                debug!(round, "all events confirmed");
                return Ok(());
            }

            let results =
                join_all(pending.iter().map(|event_id| check.is_confirmed(event_id))).await;

            let mut still_pending = Vec::new();
            let mut last_error = None;
            for (event_id, result) in pending.into_iter().zip(results) {
                match result {
                    Ok(true) => {},
                    Ok(false) => still_pending.push(event_id),
                    Err(e) => {
                        debug!(event_id = %event_id, round, error = %e, "confirmation check failed");
                        last_error = Some(e.to_string());
                        still_pending.push(event_id);
                    },
                }
            }
            pending = still_pending;

            if pending.is_empty() {
                debug!(round, "all events confirmed");
                return Ok(());
            }

            if self.policy.is_last(round) {
                warn!(unconfirmed = pending.len(), rounds, "events not confirmed");
                return Err(DeliveryError::Confirmation { event_ids: pending, exception: last_error });
            }

            self.clock.sleep(self.policy.delay_after(round)).await;
            round += 1;
        }
    }
}
