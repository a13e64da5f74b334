//! Property-based tests for retry decisions and confirmation polling.
//!
//! Checks the sequencing rules over generated inputs instead of a fixed
//! grid: which statuses are retried, how many attempts are made, and that
//! the confirmation working set only ever shrinks.

#![allow(clippy::unwrap_used)]
#![allow(clippy::panic)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use flowhook_core::{EventId, TestClock};
use flowhook_delivery::{
    retry::{is_retryable_status, RetryDecision},
    Backoff, ConfirmationCheck, ConfirmationTracker, DeliveryError, RetryPolicy,
};
use proptest::prelude::*;

fn proptest_config() -> ProptestConfig {
    ProptestConfig { cases: 64, ..ProptestConfig::default() }
}

/// Confirms each id once it has been checked `n` times.
struct ConfirmAfter {
    rounds: HashMap<EventId, u32>,
    calls: Mutex<HashMap<EventId, u32>>,
}

#[async_trait]
impl ConfirmationCheck for ConfirmAfter {
    async fn is_confirmed(&self, event_id: &EventId) -> anyhow::Result<bool> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(event_id.clone()).or_insert(0);
            *count += 1;
            *count
        };
        Ok(call >= self.rounds[event_id])
    }
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn retry_only_listed_statuses_within_budget(
        status in 100u16..600,
        max_attempts in 1u32..6,
        attempt_offset in 0u32..6,
    ) {
        let attempt = 1 + attempt_offset.min(max_attempts - 1);
        let policy = RetryPolicy::new(max_attempts, Backoff::fixed_ms(25));

        let should_retry = is_retryable_status(status) && attempt < max_attempts;
        match policy.decide_status(attempt, status) {
            RetryDecision::Retry { delay } => {
                prop_assert!(should_retry);
                prop_assert_eq!(delay.as_millis(), 25);
            },
            RetryDecision::GiveUp { .. } => prop_assert!(!should_retry),
        }
    }

    #[test]
    fn confirmation_never_rechecks_confirmed_ids(
        confirm_rounds in prop::collection::vec(1u32..6, 1..8),
        max_rounds in 1u32..5,
    ) {
        let ids: Vec<EventId> =
            (0..confirm_rounds.len()).map(|i| EventId::new(format!("e-{i}"))).collect();
        let check = ConfirmAfter {
            rounds: ids.iter().cloned().zip(confirm_rounds.iter().copied()).collect(),
            calls: Mutex::new(HashMap::new()),
        };
        let clock = TestClock::new();
        let tracker = ConfirmationTracker::new(
            RetryPolicy::new(max_rounds, Backoff::fixed_ms(10)),
            Arc::new(clock.clone()),
        );

        let rt = tokio::runtime::Runtime::new().unwrap();
        let result = rt.block_on(tracker.wait_for(&check, &ids));

        let expected_unresolved: Vec<EventId> = ids
            .iter()
            .zip(&confirm_rounds)
            .filter(|(_, rounds)| **rounds > max_rounds)
            .map(|(id, _)| id.clone())
            .collect();

        match result {
            Ok(()) => prop_assert!(expected_unresolved.is_empty()),
            Err(DeliveryError::Confirmation { event_ids, .. }) => {
                prop_assert_eq!(event_ids, expected_unresolved);
            },
            Err(other) => panic!("unexpected error: {other}"),
        }

        let calls = check.calls.lock().unwrap();
        for (id, rounds) in ids.iter().zip(&confirm_rounds) {
            prop_assert_eq!(calls[id], (*rounds).min(max_rounds));
        }

        let rounds_used = confirm_rounds.iter().copied().max().unwrap_or(1).min(max_rounds);
        prop_assert_eq!(clock.sleeps().len(), (rounds_used - 1) as usize);
    }
}
