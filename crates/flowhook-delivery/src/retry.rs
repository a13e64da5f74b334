//! Retry policies for platform requests and confirmation polling.
//!
//! A policy is a maximum attempt count plus a backoff that maps the
//! 1-based attempt number that just finished to the delay before the next
//! one. Only a fixed set of HTTP statuses is ever retried; every other
//! status is final on the attempt that produced it.

use std::{fmt, sync::Arc, time::Duration};

use rand::Rng;

use crate::error::DeliveryError;

/// HTTP statuses that trigger another attempt.
pub const RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Default delay between platform request attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Default number of platform request attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;

/// Default number of confirmation polling rounds.
pub const DEFAULT_CONFIRM_ATTEMPTS: u32 = 8;

/// Whether a reply status should be retried.
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUS_CODES.contains(&status)
}

/// Delay schedule between attempts.
#[derive(Clone)]
pub enum Backoff {
    /// Same delay after every attempt.
    Fixed(Duration),
    /// Delay computed from the attempt number that just failed.
    PerAttempt(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl Backoff {
    /// Fixed delay in milliseconds.
    pub fn fixed_ms(millis: u64) -> Self {
        Self::Fixed(Duration::from_millis(millis))
    }

    /// Delay computed per attempt by the given function.
    pub fn per_attempt<F>(delay: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        Self::PerAttempt(Arc::new(delay))
    }

    /// Exponential backoff: `base * 2^(attempt-1)`, capped at `max`, with
    /// ±`jitter_factor` randomization.
    pub fn exponential(base: Duration, max: Duration, jitter_factor: f64) -> Self {
        Self::per_attempt(move |attempt| {
            let exponent = attempt.saturating_sub(1).min(20);
            let raw = base.saturating_mul(2_u32.saturating_pow(exponent));
            apply_jitter(raw.min(max), jitter_factor).min(max)
        })
    }

    /// Delay to wait after `attempt` (1-based) before the next one.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::PerAttempt(delay) => delay(attempt),
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Fixed(DEFAULT_RETRY_DELAY)
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(delay) => f.debug_tuple("Fixed").field(delay).finish(),
            Self::PerAttempt(_) => f.write_str("PerAttempt(..)"),
        }
    }
}

/// Retry policy: attempt budget plus backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Delay schedule between attempts.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, backoff: Backoff::default() }
    }
}

/// Outcome of a retry decision for one finished attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then make another attempt.
    Retry {
        /// Delay before the next attempt.
        delay: Duration,
    },
    /// The attempt that just finished is final.
    GiveUp {
        /// Why no further attempt is made.
        reason: String,
    },
}

impl RetryPolicy {
    /// Creates a policy from an attempt budget and a backoff.
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self { max_attempts, backoff }
    }

    /// Default policy for confirmation polling: 8 rounds, 250ms apart.
    pub fn confirmation_default() -> Self {
        Self { max_attempts: DEFAULT_CONFIRM_ATTEMPTS, backoff: Backoff::default() }
    }

    /// Effective attempt budget. A budget of zero still makes one attempt.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Whether `attempt` (1-based) is the last one the budget allows.
    pub fn is_last(&self, attempt: u32) -> bool {
        attempt >= self.attempts()
    }

    /// Delay to wait after `attempt` before the next one.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.delay_for(attempt)
    }

    /// Decides whether to retry after a reply with the given status.
    pub fn decide_status(&self, attempt: u32, status: u16) -> RetryDecision {
        if !is_retryable_status(status) {
            return RetryDecision::GiveUp { reason: format!("non-retryable status {status}") };
        }
        self.decide_budget(attempt)
    }

    /// Decides whether to retry after a local failure.
    pub fn decide_error(&self, attempt: u32, error: &DeliveryError) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::GiveUp { reason: format!("non-retryable error: {error}") };
        }
        self.decide_budget(attempt)
    }

    fn decide_budget(&self, attempt: u32) -> RetryDecision {
        if self.is_last(attempt) {
            return RetryDecision::GiveUp {
                reason: format!("maximum attempts ({}) exceeded", self.attempts()),
            };
        }
        RetryDecision::Retry { delay: self.delay_after(attempt) }
    }
}

/// Randomizes a duration by ±`jitter_factor`.
///
/// With `jitter_factor = 0.25`, a 10s delay becomes 7.5s to 12.5s.
fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 {
        return duration;
    }

    let clamped = jitter_factor.clamp(0.0, 1.0);
    let range = duration.as_secs_f64() * clamped;
    let offset = rand::rng().random_range(-range..=range);

    Duration::from_secs_f64((duration.as_secs_f64() + offset).max(0.0))
}
