//! Bounded exponential backoff.
//!
//! Used for lock acquisition and table provisioning polls. The policy only
//! computes delays; callers wait through an injected
//! [`Scheduler`](composable_session_core::Scheduler) and measure elapsed time
//! with an injected [`Clock`](composable_session_core::Clock), so retry
//! behavior is deterministic under test.
//!
//! # Example
//!
//! ```rust
//! use composable_session_runtime::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .initial_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(10))
//!     .multiplier(2.0)
//!     .build();
//!
//! assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
//! ```

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 10
/// - `initial_delay`: 50ms
/// - `max_delay`: 1 second
/// - `multiplier`: 2.0 (delay doubles each retry)
/// - `max_elapsed`: 10 seconds
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: usize,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Total waiting budget; `None` bounds by `max_retries` only
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_elapsed: Some(Duration::from_secs(10)),
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: Self::default(),
        }
    }

    /// Calculate delay for a given attempt number.
    ///
    /// Uses exponential backoff: delay = initial_delay * (multiplier ^ attempt)
    /// Capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.multiplier.powi(attempt.min(64) as i32);

        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }

        Duration::from_millis(delay_ms as u64)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.policy.max_retries = max_retries;
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.policy.multiplier = multiplier;
        self
    }

    /// Set (or clear) the total waiting budget.
    #[must_use]
    pub const fn max_elapsed(mut self, budget: Option<Duration>) -> Self {
        self.policy.max_elapsed = budget;
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        self.policy
    }
}

/// Progress through a [`RetryPolicy`].
///
/// Call [`Backoff::next_delay`] after each failed attempt; `None` means the
/// budget is exhausted.
#[derive(Debug, Clone)]
pub struct Backoff<'a> {
    policy: &'a RetryPolicy,
    started: DateTime<Utc>,
    retries: usize,
}

impl<'a> Backoff<'a> {
    /// Start tracking at `now`.
    #[must_use]
    pub const fn start(policy: &'a RetryPolicy, now: DateTime<Utc>) -> Self {
        Self {
            policy,
            started: now,
            retries: 0,
        }
    }

    /// Delay before the next attempt, or `None` when retries or the elapsed
    /// budget are used up.
    pub fn next_delay(&mut self, now: DateTime<Utc>) -> Option<Duration> {
        if self.retries >= self.policy.max_retries {
            return None;
        }

        let delay = self.policy.delay_for_attempt(self.retries);
        if let Some(budget) = self.policy.max_elapsed {
            if self.elapsed(now) + delay > budget {
                return None;
            }
        }

        self.retries += 1;
        Some(delay)
    }

    /// Attempts made so far (the initial try plus granted retries).
    #[must_use]
    pub const fn attempts(&self) -> usize {
        self.retries + 1
    }

    /// Time since tracking started.
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started).to_std().unwrap_or_default()
    }
}
