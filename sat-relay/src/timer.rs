//! Retry budget and backoff timing for publishes.
//!
//! Every publish (header, chunk, telemetry) gets an independent attempt
//! budget.  Between failed attempts the caller sleeps for the current
//! [`Backoff`] delay, which doubles after each failure up to a cap:
//!
//! ```text
//!  attempt 1 ✗ ─ 2s ─ attempt 2 ✗ ─ 4s ─ attempt 3 ✗ ─ 8s ─ attempt 4 ✗ ─ 8s ─ …
//! ```
//!
//! No sleep follows the final attempt; once the budget is spent the publish
//! fails.

use std::time::Duration;

/// Attempt budget and delay bounds for one publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per message, including the first (treated as at least 1).
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Upper bound for the doubling delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Same delays, different attempt budget.
    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Budget with the zero case clamped to one attempt.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Capped doubling delay for one message's retries.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    current: Duration,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            current: policy.base_delay.min(policy.max_delay),
            policy,
        }
    }

    /// Delay to wait before the next attempt.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Double the delay, capped at `max_delay`.
    pub fn back_off(&mut self) {
        self.current = (self.current * 2).min(self.policy.max_delay);
    }
}
