//! Linear-backoff retry policy for the change-stream client.
//!
//! Failure n (1-based) schedules the next attempt after `base_delay * n`;
//! once `max_retries` failures have been consumed the subscription is
//! declared failed and only an explicit reconnect restarts the cycle.
//! Successful event delivery resets the counter, treating live traffic as
//! proof of health.

use std::time::Duration;

use insight_core::SyncConfig;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Base delay; attempt n waits `base_delay * n`.
    pub base_delay: Duration,

    /// Maximum automatic attempts before giving up.
    pub max_retries: u32,
}

impl RetryPolicy {
    /// Build the policy from the sync configuration.
    #[must_use]
    pub const fn from_config(config: &SyncConfig) -> Self {
        Self {
            base_delay: config.base_delay,
            max_retries: config.max_retries,
        }
    }

    /// Delay before attempt `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Mutable retry state for one subscription.
#[derive(Debug)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
}

impl RetryState {
    /// Create fresh retry state.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Consume one failure.
    ///
    /// Returns the delay to wait before the next attempt, or `None` when the
    /// retry budget is exhausted and the caller must stop retrying.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_retries {
            return None;
        }
        self.attempt += 1;
        Some(self.policy.delay_for_attempt(self.attempt))
    }

    /// Reset the counter after proof of health (a delivered event) or an
    /// explicit reconnect request.
    pub const fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of failures consumed since the last reset.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// The policy in effect.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}
