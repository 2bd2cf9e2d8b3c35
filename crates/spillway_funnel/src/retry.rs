//! Retry policy with monotonically increasing backoff.
//!
//! The backoff grows by a fixed increment per attempt up to a cap. The
//! final failure is propagated unchanged; attempt counts are not part of
//! any observable contract.

use std::time::Duration;

/// Default backoff base delay
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);
/// Default backoff increment per attempt
pub const DEFAULT_INCREMENT: Duration = Duration::from_millis(100);
/// Default backoff cap
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Retry policy for a funnel-wrapped operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum additional attempts after the first
    pub max_retries: usize,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Added to the delay on each subsequent retry
    pub increment: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with the given number of additional attempts
    #[must_use]
    pub const fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            base_delay: DEFAULT_BASE_DELAY,
            increment: DEFAULT_INCREMENT,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    /// A policy that never retries
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0)
    }

    /// Set the base delay
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the per-attempt increment
    #[must_use]
    pub const fn with_increment(mut self, increment: Duration) -> Self {
        self.increment = increment;
        self
    }

    /// Set the delay cap
    #[must_use]
    pub const fn with_max_delay(mut self, max: Duration) -> Self {
        self.max_delay = max;
        self
    }

    /// Total attempts including the first
    #[must_use]
    pub const fn attempts(&self) -> usize {
        self.max_retries + 1
    }

    /// Backoff delay before retry number `attempt` (zero-based)
    #[must_use]
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let delay = self.base_delay + self.increment * attempt as u32;
        delay.min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}
