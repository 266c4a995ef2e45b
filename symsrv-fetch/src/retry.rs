//! Backoff advice for caller-driven retries.
//!
//! The symbol server never re-issues a request on its own. Callers that want
//! to try again (the CLI's `fetch --retries`) consult a [`RetryStrategy`] for
//! whether and when.

use std::time::Duration;

use symsrv_core::SymbolError;

/// Strategy for retrying failed fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStrategy {
    /// Total attempts allowed, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Whether each retry doubles the delay.
    pub exponential_backoff: bool,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryStrategy {
    /// Strategy allowing `max_attempts` attempts with exponential backoff.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_secs(1),
            exponential_backoff: true,
            max_delay: Duration::from_secs(60),
        }
    }

    /// A single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            exponential_backoff: false,
            max_delay: Duration::ZERO,
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Enables or disables exponential backoff.
    pub fn with_exponential_backoff(mut self, enabled: bool) -> Self {
        self.exponential_backoff = enabled;
        self
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = if self.exponential_backoff {
            let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
            self.base_delay.saturating_mul(factor)
        } else {
            self.base_delay
        };
        delay.min(self.max_delay)
    }

    /// Returns true if `attempt` attempts have been made, `error` was the
    /// last outcome, and another attempt is worthwhile.
    pub fn should_retry(&self, attempt: u32, error: &SymbolError) -> bool {
        attempt < self.max_attempts && error.is_retryable()
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new(3)
    }
}
