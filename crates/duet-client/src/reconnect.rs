//! Reconnect backoff owned by a single client connection.

use std::time::Duration;

/// Delay before the first retry. Each further attempt doubles it.
pub const BASE_DELAY: Duration = Duration::from_millis(2000);

/// Attempts allowed before giving up.
pub const MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectDecision {
    Retry(Duration),
    GiveUp,
}

/// Attempt counter for one connection. Never shared between connections;
/// reset after every successful connect.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    attempts: u32,
    base: Duration,
    max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(BASE_DELAY, MAX_ATTEMPTS)
    }
}

impl ReconnectPolicy {
    #[must_use]
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            attempts: 0,
            base,
            max_attempts,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Consume one attempt: `base * 2^n` for the n-th retry, or give up.
    pub fn next_delay(&mut self) -> ReconnectDecision {
        if self.attempts >= self.max_attempts {
            return ReconnectDecision::GiveUp;
        }

        let delay = self.base.saturating_mul(1u32 << self.attempts.min(31));
        self.attempts += 1;
        ReconnectDecision::Retry(delay)
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
