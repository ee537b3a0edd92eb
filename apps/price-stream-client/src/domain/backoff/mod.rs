//! Backoff Policy
//!
//! Capped exponential backoff with additive jitter. One policy type serves
//! both client call sites, parameterized per site:
//!
//! - stream reconnect: `min(1000·2^n, 10000) + random(0, 1000)` ms, 5 retries
//! - polling: 30 s, widened to 60 s after the engine rate-limits us

use std::time::Duration;

use rand::Rng;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound of the exponential part.
    pub max_delay: Duration,
    /// Upper bound of the uniform jitter added on top.
    pub max_jitter: Duration,
    /// Retries allowed per episode (0 = unlimited).
    pub max_attempts: u32,
}

impl BackoffConfig {
    /// Stream reconnect schedule.
    #[must_use]
    pub const fn reconnect() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10_000),
            max_jitter: Duration::from_millis(1000),
            max_attempts: 5,
        }
    }

    /// Polling schedule: level 0 is the normal interval, level 1 the
    /// rate-limited one.
    #[must_use]
    pub const fn polling() -> Self {
        Self {
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(60),
            max_jitter: Duration::ZERO,
            max_attempts: 0,
        }
    }

    /// The exponential part for retry `attempt` (0-based), before jitter.
    #[must_use]
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Worst case delay for any attempt.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.max_delay + self.max_jitter
    }

    /// Polling interval, widened after a rate-limit response.
    #[must_use]
    pub fn poll_interval(&self, rate_limited: bool) -> Duration {
        self.base_delay_for(u32::from(rate_limited))
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::reconnect()
    }
}

/// Stateful retry counter over a [`BackoffConfig`].
#[derive(Debug)]
pub struct BackoffPolicy {
    config: BackoffConfig,
    attempt_count: u32,
}

impl BackoffPolicy {
    /// Create a policy with no attempts made.
    #[must_use]
    pub const fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            attempt_count: 0,
        }
    }

    /// The delay before the next retry, or `None` once retries are exhausted.
    #[must_use]
    pub fn next_delay(&mut self) -> Option<Duration> {
        if !self.should_retry() {
            return None;
        }

        let delay = self.config.base_delay_for(self.attempt_count);
        self.attempt_count += 1;

        Some(delay + self.jitter())
    }

    /// Reset after a successful connection.
    pub const fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Retries made in the current episode.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Whether another retry is allowed.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        self.config.max_attempts == 0 || self.attempt_count < self.config.max_attempts
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &BackoffConfig {
        &self.config
    }

    fn jitter(&self) -> Duration {
        let max = u64::try_from(self.config.max_jitter.as_millis()).unwrap_or(u64::MAX);
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max))
    }
}
