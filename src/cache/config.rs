//! Query cache configuration.
//!
//! Freshness, retention, retry and focus behaviour are all carried here so the
//! coordinator applies one policy uniformly to every key.

use std::time::Duration;

const DEFAULT_STALE_TIME_SECS: u64 = 5 * 60;
const DEFAULT_GC_TIME_SECS: u64 = 30 * 60;
const DEFAULT_QUERY_ATTEMPTS: u32 = 3;
const DEFAULT_MUTATION_ATTEMPTS: u32 = 1;
const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
const DEFAULT_BACKOFF_CAP_MS: u64 = 30_000;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Exponential backoff with a ceiling: `min(base * 2^attempt, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Never zero.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (zero based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Data younger than this is served without a network round trip.
    pub stale_time: Duration,
    /// Unobserved entries are evicted this long after their last access.
    pub gc_time: Duration,
    pub query_retry: RetryPolicy,
    pub mutation_retry: RetryPolicy,
    pub refetch_on_window_focus: bool,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let base = Duration::from_millis(DEFAULT_BACKOFF_BASE_MS);
        let cap = Duration::from_millis(DEFAULT_BACKOFF_CAP_MS);
        Self {
            stale_time: Duration::from_secs(DEFAULT_STALE_TIME_SECS),
            gc_time: Duration::from_secs(DEFAULT_GC_TIME_SECS),
            query_retry: RetryPolicy::new(DEFAULT_QUERY_ATTEMPTS, base, cap),
            mutation_retry: RetryPolicy::new(DEFAULT_MUTATION_ATTEMPTS, base, cap),
            refetch_on_window_focus: true,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        let base = settings.backoff_base;
        let cap = settings.backoff_cap;
        Self {
            stale_time: settings.stale_time,
            gc_time: settings.gc_time,
            query_retry: RetryPolicy::new(settings.query_attempts.get(), base, cap),
            mutation_retry: RetryPolicy::new(settings.mutation_attempts.get(), base, cap),
            refetch_on_window_focus: settings.refetch_on_focus,
            sweep_interval: settings.sweep_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.stale_time, Duration::from_secs(300));
        assert_eq!(config.gc_time, Duration::from_secs(1800));
        assert_eq!(config.query_retry.max_attempts, 3);
        assert_eq!(config.mutation_retry.max_attempts, 1);
        assert!(config.refetch_on_window_focus);
    }

    #[test]
    fn backoff_doubles_until_cap() {
        let policy = CacheConfig::default().query_retry;
        assert_eq!(policy.delay_for(0), Duration::from_millis(1_000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2_000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(16_000));
        assert_eq!(policy.delay_for(5), Duration::from_millis(30_000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(30_000));
    }

    #[test]
    fn zero_attempts_clamps_to_one() {
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_attempts, 1);
    }
}
