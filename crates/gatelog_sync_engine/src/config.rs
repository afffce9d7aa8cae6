//! Configuration for the sync engine.

use rand::Rng;
use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval of the periodic background trigger.
    pub sync_interval: Duration,
    /// Timeout applied by gateway adapters to each request.
    pub request_timeout: Duration,
    /// Backoff applied by the scheduler after failed background runs.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a new sync configuration with default values.
    pub fn new() -> Self {
        Self {
            sync_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }

    /// Sets the interval of the periodic trigger.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Backoff for background runs that failed with a retryable error.
///
/// The scheduler counts consecutive failures and brings the next run
/// forward to [`delay_for_attempt`](Self::delay_for_attempt) while
/// [`allows_retry`](Self::allows_retry) holds. Past that the plain sync
/// interval applies again.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Consecutive failures after which backoff stops, counting the first.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Growth factor per further failure.
    pub backoff_multiplier: f64,
    /// Adds up to 25% random jitter, so devices sharing an outage do not
    /// retry in lockstep.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a backoff stopping after `max_attempts` failures.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Never brings a run forward; failed runs wait for the next tick.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// Delay before the next run after `attempt` consecutive failures.
    ///
    /// Zero failures means no delay.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            // Add up to 25% jitter
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen::<f64>();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }

    /// Returns true if another attempt is allowed after `failures` failures.
    pub fn allows_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.sync_interval, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 4);
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_sync_interval(Duration::from_secs(5))
            .with_timeout(Duration::from_secs(60))
            .with_retry(RetryConfig::no_retry());

        assert_eq!(config.sync_interval, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(60));
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn retry_config_no_retry() {
        let config = RetryConfig::no_retry();
        assert!(config.allows_retry(0));
        assert!(!config.allows_retry(1));
    }

    #[test]
    fn retry_delay_calculation() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_multiplier(2.0);

        // First attempt has no delay
        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);

        // Subsequent attempts have exponential backoff
        let delay1 = config.delay_for_attempt(1);
        assert!(delay1 >= Duration::from_millis(100));
        assert!(delay1 <= Duration::from_millis(125));

        let delay2 = config.delay_for_attempt(2);
        assert!(delay2 >= Duration::from_millis(200));
    }

    #[test]
    fn retry_delay_without_jitter_is_exact() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_secs(2))
            .with_jitter(false);
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(8));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0);

        // Even with high multiplier, should not exceed max
        let delay = config.delay_for_attempt(5);
        assert!(delay <= Duration::from_millis(6250)); // 5s + 25% jitter
    }
}
