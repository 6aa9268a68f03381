//! Bounded retry schedule for upstream calls.

use std::time::Duration;

use crate::config::ProviderConfig;

/// What a single attempt produced, as far as retrying is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// The request never got an HTTP response (connect, timeout, ...).
    Transport(String),
    /// The server answered with this status.
    Status(u16),
}

/// Transient statuses: rate limiting and server-side failures.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Whether an attempt outcome should be retried.
pub fn is_retryable(outcome: &AttemptOutcome) -> bool {
    match outcome {
        AttemptOutcome::Transport(_) => true,
        AttemptOutcome::Status(status) => is_retryable_status(*status),
    }
}

/// Exponential backoff: `base × 2^(attempt−1)`, capped at `max_delay`,
/// for at most `max_attempts` attempts in total.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(8000),
        }
    }
}

impl From<&ProviderConfig> for RetryPolicy {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// No waiting between attempts; for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1 = first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Whether another attempt may follow attempt number `attempt` (1-based).
    pub fn should_retry(&self, attempt: u32, outcome: &AttemptOutcome) -> bool {
        attempt < self.max_attempts && is_retryable(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(599));
        assert!(!is_retryable_status(200));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(403));
        assert!(!is_retryable_status(404));
    }

    #[test]
    fn test_transport_errors_retry() {
        assert!(is_retryable(&AttemptOutcome::Transport("timed out".into())));
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_for(10), Duration::from_millis(8000));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(8000));
    }

    #[test]
    fn test_from_provider_config() {
        let config = ProviderConfig {
            max_attempts: 5,
            base_backoff_ms: 250,
            max_backoff_ms: 1000,
            ..ProviderConfig::default()
        };
        let policy = RetryPolicy::from(&config);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1000));
    }

    #[test]
    fn test_attempts_bounded() {
        let policy = RetryPolicy::immediate(3);
        let busy = AttemptOutcome::Status(503);
        assert!(policy.should_retry(1, &busy));
        assert!(policy.should_retry(2, &busy));
        assert!(!policy.should_retry(3, &busy));
        assert!(!policy.should_retry(1, &AttemptOutcome::Status(404)));
    }
}
