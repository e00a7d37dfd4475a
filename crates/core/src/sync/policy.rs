//! Retry policy for provider calls

use std::time::Duration;

use studiosync_common::{BackoffStrategy, Jitter, RetryConfig, RetryDecision, RetryPolicy};
use studiosync_domain::{StudioSyncError, SyncConfig};

/// Retries rate limits, transient provider failures and network errors.
///
/// A `Retry-After` hint replaces the computed backoff, capped at
/// `max_delay`. Everything else stops immediately.
#[derive(Debug, Clone, Copy)]
pub struct ProviderRetryPolicy {
    max_delay: Duration,
}

impl ProviderRetryPolicy {
    pub const fn new(max_delay: Duration) -> Self {
        Self { max_delay }
    }
}

impl RetryPolicy<StudioSyncError> for ProviderRetryPolicy {
    fn should_retry(&self, error: &StudioSyncError, _attempt: u32) -> RetryDecision {
        if !error.is_transient() {
            return RetryDecision::Stop;
        }
        match error.retry_after_secs() {
            Some(secs) => RetryDecision::RetryAfter(Duration::from_secs(secs).min(self.max_delay)),
            None => RetryDecision::Retry,
        }
    }
}

/// Exponential backoff with equal jitter from the sync section.
pub fn retry_config(sync: &SyncConfig) -> RetryConfig {
    RetryConfig {
        max_attempts: sync.max_attempts.max(1),
        backoff: BackoffStrategy::Exponential {
            initial_delay: Duration::from_millis(sync.base_delay_ms),
            base: 2.0,
            max_delay: Duration::from_millis(sync.max_delay_ms),
        },
        jitter: Jitter::Equal,
    }
}

#[cfg(test)]
mod tests {
    use studiosync_domain::{ProviderError, ProviderErrorKind};

    use super::*;

    #[test]
    fn honours_retry_after_with_cap() {
        let policy = ProviderRetryPolicy::new(Duration::from_secs(10));
        let limited = StudioSyncError::Provider(
            ProviderError::new(ProviderErrorKind::RateLimited, "429").with_retry_after(Some(3)),
        );
        assert_eq!(policy.should_retry(&limited, 0), RetryDecision::RetryAfter(Duration::from_secs(3)));

        let long = StudioSyncError::Provider(
            ProviderError::new(ProviderErrorKind::RateLimited, "429").with_retry_after(Some(600)),
        );
        assert_eq!(policy.should_retry(&long, 0), RetryDecision::RetryAfter(Duration::from_secs(10)));
    }

    #[test]
    fn only_transient_errors_retry() {
        let policy = ProviderRetryPolicy::new(Duration::from_secs(10));
        let transient = StudioSyncError::provider(ProviderErrorKind::Transient, "503");
        let unauthorized = StudioSyncError::provider(ProviderErrorKind::Unauthorized, "401");

        assert_eq!(policy.should_retry(&transient, 1), RetryDecision::Retry);
        assert_eq!(policy.should_retry(&unauthorized, 0), RetryDecision::Stop);
        assert_eq!(policy.should_retry(&StudioSyncError::Validation("x".into()), 0), RetryDecision::Stop);
    }

    #[test]
    fn config_from_sync_section() {
        let config = retry_config(&SyncConfig::default());
        assert_eq!(config.max_attempts, SyncConfig::default().max_attempts);
        assert_eq!(config.jitter, Jitter::Equal);
    }
}
