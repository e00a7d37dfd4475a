//! Retry executor with pluggable policies, backoff and jitter
//!
//! The executor owns the attempt loop. A [`RetryPolicy`] classifies each error
//! and may override the computed delay (for example with a provider's
//! `Retry-After` hint). On the last attempt the error is handed back intact so
//! callers can still inspect it.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors returned by the retry executor
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed with a retryable error; `source` is the last one.
    #[error("All {attempts} retry attempts exhausted: {source:?}")]
    Exhausted { attempts: u32, source: E },

    /// The policy refused to retry this error.
    #[error("Operation failed with non-retryable error: {source:?}")]
    NonRetryable { attempts: u32, source: E },

    #[error("Invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl<E> RetryError<E> {
    /// The operation's own error, if the executor got far enough to see one.
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Exhausted { source, .. } | Self::NonRetryable { source, .. } => Some(source),
            Self::InvalidConfiguration { .. } => None,
        }
    }

    /// Attempts made before giving up.
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::NonRetryable { attempts, .. } => *attempts,
            Self::InvalidConfiguration { .. } => 0,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Classifies errors for the executor
pub trait RetryPolicy<E> {
    /// Decide what to do after `error` on the zero-based `attempt`.
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the configured backoff
    Retry,
    /// Retry after the given delay instead of the backoff
    RetryAfter(Duration),
    /// Give up
    Stop,
}

/// Delay schedule between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    Fixed(Duration),
    /// `initial_delay * base^attempt`, capped at `max_delay`
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// Delay before the retry that follows the zero-based `attempt`.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                #[allow(clippy::cast_precision_loss)]
                let millis = initial_delay.as_millis() as f64 * base.powi(exponent);
                #[allow(clippy::cast_precision_loss)]
                let capped = millis.min(max_delay.as_millis() as f64);
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                Duration::from_millis(capped.max(0.0) as u64)
            }
        }
    }
}

/// Randomization applied on top of the backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Jitter {
    None,
    /// Uniform in `[0, delay]`
    Full,
    /// Uniform in `[delay / 2, delay]`
    Equal,
}

impl Jitter {
    pub fn apply(self, delay: Duration) -> Duration {
        let millis = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        match self {
            Self::None => delay,
            Self::Full => Duration::from_millis(random_up_to(millis)),
            Self::Equal => {
                let half = millis / 2;
                Duration::from_millis(half + random_up_to(millis - half))
            }
        }
    }
}

fn random_up_to(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max)
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(100),
                base: 2.0,
                max_delay: Duration::from_secs(30),
            },
            jitter: Jitter::Equal,
        }
    }
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// Check the configuration before use.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` for zero attempts or a non-positive
    /// exponential base.
    pub fn validate(&self) -> Result<(), RetryError<()>> {
        if self.max_attempts == 0 {
            return Err(RetryError::InvalidConfiguration {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }
        if let BackoffStrategy::Exponential { base, .. } = &self.backoff {
            if *base <= 0.0 {
                return Err(RetryError::InvalidConfiguration {
                    message: "exponential base must be greater than 0".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Builder for [`RetryConfig`]
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    #[must_use]
    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    #[must_use]
    pub const fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    #[must_use]
    pub const fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base, max_delay };
        self
    }

    #[must_use]
    pub const fn jitter(mut self, jitter: Jitter) -> Self {
        self.config.jitter = jitter;
        self
    }

    /// # Errors
    /// See [`RetryConfig::validate`].
    pub fn build(self) -> Result<RetryConfig, RetryError<()>> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Runs an async operation until it succeeds, the policy stops it, or the
/// attempts run out.
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    pub const fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute `operation` with retries.
    ///
    /// # Errors
    /// `Exhausted` with the last error after `max_attempts`, or
    /// `NonRetryable` as soon as the policy says stop.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0_u32;

        loop {
            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "operation succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let delay = match self.policy.should_retry(&error, attempt) {
                RetryDecision::Stop => {
                    debug!(attempt = attempt + 1, error = ?error, "error is not retryable");
                    return Err(RetryError::NonRetryable { attempts: attempt + 1, source: error });
                }
                _ if attempt + 1 >= max_attempts => {
                    warn!(attempts = attempt + 1, error = ?error, "retry attempts exhausted");
                    return Err(RetryError::Exhausted { attempts: attempt + 1, source: error });
                }
                RetryDecision::Retry => {
                    self.config.jitter.apply(self.config.backoff.calculate_delay(attempt))
                }
                RetryDecision::RetryAfter(delay) => delay,
            };

            warn!(attempt = attempt + 1, delay_ms = delay.as_millis(), error = ?error, "retrying operation");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Retries only the "busy" error.
    struct BusyOnly;

    impl RetryPolicy<&str> for BusyOnly {
        fn should_retry(&self, error: &&str, _attempt: u32) -> RetryDecision {
            if *error == "busy" {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig::builder()
            .max_attempts(max_attempts)
            .fixed_backoff(Duration::from_millis(1))
            .jitter(Jitter::None)
            .build()
            .unwrap()
    }

    /// Validates `BackoffStrategy::Exponential` growth and cap.
    ///
    /// Assertions:
    /// - Delay doubles per attempt from the initial delay.
    /// - Delay never exceeds `max_delay`.
    #[test]
    fn test_exponential_backoff_caps() {
        let strategy = BackoffStrategy::Exponential {
            initial_delay: Duration::from_millis(100),
            base: 2.0,
            max_delay: Duration::from_secs(1),
        };
        assert_eq!(strategy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(strategy.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(strategy.calculate_delay(10), Duration::from_secs(1));
        assert_eq!(strategy.calculate_delay(u32::MAX), Duration::from_secs(1));
    }

    /// Validates the jitter bounds scenario.
    ///
    /// Assertions:
    /// - Equal jitter stays within `[delay/2, delay]`.
    /// - Full jitter never exceeds the delay.
    #[test]
    fn test_jitter_bounds() {
        let delay = Duration::from_millis(1000);
        for _ in 0..50 {
            let equal = Jitter::Equal.apply(delay);
            assert!(equal >= Duration::from_millis(500) && equal <= delay);
            assert!(Jitter::Full.apply(delay) <= delay);
        }
        assert_eq!(Jitter::None.apply(delay), delay);
    }

    /// Validates that a zero-attempt configuration is rejected.
    #[test]
    fn test_config_validation() {
        assert!(RetryConfig::builder().max_attempts(0).build().is_err());
        assert!(RetryConfig::builder()
            .exponential_backoff(Duration::from_millis(1), 0.0, Duration::from_secs(1))
            .build()
            .is_err());
    }

    /// Validates the transient-then-success scenario.
    ///
    /// Assertions:
    /// - The operation runs three times and returns its value.
    #[tokio::test]
    async fn test_succeeds_after_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor = RetryExecutor::new(fast_config(5), AlwaysRetry);

        let counter = Arc::clone(&calls);
        let result: RetryResult<u32, &str> = executor
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n < 2 {
                        Err("busy")
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    /// Validates the exhausted scenario.
    ///
    /// Assertions:
    /// - `Exhausted` carries the last error and the attempt count.
    #[tokio::test]
    async fn test_exhausted_keeps_last_error() {
        let executor = RetryExecutor::new(fast_config(3), AlwaysRetry);
        let calls = AtomicU32::new(0);

        let result: RetryResult<(), String> = executor
            .execute(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("failure {n}")) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts(), 3);
        assert_eq!(err.into_source().as_deref(), Some("failure 2"));
    }

    /// Validates the non-retryable scenario.
    ///
    /// Assertions:
    /// - The policy stops after the first call.
    #[tokio::test]
    async fn test_predicate_stops_immediately() {
        let executor = RetryExecutor::new(fast_config(5), BusyOnly);
        let calls = AtomicU32::new(0);

        let result: RetryResult<(), &str> = executor
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("forbidden") }
            })
            .await;

        assert!(matches!(result, Err(RetryError::NonRetryable { attempts: 1, source: "forbidden" })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    struct HintPolicy;

    impl RetryPolicy<u64> for HintPolicy {
        fn should_retry(&self, hint: &u64, _attempt: u32) -> RetryDecision {
            RetryDecision::RetryAfter(Duration::from_millis(*hint))
        }
    }

    /// Validates that `RetryAfter` overrides the backoff.
    ///
    /// Assertions:
    /// - The wait matches the hint, not the 30s backoff.
    #[tokio::test]
    async fn test_retry_after_overrides_backoff() {
        let config = RetryConfig::builder()
            .max_attempts(2)
            .fixed_backoff(Duration::from_secs(30))
            .jitter(Jitter::None)
            .build()
            .unwrap();
        let executor = RetryExecutor::new(config, HintPolicy);
        let calls = AtomicU32::new(0);
        let started = std::time::Instant::now();

        let result: RetryResult<(), u64> = executor
            .execute(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(20) }
            })
            .await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 2, .. })));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(20) && elapsed < Duration::from_secs(30));
    }
}
