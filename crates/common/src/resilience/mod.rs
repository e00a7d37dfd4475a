//! Resilience patterns for provider calls
//!
//! Only retry lives here. Policies are generic over the error type so the
//! core crate can plug in its provider error taxonomy.

pub mod retry;

pub use retry::{
    BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryPolicy, RetryResult,
};
