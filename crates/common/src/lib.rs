//! Common building blocks shared across StudioSync crates.
//!
//! # Feature Tiers
//!
//! - `foundation`: OAuth token types and PKCE helpers (no async, no tracing)
//! - `runtime`: async retry executor with backoff and jitter

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod auth;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

#[cfg(feature = "foundation")]
pub use auth::{OAuthConfig, OAuthError, PkceChallenge, TokenResponse, TokenSet};
#[cfg(feature = "runtime")]
pub use resilience::{
    BackoffStrategy, Jitter, RetryConfig, RetryDecision, RetryError, RetryExecutor, RetryPolicy,
    RetryResult,
};
