//! Error types used throughout the engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a failed provider call.
///
/// Every adapter translates its provider's HTTP failures into one of these
/// kinds so the orchestrator can apply a single retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    RateLimited,
    Unauthorized,
    NotFound,
    Transient,
    Unknown,
}

crate::impl_domain_status_conversions!(ProviderErrorKind {
    RateLimited => "rate_limited",
    Unauthorized => "unauthorized",
    NotFound => "not_found",
    Transient => "transient",
    Unknown => "unknown",
});

/// A provider call failure with its retry hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    /// Seconds the provider asked us to wait (`Retry-After`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), retry_after_secs: None }
    }

    #[must_use]
    pub fn with_retry_after(mut self, secs: Option<u64>) -> Self {
        self.retry_after_secs = secs;
        self
    }

    /// Rate limits and transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ProviderErrorKind::RateLimited | ProviderErrorKind::Transient)
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Main error type for StudioSync
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum StudioSyncError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(String),

    /// Revoked or invalid credentials. Requires re-authorization.
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Provider error: {0}")]
    Provider(ProviderError),

    /// Malformed provider payload. The event is skipped, the run continues.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A mapping result could not be persisted.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// A bidirectional conflict awaits a human decision.
    #[error("Conflict awaiting review: {0}")]
    ConflictUnresolved(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StudioSyncError {
    /// Shorthand for a provider error of the given kind.
    pub fn provider(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self::Provider(ProviderError::new(kind, message))
    }

    /// True for failures a later attempt may get past.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Provider(err) => err.is_retryable(),
            Self::Network(_) => true,
            _ => false,
        }
    }

    /// True when the provider rejected the access token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Provider(err) if err.kind == ProviderErrorKind::Unauthorized)
    }

    /// Provider-supplied wait hint, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::Provider(err) => err.retry_after_secs,
            _ => None,
        }
    }
}

impl From<ProviderError> for StudioSyncError {
    fn from(value: ProviderError) -> Self {
        Self::Provider(value)
    }
}

/// Result type alias for StudioSync operations
pub type Result<T> = std::result::Result<T, StudioSyncError>;
