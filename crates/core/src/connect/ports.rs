//! Port interfaces for the OAuth connect flow

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use studiosync_domain::{CalendarProvider, Result};

/// An authorization started by `begin_authorization`, awaiting its callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub state: String,
    pub studio_id: String,
    pub provider: CalendarProvider,
    pub redirect_uri: String,
    /// PKCE verifier, for providers that use PKCE.
    #[serde(skip_serializing)]
    pub code_verifier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Trait for persisting OAuth `state` values between redirect and callback
#[async_trait]
pub trait OAuthStateStore: Send + Sync {
    async fn save(&self, pending: &PendingAuthorization) -> Result<()>;

    /// Remove and return the entry for `state`. A state can be taken once.
    async fn take(&self, state: &str) -> Result<Option<PendingAuthorization>>;

    /// Delete entries that expired before `now`; returns how many.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}
