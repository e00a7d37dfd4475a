//! Port interfaces for credential and integration persistence

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use studiosync_common::{OAuthConfig, TokenSet};
use studiosync_domain::{
    CalendarIntegration, CalendarProvider, IntegrationCredentials, Result, SyncStatus,
};

/// Status columns written when a run releases its lock.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStatusUpdate {
    pub sync_status: SyncStatus,
    /// Only advanced on success; `None` keeps the stored value.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// `None` clears the stored message.
    pub error_message: Option<String>,
}

impl RunStatusUpdate {
    pub fn succeeded(at: DateTime<Utc>) -> Self {
        Self { sync_status: SyncStatus::Active, last_sync_at: Some(at), error_message: None }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self { sync_status: SyncStatus::Error, last_sync_at: None, error_message: Some(message.into()) }
    }
}

/// Trait for persisting calendar integrations
#[async_trait]
pub trait IntegrationRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<CalendarIntegration>>;

    /// The (studio, provider) pair is unique.
    async fn find_by_studio_provider(
        &self,
        studio_id: &str,
        provider: CalendarProvider,
    ) -> Result<Option<CalendarIntegration>>;

    async fn list_by_studio(&self, studio_id: &str) -> Result<Vec<CalendarIntegration>>;

    /// Integrations with `sync_enabled = true`.
    async fn list_enabled(&self) -> Result<Vec<CalendarIntegration>>;

    /// Insert or replace by id.
    async fn upsert(&self, integration: &CalendarIntegration) -> Result<()>;

    /// Overwrite the credential columns only.
    async fn save_credentials(&self, id: &str, credentials: &IntegrationCredentials) -> Result<()>;

    /// Store a fresh grant for an existing integration, re-enable it and
    /// clear its failure state. Run lock, sync timestamps and settings stay
    /// as they are; a `None` account id keeps the stored one.
    async fn reconnect(
        &self,
        id: &str,
        credentials: &IntegrationCredentials,
        provider_account_id: Option<&str>,
    ) -> Result<()>;

    /// Terminal auth failure: `status` (`error` for a rejected grant,
    /// `expired` for a lapsed token), message and `requires_reauth`.
    async fn mark_reauth_required(&self, id: &str, status: SyncStatus, reason: &str) -> Result<()>;

    /// Atomically claim the run lock.
    ///
    /// Succeeds when `running_since` is empty or older than `stale_before`,
    /// setting it to `now`. Returns false when another run holds it.
    async fn try_begin_run(
        &self,
        id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> Result<bool>;

    /// Release the run lock and write the run's status.
    async fn finish_run(&self, id: &str, update: &RunStatusUpdate) -> Result<()>;

    /// Clear credentials and set `sync_enabled = false`.
    async fn disable(&self, id: &str) -> Result<()>;
}

/// Trait for the OAuth token endpoint of each provider
#[async_trait]
pub trait OAuthTokenClient: Send + Sync {
    /// Authorization-code grant.
    async fn exchange_code(
        &self,
        provider: CalendarProvider,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenSet>;

    /// Refresh-token grant.
    ///
    /// Returns `Auth` when the grant is invalid or revoked; network and 5xx
    /// failures come back as transient provider errors.
    async fn refresh(&self, provider: CalendarProvider, refresh_token: &str) -> Result<TokenSet>;

    async fn revoke(&self, provider: CalendarProvider, token: &str) -> Result<()>;

    /// Endpoints and client registration used to build the authorize URL.
    fn authorization_config(&self, provider: CalendarProvider) -> Result<OAuthConfig>;
}
