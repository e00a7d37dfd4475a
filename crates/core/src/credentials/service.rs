//! Credential store - token lifecycle for connected integrations

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use studiosync_common::TokenSet;
use studiosync_domain::constants::REFRESH_MARGIN_SECS;
use studiosync_domain::{
    CalendarIntegration, CalendarProvider, IntegrationCredentials, Result, StudioSyncError,
    SyncStatus,
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::ports::{IntegrationRepository, OAuthTokenClient};

/// Bearer token handed to provider adapters. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Credential columns for a freshly issued token set.
///
/// Providers that rotate refresh tokens send a new one; the others omit it
/// and the previous refresh token stays valid.
pub fn credentials_from_tokens(
    tokens: &TokenSet,
    previous_refresh_token: Option<&str>,
) -> IntegrationCredentials {
    IntegrationCredentials {
        access_token: Some(tokens.access_token.clone()),
        refresh_token: tokens
            .refresh_token
            .clone()
            .or_else(|| previous_refresh_token.map(str::to_string)),
        expires_at: tokens.expires_at,
        token_type: Some(tokens.token_type.clone()),
        scope: tokens.scope.clone(),
    }
}

/// Owns token refresh for every integration.
///
/// Refreshes are serialized per integration: concurrent callers wait on the
/// same lock and re-read the stored credentials, so a burst of requests
/// causes at most one token endpoint call.
pub struct CredentialStore {
    repository: Arc<dyn IntegrationRepository>,
    client: Arc<dyn OAuthTokenClient>,
    margin_secs: i64,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CredentialStore {
    pub fn new(repository: Arc<dyn IntegrationRepository>, client: Arc<dyn OAuthTokenClient>) -> Self {
        Self { repository, client, margin_secs: REFRESH_MARGIN_SECS, locks: DashMap::new() }
    }

    /// Refresh tokens expiring within `secs` (default five minutes).
    #[must_use]
    pub fn with_refresh_margin(mut self, secs: i64) -> Self {
        self.margin_secs = secs;
        self
    }

    fn lock_for(&self, integration_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(integration_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn reload(&self, integration_id: &str) -> Result<CalendarIntegration> {
        self.repository
            .get(integration_id)
            .await?
            .ok_or_else(|| StudioSyncError::NotFound(format!("integration {integration_id}")))
    }

    /// A usable access token, refreshing first when it is about to expire.
    ///
    /// Tokens without a refresh token are returned unchanged until they
    /// actually expire; then the integration moves to `expired` and needs
    /// re-authorization.
    #[instrument(skip(self, integration), fields(integration_id = %integration.id))]
    pub async fn get_valid_token(&self, integration: &CalendarIntegration) -> Result<AccessToken> {
        if integration.requires_reauth {
            return Err(reauth_error(integration));
        }
        if let Some(token) = &integration.credentials.access_token {
            if !integration.credentials.expires_within(self.margin_secs, Utc::now()) {
                return Ok(AccessToken::new(token.clone()));
            }
        }

        let lock = self.lock_for(&integration.id);
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited.
        let current = self.reload(&integration.id).await?;
        if current.requires_reauth {
            return Err(reauth_error(&current));
        }
        let Some(access_token) = current.credentials.access_token.clone() else {
            return Err(StudioSyncError::Auth(format!(
                "integration {} has no access token",
                current.id
            )));
        };
        if !current.credentials.expires_within(self.margin_secs, Utc::now()) {
            return Ok(AccessToken::new(access_token));
        }
        if current.credentials.refresh_token.is_none() {
            if current.credentials.expires_within(0, Utc::now()) {
                let reason = format!("{} access token expired and no refresh token is stored", current.provider);
                warn!(provider = %current.provider, "access token expired; re-authorization required");
                self.repository.mark_reauth_required(&current.id, SyncStatus::Expired, &reason).await?;
                return Err(StudioSyncError::Auth(reason));
            }
            debug!("token expiring but no refresh token; using it as-is");
            return Ok(AccessToken::new(access_token));
        }

        let tokens = self.refresh_locked(&current).await?;
        Ok(AccessToken::new(tokens.access_token))
    }

    /// Force a refresh regardless of the stored expiry.
    ///
    /// # Errors
    /// `Auth` for an invalid or revoked grant (the integration is marked as
    /// requiring re-authorization); transient provider errors otherwise.
    #[instrument(skip(self, integration), fields(integration_id = %integration.id))]
    pub async fn refresh(&self, integration: &CalendarIntegration) -> Result<TokenSet> {
        let lock = self.lock_for(&integration.id);
        let _guard = lock.lock().await;
        let current = self.reload(&integration.id).await?;
        if current.requires_reauth {
            return Err(reauth_error(&current));
        }
        self.refresh_locked(&current).await
    }

    /// Recover from a 401 on `rejected`.
    ///
    /// When the stored token already differs from the rejected one, another
    /// run refreshed it and that token is returned without a new grant.
    #[instrument(skip(self, integration, rejected), fields(integration_id = %integration.id))]
    pub async fn refresh_after_unauthorized(
        &self,
        integration: &CalendarIntegration,
        rejected: &AccessToken,
    ) -> Result<AccessToken> {
        let lock = self.lock_for(&integration.id);
        let _guard = lock.lock().await;
        let current = self.reload(&integration.id).await?;
        if current.requires_reauth {
            return Err(reauth_error(&current));
        }

        if let Some(stored) = &current.credentials.access_token {
            if stored != rejected.secret()
                && !current.credentials.expires_within(self.margin_secs, Utc::now())
            {
                return Ok(AccessToken::new(stored.clone()));
            }
        }
        if current.credentials.refresh_token.is_none() {
            return Err(StudioSyncError::Auth(format!(
                "{} rejected the access token and no refresh token is stored",
                current.provider
            )));
        }

        let tokens = self.refresh_locked(&current).await?;
        Ok(AccessToken::new(tokens.access_token))
    }

    /// Caller must hold the integration's lock.
    async fn refresh_locked(&self, current: &CalendarIntegration) -> Result<TokenSet> {
        let Some(refresh_token) = current.credentials.refresh_token.as_deref() else {
            return Err(StudioSyncError::Auth(format!(
                "integration {} has no refresh token",
                current.id
            )));
        };

        match self.client.refresh(current.provider, refresh_token).await {
            Ok(tokens) => {
                let credentials = credentials_from_tokens(&tokens, Some(refresh_token));
                self.repository.save_credentials(&current.id, &credentials).await?;
                info!(
                    provider = %current.provider,
                    expires_at = ?credentials.expires_at,
                    "access token refreshed"
                );
                Ok(TokenSet { refresh_token: credentials.refresh_token, ..tokens })
            }
            Err(StudioSyncError::Auth(reason)) => {
                warn!(provider = %current.provider, reason = %reason, "refresh grant rejected; re-authorization required");
                self.repository.mark_reauth_required(&current.id, SyncStatus::Error, &reason).await?;
                Err(StudioSyncError::Auth(reason))
            }
            Err(err) => {
                warn!(provider = %current.provider, error = %err, "token refresh failed");
                Err(err)
            }
        }
    }

    /// Authorization-code grant for a new connection.
    #[instrument(skip(self, code, code_verifier))]
    pub async fn exchange_code(
        &self,
        provider: CalendarProvider,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenSet> {
        let tokens = self.client.exchange_code(provider, code, redirect_uri, code_verifier).await?;
        info!(provider = %provider, has_refresh_token = tokens.refresh_token.is_some(), "authorization code exchanged");
        Ok(tokens)
    }

    /// Revoke at the provider (best effort), then clear credentials and
    /// disable the integration.
    #[instrument(skip(self, integration), fields(integration_id = %integration.id))]
    pub async fn revoke(&self, integration: &CalendarIntegration) -> Result<()> {
        let token = integration
            .credentials
            .refresh_token
            .as_deref()
            .or(integration.credentials.access_token.as_deref());
        if let Some(token) = token {
            if let Err(err) = self.client.revoke(integration.provider, token).await {
                warn!(provider = %integration.provider, error = %err, "provider revocation failed; disabling anyway");
            }
        }

        self.repository.disable(&integration.id).await?;
        self.locks.remove(&integration.id);
        info!(provider = %integration.provider, "integration disconnected");
        Ok(())
    }
}

fn reauth_error(integration: &CalendarIntegration) -> StudioSyncError {
    StudioSyncError::Auth(
        integration
            .error_message
            .clone()
            .unwrap_or_else(|| format!("integration {} requires re-authorization", integration.id)),
    )
}
