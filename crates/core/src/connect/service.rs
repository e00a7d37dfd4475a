//! OAuth connect flow - authorization start, callback and disconnect

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use studiosync_common::auth::validate_state;
use studiosync_common::PkceChallenge;
use studiosync_domain::constants::OAUTH_STATE_TTL_SECS;
use studiosync_domain::{
    CalendarIntegration, CalendarProvider, ProviderAccount, Result, StudioSyncError,
};
use tracing::{info, instrument, warn};

use super::ports::{OAuthStateStore, PendingAuthorization};
use crate::credentials::ports::{IntegrationRepository, OAuthTokenClient};
use crate::credentials::{credentials_from_tokens, AccessToken, CredentialStore};
use crate::providers::ProviderRegistry;

/// Where to send the studio owner, and the state the callback must echo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Query parameters of the provider's redirect back to us.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuthorizationCallback {
    #[serde(skip)]
    pub provider: Option<CalendarProvider>,
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

pub struct AuthorizationService {
    credentials: Arc<CredentialStore>,
    client: Arc<dyn OAuthTokenClient>,
    states: Arc<dyn OAuthStateStore>,
    integrations: Arc<dyn IntegrationRepository>,
    registry: ProviderRegistry,
    state_ttl: chrono::Duration,
}

impl AuthorizationService {
    pub fn new(
        credentials: Arc<CredentialStore>,
        client: Arc<dyn OAuthTokenClient>,
        states: Arc<dyn OAuthStateStore>,
        integrations: Arc<dyn IntegrationRepository>,
        registry: ProviderRegistry,
    ) -> Self {
        Self {
            credentials,
            client,
            states,
            integrations,
            registry,
            state_ttl: chrono::Duration::seconds(OAUTH_STATE_TTL_SECS),
        }
    }

    #[must_use]
    pub fn with_state_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    /// Create a state (and PKCE verifier) and build the authorize URL.
    #[instrument(skip(self))]
    pub async fn begin_authorization(
        &self,
        studio_id: &str,
        provider: CalendarProvider,
        redirect_uri: &str,
    ) -> Result<AuthorizationRequest> {
        if studio_id.trim().is_empty() {
            return Err(StudioSyncError::InvalidInput("studio_id is required".into()));
        }
        let config = self.client.authorization_config(provider)?;
        let pkce = PkceChallenge::generate();
        let (verifier, challenge) = if config.use_pkce {
            (Some(pkce.code_verifier.clone()), Some(pkce.code_challenge.as_str()))
        } else {
            (None, None)
        };

        let url = config
            .authorize_url(redirect_uri, &pkce.state, challenge)
            .map_err(|err| StudioSyncError::Config(format!("invalid authorization URL for {provider}: {err}")))?;

        let now = Utc::now();
        self.states
            .save(&PendingAuthorization {
                state: pkce.state.clone(),
                studio_id: studio_id.to_string(),
                provider,
                redirect_uri: redirect_uri.to_string(),
                code_verifier: verifier,
                created_at: now,
                expires_at: now + self.state_ttl,
            })
            .await?;

        info!(pkce = config.use_pkce, "authorization started");
        Ok(AuthorizationRequest { url: url.to_string(), state: pkce.state })
    }

    /// Validate the callback, exchange the code and create or update the
    /// studio's integration with that provider.
    #[instrument(skip(self, callback), fields(provider = ?callback.provider))]
    pub async fn complete_authorization(
        &self,
        callback: AuthorizationCallback,
    ) -> Result<CalendarIntegration> {
        if let Some(error) = callback.error {
            let description = callback.error_description.unwrap_or_default();
            warn!(error = %error, "provider denied authorization");
            return Err(StudioSyncError::Auth(format!("authorization denied: {error} {description}").trim().to_string()));
        }
        let code = callback
            .code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| StudioSyncError::InvalidInput("callback has no code".into()))?;
        let state = callback
            .state
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StudioSyncError::InvalidInput("callback has no state".into()))?;

        let pending = self
            .states
            .take(&state)
            .await?
            .ok_or_else(|| StudioSyncError::Auth("unknown or already used state".into()))?;
        if !validate_state(&pending.state, &state) {
            return Err(StudioSyncError::Auth("state mismatch".into()));
        }
        if pending.expires_at < Utc::now() {
            return Err(StudioSyncError::Auth("authorization request expired".into()));
        }
        if callback.provider.is_some_and(|p| p != pending.provider) {
            return Err(StudioSyncError::Auth("callback provider does not match the request".into()));
        }
        let provider = pending.provider;

        let tokens = self
            .credentials
            .exchange_code(provider, &code, &pending.redirect_uri, pending.code_verifier.as_deref())
            .await?;
        let account = self.account_info(provider, &AccessToken::new(tokens.access_token.clone())).await;

        let account_id = account.as_ref().map(|a| a.account_id.as_str());

        if let Some(existing) = self.integrations.find_by_studio_provider(&pending.studio_id, provider).await? {
            let credentials =
                credentials_from_tokens(&tokens, existing.credentials.refresh_token.as_deref());
            self.integrations.reconnect(&existing.id, &credentials, account_id).await?;
            let integration = self
                .integrations
                .get(&existing.id)
                .await?
                .ok_or_else(|| StudioSyncError::NotFound(format!("integration {}", existing.id)))?;
            info!(integration_id = %integration.id, studio_id = %integration.studio_id, "integration reconnected");
            return Ok(integration);
        }

        let mut integration =
            CalendarIntegration::new(uuid::Uuid::now_v7().to_string(), pending.studio_id.clone(), provider);
        if let (Some(account), Ok(adapter)) = (&account, self.registry.get(provider)) {
            integration.settings = adapter.default_settings(account);
        }
        integration.provider_account_id = account_id.map(str::to_string);
        integration.credentials = credentials_from_tokens(&tokens, None);

        self.integrations.upsert(&integration).await?;
        info!(integration_id = %integration.id, studio_id = %integration.studio_id, "integration connected");
        Ok(integration)
    }

    /// Account details are a nicety at connect time; failures only warn.
    async fn account_info(&self, provider: CalendarProvider, token: &AccessToken) -> Option<ProviderAccount> {
        let adapter = match self.registry.get(provider) {
            Ok(adapter) => adapter,
            Err(err) => {
                warn!(error = %err, "no adapter for account lookup");
                return None;
            }
        };
        match adapter.get_account_info(token).await {
            Ok(account) => Some(account),
            Err(err) => {
                warn!(error = %err, "account lookup failed; using default settings");
                None
            }
        }
    }

    /// Revoke and disable an integration.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, integration_id: &str) -> Result<()> {
        let integration = self
            .integrations
            .get(integration_id)
            .await?
            .ok_or_else(|| StudioSyncError::NotFound(format!("integration {integration_id}")))?;
        self.credentials.revoke(&integration).await
    }

    pub async fn purge_expired_states(&self) -> Result<usize> {
        self.states.purge_expired(Utc::now()).await
    }
}
