//! Scripted OAuth token client

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use studiosync_common::{OAuthConfig, TokenSet};
use studiosync_core::OAuthTokenClient;
use studiosync_domain::{CalendarProvider, Result as DomainResult, StudioSyncError};

/// Fake token endpoint.
///
/// Refresh results are popped from a queue; once it is empty every refresh
/// succeeds with a numbered one-hour token. `refresh_delay` widens the race
/// window for single-flight tests.
#[derive(Default, Clone)]
pub struct FakeTokenClient {
    refresh_results: Arc<Mutex<VecDeque<DomainResult<TokenSet>>>>,
    refresh_calls: Arc<AtomicUsize>,
    revoked: Arc<Mutex<Vec<String>>>,
    fail_revoke: Arc<Mutex<bool>>,
    refresh_delay: Option<Duration>,
}

impl FakeTokenClient {
    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = Some(delay);
        self
    }

    pub fn push_refresh(&self, result: DomainResult<TokenSet>) {
        self.refresh_results.lock().unwrap().push_back(result);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn revoked(&self) -> Vec<String> {
        self.revoked.lock().unwrap().clone()
    }

    pub fn fail_revoke(&self) {
        *self.fail_revoke.lock().unwrap() = true;
    }
}

#[async_trait]
impl OAuthTokenClient for FakeTokenClient {
    async fn exchange_code(
        &self,
        _provider: CalendarProvider,
        code: &str,
        _redirect_uri: &str,
        _code_verifier: Option<&str>,
    ) -> DomainResult<TokenSet> {
        if code == "bad-code" {
            return Err(StudioSyncError::Auth("invalid_grant: bad code".into()));
        }
        Ok(TokenSet::new(format!("access-{code}"), Some(format!("refresh-{code}")), Some(3600), None))
    }

    async fn refresh(
        &self,
        _provider: CalendarProvider,
        _refresh_token: &str,
    ) -> DomainResult<TokenSet> {
        let call = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.refresh_delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.refresh_results.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| {
            Ok(TokenSet::new(format!("refreshed-{call}"), None, Some(3600), None))
        })
    }

    async fn revoke(&self, _provider: CalendarProvider, token: &str) -> DomainResult<()> {
        self.revoked.lock().unwrap().push(token.to_string());
        if *self.fail_revoke.lock().unwrap() {
            return Err(StudioSyncError::Network("connection reset".into()));
        }
        Ok(())
    }

    fn authorization_config(&self, provider: CalendarProvider) -> DomainResult<OAuthConfig> {
        Ok(OAuthConfig {
            authorization_url: format!("https://auth.example.com/{provider}/authorize"),
            token_url: format!("https://auth.example.com/{provider}/token"),
            revocation_url: None,
            client_id: "client-123".into(),
            client_secret: Some("shh".into()),
            scopes: vec!["calendar".into()],
            use_pkce: provider == CalendarProvider::Google,
            extra_params: vec![],
        })
    }
}
