//! OAuth 2.0 token endpoint client for every calendar provider.
//!
//! Endpoint defaults live here; `ProvidersConfig` supplies the client
//! registration and may override the endpoints (sandboxes, tests).

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, Response};
use serde_json::json;
use studiosync_common::auth::{OAuthConfig, OAuthError, TokenResponse, TokenSet};
use studiosync_core::OAuthTokenClient;
use studiosync_domain::{
    CalendarProvider, OAuthClientConfig, ProviderErrorKind, ProvidersConfig, Result, StudioSyncError,
};
use tracing::{debug, instrument, warn};

use crate::http::{error_from_response, HttpClient};

/// Built-in endpoints of one authorization server.
struct ProviderEndpoints {
    authorization_url: &'static str,
    token_url: &'static str,
    revocation_url: Option<&'static str>,
    scopes: &'static [&'static str],
    use_pkce: bool,
    extra_params: &'static [(&'static str, &'static str)],
    /// Square takes JSON token requests; everyone else takes forms.
    json_body: bool,
}

fn endpoints(provider: CalendarProvider) -> Option<ProviderEndpoints> {
    let endpoints = match provider {
        CalendarProvider::Google => ProviderEndpoints {
            authorization_url: "https://accounts.google.com/o/oauth2/v2/auth",
            token_url: "https://oauth2.googleapis.com/token",
            revocation_url: Some("https://oauth2.googleapis.com/revoke"),
            scopes: &["https://www.googleapis.com/auth/calendar", "openid", "email"],
            use_pkce: true,
            extra_params: &[("access_type", "offline"), ("prompt", "consent")],
            json_body: false,
        },
        CalendarProvider::Outlook => ProviderEndpoints {
            authorization_url: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
            token_url: "https://login.microsoftonline.com/common/oauth2/v2.0/token",
            revocation_url: None,
            scopes: &["offline_access", "User.Read", "Calendars.ReadWrite", "MailboxSettings.Read"],
            use_pkce: true,
            extra_params: &[],
            json_body: false,
        },
        CalendarProvider::Calendly => ProviderEndpoints {
            authorization_url: "https://auth.calendly.com/oauth/authorize",
            token_url: "https://auth.calendly.com/oauth/token",
            revocation_url: Some("https://auth.calendly.com/oauth/revoke"),
            scopes: &[],
            use_pkce: true,
            extra_params: &[],
            json_body: false,
        },
        CalendarProvider::Square => ProviderEndpoints {
            authorization_url: "https://connect.squareup.com/oauth2/authorize",
            token_url: "https://connect.squareup.com/oauth2/token",
            revocation_url: Some("https://connect.squareup.com/oauth2/revoke"),
            scopes: &["APPOINTMENTS_READ", "APPOINTMENTS_ALL_READ", "ITEMS_READ", "EMPLOYEES_READ", "MERCHANT_PROFILE_READ"],
            use_pkce: false,
            extra_params: &[("session", "false")],
            json_body: true,
        },
        CalendarProvider::Mindbody => ProviderEndpoints {
            authorization_url: "https://signin.mindbodyonline.com/connect/authorize",
            token_url: "https://signin.mindbodyonline.com/connect/token",
            revocation_url: None,
            scopes: &["email", "profile", "openid", "offline_access", "Mindbody.Api.Public.v6"],
            use_pkce: true,
            extra_params: &[],
            json_body: false,
        },
        CalendarProvider::Acuity => ProviderEndpoints {
            authorization_url: "https://acuityscheduling.com/oauth2/authorize",
            token_url: "https://acuityscheduling.com/oauth2/token",
            revocation_url: None,
            scopes: &["api-v1"],
            use_pkce: false,
            extra_params: &[],
            json_body: false,
        },
        CalendarProvider::Apple => return None,
    };
    Some(endpoints)
}

/// [`OAuthTokenClient`] over HTTP.
pub struct HttpOAuthClient {
    http: HttpClient,
    providers: ProvidersConfig,
}

impl HttpOAuthClient {
    pub fn new(http: HttpClient, providers: ProvidersConfig) -> Self {
        Self { http, providers }
    }

    fn registration(&self, provider: CalendarProvider) -> Result<(&OAuthClientConfig, ProviderEndpoints)> {
        let endpoints = endpoints(provider).ok_or_else(|| {
            StudioSyncError::Config(format!("{provider} does not use OAuth"))
        })?;
        let client = self
            .providers
            .get(provider)
            .filter(|client| client.is_configured())
            .ok_or_else(|| StudioSyncError::Config(format!("no OAuth client configured for {provider}")))?;
        Ok((client, endpoints))
    }

    /// POST a grant to the token endpoint.
    async fn token_request(
        &self,
        provider: CalendarProvider,
        params: Vec<(&'static str, String)>,
    ) -> Result<TokenSet> {
        let config = self.authorization_config(provider)?;
        let (_, endpoints) = self.registration(provider)?;

        let mut params = params;
        params.push(("client_id", config.client_id.clone()));
        if let Some(secret) = &config.client_secret {
            params.push(("client_secret", secret.clone()));
        }

        let builder = self.http.request(Method::POST, config.token_url.as_str());
        let builder = if endpoints.json_body {
            let body: serde_json::Map<String, serde_json::Value> =
                params.into_iter().map(|(k, v)| (k.to_string(), json!(v))).collect();
            builder.json(&body)
        } else {
            builder.form(&params)
        };

        let response = self.http.send(builder).await?;
        if response.status().is_success() {
            let tokens: TokenResponse = response.json().await.map_err(|err| {
                StudioSyncError::Auth(format!("{provider} token response was malformed: {err}"))
            })?;
            return Ok(tokens.into());
        }
        Err(grant_error(provider, response).await)
    }
}

/// Map a failed token response. A rejected grant is `Auth`; server errors
/// and rate limits stay transient provider errors.
async fn grant_error(provider: CalendarProvider, response: Response) -> StudioSyncError {
    let status = response.status();
    if status.is_server_error() || status.as_u16() == 429 {
        return error_from_response(response).await;
    }

    let body = response.text().await.unwrap_or_default();
    match serde_json::from_str::<OAuthError>(&body) {
        Ok(err) if err.is_invalid_grant() => {
            StudioSyncError::Auth(format!("{provider} rejected the grant: {err}"))
        }
        Ok(err) => StudioSyncError::provider(
            ProviderErrorKind::Unknown,
            format!("{provider} token endpoint error: {err}"),
        ),
        Err(_) if status.as_u16() == 401 => {
            StudioSyncError::Auth(format!("{provider} token endpoint answered 401"))
        }
        Err(_) => StudioSyncError::provider(
            ProviderErrorKind::Unknown,
            format!("{provider} token endpoint answered HTTP {}", status.as_u16()),
        ),
    }
}

#[async_trait]
impl OAuthTokenClient for HttpOAuthClient {
    #[instrument(skip(self, code, code_verifier), fields(provider = %provider))]
    async fn exchange_code(
        &self,
        provider: CalendarProvider,
        code: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenSet> {
        let mut params = vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
        ];
        if let Some(verifier) = code_verifier {
            params.push(("code_verifier", verifier.to_string()));
        }
        let tokens = self.token_request(provider, params).await?;
        debug!(has_refresh = tokens.refresh_token.is_some(), "authorization code exchanged");
        Ok(tokens)
    }

    #[instrument(skip(self, refresh_token), fields(provider = %provider))]
    async fn refresh(&self, provider: CalendarProvider, refresh_token: &str) -> Result<TokenSet> {
        let params = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ];
        let mut tokens = self.token_request(provider, params).await?;
        // Google and Outlook omit the refresh token when it does not rotate
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token.to_string());
        }
        Ok(tokens)
    }

    #[instrument(skip(self, token), fields(provider = %provider))]
    async fn revoke(&self, provider: CalendarProvider, token: &str) -> Result<()> {
        let config = self.authorization_config(provider)?;
        let Some(url) = config.revocation_url.as_deref() else {
            debug!("provider has no revocation endpoint");
            return Ok(());
        };

        let builder = match provider {
            CalendarProvider::Square => self
                .http
                .request(Method::POST, url)
                .header(
                    AUTHORIZATION,
                    format!("Client {}", config.client_secret.clone().unwrap_or_default()),
                )
                .json(&json!({ "client_id": config.client_id, "access_token": token })),
            _ => {
                let mut form = vec![("token", token.to_string()), ("client_id", config.client_id.clone())];
                if let Some(secret) = &config.client_secret {
                    form.push(("client_secret", secret.clone()));
                }
                self.http.request(Method::POST, url).form(&form)
            }
        };

        match self.http.send_empty(builder).await {
            Ok(()) => Ok(()),
            // Already revoked or expired
            Err(err @ StudioSyncError::Provider(_)) if !err.is_transient() => {
                warn!(error = %err, "revocation rejected; treating token as revoked");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn authorization_config(&self, provider: CalendarProvider) -> Result<OAuthConfig> {
        let (client, endpoints) = self.registration(provider)?;
        let base = client.base_url.as_deref().map(|b| b.trim_end_matches('/'));
        let rebase = |default: &str| match base {
            // A base override points every endpoint at a sandbox host
            Some(base) => url::Url::parse(default)
                .map(|u| format!("{base}{}", u.path()))
                .unwrap_or_else(|_| default.to_string()),
            None => default.to_string(),
        };

        Ok(OAuthConfig {
            authorization_url: client.auth_url.clone().unwrap_or_else(|| rebase(endpoints.authorization_url)),
            token_url: client.token_url.clone().unwrap_or_else(|| rebase(endpoints.token_url)),
            revocation_url: endpoints.revocation_url.map(rebase),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            scopes: if client.scopes.is_empty() {
                endpoints.scopes.iter().map(|s| (*s).to_string()).collect()
            } else {
                client.scopes.clone()
            },
            use_pkce: endpoints.use_pkce,
            extra_params: endpoints
                .extra_params
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> HttpOAuthClient {
        let mut providers = ProvidersConfig::default();
        providers.google = OAuthClientConfig {
            client_id: "client-1".into(),
            client_secret: Some("secret".into()),
            base_url: Some(server.uri()),
            ..OAuthClientConfig::default()
        };
        HttpOAuthClient::new(HttpClient::new().unwrap(), providers)
    }

    #[tokio::test]
    async fn refresh_keeps_the_old_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access", "expires_in": 3600, "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let tokens = client_for(&server).refresh(CalendarProvider::Google, "r1").await.unwrap();
        assert_eq!(tokens.access_token, "new-access");
        assert_eq!(tokens.refresh_token.as_deref(), Some("r1"));
        assert!(tokens.expires_at.is_some());
    }

    #[tokio::test]
    async fn invalid_grant_is_an_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant", "error_description": "Token has been expired or revoked."
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).refresh(CalendarProvider::Google, "r1").await.unwrap_err();
        assert!(matches!(err, StudioSyncError::Auth(_)));
    }

    #[tokio::test]
    async fn server_errors_stay_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).refresh(CalendarProvider::Google, "r1").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn google_config_requests_offline_access() {
        let server_less = HttpOAuthClient::new(HttpClient::new().unwrap(), {
            let mut providers = ProvidersConfig::default();
            providers.google.client_id = "client-1".into();
            providers
        });
        let config = server_less.authorization_config(CalendarProvider::Google).unwrap();
        assert_eq!(config.token_url, "https://oauth2.googleapis.com/token");
        assert!(config.use_pkce);
        assert!(config.extra_params.contains(&("access_type".into(), "offline".into())));
    }

    #[test]
    fn unconfigured_provider_is_a_config_error() {
        let client = HttpOAuthClient::new(HttpClient::new().unwrap(), ProvidersConfig::default());
        assert!(matches!(
            client.authorization_config(CalendarProvider::Calendly),
            Err(StudioSyncError::Config(_))
        ));
        assert!(matches!(
            client.authorization_config(CalendarProvider::Apple),
            Err(StudioSyncError::Config(_))
        ));
    }
}
