//! OAuth 2.0 types and structures
//!
//! Token sets, token endpoint responses and provider endpoint descriptions
//! shared by every calendar provider.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access and refresh tokens with their expiry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,

    /// Some providers (Acuity, Mindbody staff tokens) issue none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    pub token_type: String,

    /// Absolute expiry; `None` for long-lived tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// Granted scopes (space-separated)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenSet {
    /// Build a token set that expires `expires_in` seconds from now.
    #[must_use]
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: Option<i64>,
        scope: Option<String>,
    ) -> Self {
        let expires_at = expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));

        Self { access_token, refresh_token, token_type: "Bearer".to_string(), expires_at, scope }
    }
}

/// Token endpoint response (RFC 6749 section 5.1)
///
/// Square reports an absolute `expires_at` instead of `expires_in`; both are
/// accepted. Unknown fields (`merchant_id`, `owner`) land in `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl From<TokenResponse> for TokenSet {
    fn from(response: TokenResponse) -> Self {
        let mut tokens = Self::new(
            response.access_token,
            response.refresh_token,
            response.expires_in,
            response.scope,
        );
        if tokens.expires_at.is_none() {
            tokens.expires_at = response.expires_at;
        }
        if let Some(token_type) = response.token_type {
            // Square answers "bearer"; normalize for the Authorization header
            tokens.token_type = if token_type.eq_ignore_ascii_case("bearer") {
                "Bearer".to_string()
            } else {
                token_type
            };
        }
        tokens
    }
}

/// Endpoints and client registration for one authorization server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthConfig {
    pub authorization_url: String,
    pub token_url: String,
    /// Token revocation endpoint, when the provider has one
    pub revocation_url: Option<String>,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scopes: Vec<String>,
    /// Send `code_challenge` / `code_verifier`
    pub use_pkce: bool,
    /// Provider-specific authorize parameters (`access_type=offline`, ...)
    pub extra_params: Vec<(String, String)>,
}

impl OAuthConfig {
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// Authorization redirect URL for `state` and an optional PKCE challenge.
    ///
    /// # Errors
    /// Returns the parse error when `authorization_url` is not a valid URL.
    pub fn authorize_url(
        &self,
        redirect_uri: &str,
        state: &str,
        code_challenge: Option<&str>,
    ) -> Result<url::Url, url::ParseError> {
        let mut url = url::Url::parse(&self.authorization_url)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("state", state);
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scope_string());
            }
            if let Some(challenge) = code_challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "S256");
            }
            for (key, value) in &self.extra_params {
                query.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// OAuth error response (RFC 6749 section 5.2)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthError {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl OAuthError {
    /// The grant can never succeed again without a new authorization.
    #[must_use]
    pub fn is_invalid_grant(&self) -> bool {
        matches!(self.error.as_str(), "invalid_grant" | "unauthorized_client" | "invalid_client")
    }
}

impl fmt::Display for OAuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error_description {
            Some(desc) => write!(f, "{}: {}", self.error, desc),
            None => write!(f, "{}", self.error),
        }
    }
}

impl std::error::Error for OAuthError {}
