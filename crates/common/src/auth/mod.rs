//! OAuth 2.0 + PKCE primitives
//!
//! Provider-neutral building blocks for the authorization-code flow:
//!
//! - [`TokenSet`] / [`TokenResponse`]: tokens and their expiry
//! - [`OAuthConfig`]: authorize/token/revoke endpoints of one provider
//! - [`pkce`]: verifier, challenge and CSRF state generation
//!
//! The HTTP side (code exchange, refresh, revocation) lives in the infra
//! crate; this module performs no I/O.

pub mod pkce;
pub mod types;

pub use pkce::{generate_state, validate_state, PkceChallenge};
pub use types::{OAuthConfig, OAuthError, TokenResponse, TokenSet};
