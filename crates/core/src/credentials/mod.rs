//! OAuth credential lifecycle

pub mod ports;
pub mod service;

pub use service::{credentials_from_tokens, AccessToken, CredentialStore};
