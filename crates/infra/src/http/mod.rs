//! Shared HTTP client used by provider adapters and the OAuth client

pub mod client;

pub use client::{error_from_response, read_json, HttpClient, HttpClientBuilder};
