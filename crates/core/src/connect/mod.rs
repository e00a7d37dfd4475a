//! Connecting and disconnecting provider accounts

pub mod ports;
pub mod service;

pub use service::{AuthorizationCallback, AuthorizationRequest, AuthorizationService};
