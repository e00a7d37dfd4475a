//! Sync orchestration and its retry policy

pub mod policy;
pub mod service;

pub use policy::ProviderRetryPolicy;
pub use service::{SyncOptions, SyncOrchestrator, SyncOutcome};
