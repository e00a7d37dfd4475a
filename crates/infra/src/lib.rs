//! # StudioSync Infrastructure
//!
//! Infrastructure implementations of core domain ports.
//!
//! This crate contains:
//! - SQLite repositories (rusqlite + r2d2)
//! - The shared HTTP client, provider adapters and the OAuth token client
//! - Configuration loading, the cron sync scheduler and tracing setup
//!
//! ## Architecture
//! - Implements traits defined in `studiosync-core`
//! - Contains all "impure" code (I/O, network, clocks)

pub mod config;
pub mod database;
pub mod errors;
pub mod http;
pub mod integrations;
pub mod observability;
pub mod scheduling;

// Re-export commonly used items
pub use database::{
    DbManager, SqliteCatalogRepository, SqliteEventRepository, SqliteIntegrationRepository,
    SqliteOAuthStateStore,
};
pub use errors::InfraError;
pub use http::HttpClient;
pub use integrations::{build_registry, HttpOAuthClient};
pub use scheduling::{SyncScheduler, SyncSchedulerConfig};
