//! # StudioSync Core
//!
//! Business logic of the calendar integration engine. No database, HTTP or
//! platform code lives here.
//!
//! This crate contains:
//! - Port interfaces (traits) for repositories, OAuth and provider adapters
//! - The credential store, sync orchestrator, mapping pipeline and conflict
//!   resolver
//! - The OAuth connect flow and read-only queries
//!
//! ## Architecture Principles
//! - Only depends on `studiosync-common` and `studiosync-domain`
//! - All external dependencies via traits
//! - Pure, testable business logic

pub mod conflict;
pub mod connect;
pub mod credentials;
pub mod mapping;
pub mod providers;
pub mod queries;
pub mod sync;

pub use conflict::{ConflictResolver, Resolution};
pub use connect::ports::{OAuthStateStore, PendingAuthorization};
pub use connect::{AuthorizationCallback, AuthorizationRequest, AuthorizationService};
pub use credentials::ports::{IntegrationRepository, OAuthTokenClient, RunStatusUpdate};
pub use credentials::{AccessToken, CredentialStore};
pub use mapping::ports::{CatalogRepository, EventRepository, MigrationUpdate};
pub use mapping::{evaluate, MappingPipeline};
pub use providers::ports::{NativeEvent, ProviderAdapter};
pub use providers::ProviderRegistry;
pub use queries::{IntegrationQueries, IntegrationSummary};
pub use sync::{SyncOptions, SyncOrchestrator, SyncOutcome};
