//! SQLite persistence for integrations, imported events, the class catalog
//! and pending OAuth states

mod columns;
pub mod catalog_repository;
pub mod event_repository;
pub mod integration_repository;
pub mod manager;
pub mod oauth_state_repository;
pub mod pool;

use std::sync::Arc;

use studiosync_domain::Result as DomainResult;
use tokio::task;

pub use catalog_repository::SqliteCatalogRepository;
pub use event_repository::SqliteEventRepository;
pub use integration_repository::SqliteIntegrationRepository;
pub use manager::DbManager;
pub use oauth_state_repository::SqliteOAuthStateStore;
pub use pool::{create_sqlite_pool, SqliteConnection, SqlitePool, SqlitePoolConfig};

use crate::errors::map_join_error;

/// Run `work` on a pooled connection on the blocking thread pool.
pub(crate) async fn with_connection<T, F>(db: &Arc<DbManager>, work: F) -> DomainResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> DomainResult<T> + Send + 'static,
{
    let db = Arc::clone(db);
    task::spawn_blocking(move || {
        let mut conn = db.get_connection()?;
        work(&mut conn)
    })
    .await
    .map_err(map_join_error)?
}
