//! SQLite connection pool helpers
//!
//! Thin wrapper around `r2d2_sqlite` that applies the per-connection pragmas
//! and converts pool errors into the domain error type.

use std::path::Path;
use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;
use studiosync_domain::Result as DomainResult;

use crate::errors::InfraError;

/// Pooled SQLite connections.
pub type SqlitePool = r2d2::Pool<SqliteConnectionManager>;

/// A connection checked out of [`SqlitePool`].
pub type SqliteConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool sizing and timeouts.
#[derive(Debug, Clone)]
pub struct SqlitePoolConfig {
    pub max_size: u32,
    pub connection_timeout: Duration,
    pub busy_timeout: Duration,
}

impl Default for SqlitePoolConfig {
    fn default() -> Self {
        Self {
            max_size: 8,
            connection_timeout: Duration::from_secs(10),
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Open (or create) the database at `path` behind a connection pool.
///
/// Every connection runs in WAL mode with foreign keys enforced.
pub fn create_sqlite_pool<P: AsRef<Path>>(path: P, config: &SqlitePoolConfig) -> DomainResult<SqlitePool> {
    let busy_timeout = config.busy_timeout;
    let manager = SqliteConnectionManager::file(path.as_ref()).with_init(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.pragma_update(None, "synchronous", "NORMAL")
    });

    r2d2::Pool::builder()
        .max_size(config.max_size.max(1))
        .connection_timeout(config.connection_timeout)
        .build(manager)
        .map_err(|err| InfraError::from(err).into())
}
