//! Pending OAuth authorizations, keyed by the `state` parameter.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use studiosync_core::{OAuthStateStore, PendingAuthorization};
use studiosync_domain::Result as DomainResult;
use tracing::debug;

use super::columns::{from_millis, parse_enum, to_millis};
use super::manager::{map_sql_error, DbManager};
use super::with_connection;

pub struct SqliteOAuthStateStore {
    db: Arc<DbManager>,
}

impl SqliteOAuthStateStore {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OAuthStateStore for SqliteOAuthStateStore {
    async fn save(&self, pending: &PendingAuthorization) -> DomainResult<()> {
        let pending = pending.clone();
        with_connection(&self.db, move |conn| {
            conn.execute(
                "INSERT INTO oauth_states
                    (state, studio_id, provider, redirect_uri, code_verifier, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    pending.state,
                    pending.studio_id,
                    pending.provider.as_str(),
                    pending.redirect_uri,
                    pending.code_verifier,
                    to_millis(pending.created_at),
                    to_millis(pending.expires_at),
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    async fn take(&self, state: &str) -> DomainResult<Option<PendingAuthorization>> {
        let state = state.to_string();
        with_connection(&self.db, move |conn| {
            // DELETE .. RETURNING makes the take single-use under concurrency.
            conn.query_row(
                "DELETE FROM oauth_states WHERE state = ?1
                 RETURNING state, studio_id, provider, redirect_uri, code_verifier,
                           created_at, expires_at",
                params![state],
                map_state_row,
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        with_connection(&self.db, move |conn| {
            let purged = conn
                .execute("DELETE FROM oauth_states WHERE expires_at < ?1", params![to_millis(now)])
                .map_err(map_sql_error)?;
            if purged > 0 {
                debug!(purged, "expired oauth states removed");
            }
            Ok(purged)
        })
        .await
    }
}

fn map_state_row(row: &Row<'_>) -> rusqlite::Result<PendingAuthorization> {
    let provider: String = row.get(2)?;
    Ok(PendingAuthorization {
        state: row.get(0)?,
        studio_id: row.get(1)?,
        provider: parse_enum(2, &provider)?,
        redirect_uri: row.get(3)?,
        code_verifier: row.get(4)?,
        created_at: from_millis(5, row.get(5)?)?,
        expires_at: from_millis(6, row.get(6)?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use studiosync_domain::CalendarProvider;
    use tempfile::TempDir;

    use super::*;

    fn setup_store() -> (SqliteOAuthStateStore, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let manager = DbManager::new(temp_dir.path().join("states.db"), 2).expect("manager created");
        manager.run_migrations().expect("migrations run");
        (SqliteOAuthStateStore::new(Arc::new(manager)), temp_dir)
    }

    fn pending(state: &str, created_at: DateTime<Utc>) -> PendingAuthorization {
        PendingAuthorization {
            state: state.into(),
            studio_id: "studio-1".into(),
            provider: CalendarProvider::Calendly,
            redirect_uri: "https://studio.example/callback".into(),
            code_verifier: Some("verifier".into()),
            created_at,
            expires_at: created_at + Duration::minutes(10),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn state_can_be_taken_once() {
        let (store, _dir) = setup_store();
        let created = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        store.save(&pending("abc", created)).await.unwrap();

        let taken = store.take("abc").await.unwrap().expect("state present");
        assert_eq!(taken, pending("abc", created));
        assert!(store.take("abc").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn purge_removes_only_expired() {
        let (store, _dir) = setup_store();
        let old = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap();
        store.save(&pending("old", old)).await.unwrap();
        store.save(&pending("fresh", old + Duration::hours(1))).await.unwrap();

        let purged = store.purge_expired(old + Duration::minutes(30)).await.unwrap();
        assert_eq!(purged, 1);
        assert!(store.take("fresh").await.unwrap().is_some());
    }
}
