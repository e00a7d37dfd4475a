//! SQLite-backed implementation of the integration repository port.
//!
//! Besides plain persistence this owns the per-integration run lock: a
//! single `UPDATE ... WHERE running_since IS NULL OR running_since < ?`
//! claims it, so two workers sharing the database can never both win.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use studiosync_core::{IntegrationRepository, RunStatusUpdate};
use studiosync_domain::{
    CalendarIntegration, CalendarProvider, IntegrationCredentials, Result as DomainResult,
    StudioSyncError, SyncStatus,
};
use tracing::{debug, instrument};

use super::columns::{
    bool_to_int, from_millis, from_opt_millis, int_to_bool, opt_millis, parse_enum, parse_json,
    parse_status, to_json, to_millis,
};
use super::manager::{map_sql_error, DbManager};
use super::{with_connection, SqliteConnection};

/// SQLite-backed integration repository.
pub struct SqliteIntegrationRepository {
    db: Arc<DbManager>,
}

impl SqliteIntegrationRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    fn select_one(
        conn: &SqliteConnection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> DomainResult<Option<CalendarIntegration>> {
        conn.query_row(sql, params, map_integration_row).optional().map_err(map_sql_error)
    }

    fn select_many(
        conn: &SqliteConnection,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> DomainResult<Vec<CalendarIntegration>> {
        let mut stmt = conn.prepare(sql).map_err(map_sql_error)?;
        let rows = stmt.query_map(params, map_integration_row).map_err(map_sql_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
    }

    fn exists(conn: &SqliteConnection, id: &str) -> DomainResult<bool> {
        conn.query_row(INTEGRATION_EXISTS_SQL, params![id], |row| row.get::<_, i64>(0))
            .map(int_to_bool)
            .map_err(map_sql_error)
    }
}

fn require_updated(changed: usize, id: &str) -> DomainResult<()> {
    if changed == 0 {
        return Err(StudioSyncError::NotFound(format!("integration {id}")));
    }
    Ok(())
}

#[async_trait]
impl IntegrationRepository for SqliteIntegrationRepository {
    async fn get(&self, id: &str) -> DomainResult<Option<CalendarIntegration>> {
        let id = id.to_string();
        with_connection(&self.db, move |conn| {
            Self::select_one(conn, &format!("{INTEGRATION_SELECT_SQL} WHERE id = ?1"), params![id])
        })
        .await
    }

    async fn find_by_studio_provider(
        &self,
        studio_id: &str,
        provider: CalendarProvider,
    ) -> DomainResult<Option<CalendarIntegration>> {
        let studio_id = studio_id.to_string();
        with_connection(&self.db, move |conn| {
            Self::select_one(
                conn,
                &format!("{INTEGRATION_SELECT_SQL} WHERE studio_id = ?1 AND provider = ?2"),
                params![studio_id, provider.as_str()],
            )
        })
        .await
    }

    async fn list_by_studio(&self, studio_id: &str) -> DomainResult<Vec<CalendarIntegration>> {
        let studio_id = studio_id.to_string();
        with_connection(&self.db, move |conn| {
            Self::select_many(
                conn,
                &format!("{INTEGRATION_SELECT_SQL} WHERE studio_id = ?1 ORDER BY provider, id"),
                params![studio_id],
            )
        })
        .await
    }

    async fn list_enabled(&self) -> DomainResult<Vec<CalendarIntegration>> {
        with_connection(&self.db, move |conn| {
            Self::select_many(
                conn,
                &format!("{INTEGRATION_SELECT_SQL} WHERE sync_enabled = 1 ORDER BY id"),
                [],
            )
        })
        .await
    }

    #[instrument(skip(self, integration), fields(integration_id = %integration.id))]
    async fn upsert(&self, integration: &CalendarIntegration) -> DomainResult<()> {
        let row = integration.clone();
        let settings = to_json(&row.settings)?;
        with_connection(&self.db, move |conn| {
            let creds = &row.credentials;
            conn.execute(
                INTEGRATION_UPSERT_SQL,
                params![
                    row.id,
                    row.studio_id,
                    row.provider.as_str(),
                    row.provider_account_id,
                    creds.access_token,
                    creds.refresh_token,
                    opt_millis(creds.expires_at),
                    creds.token_type,
                    creds.scope,
                    bool_to_int(row.sync_enabled),
                    row.sync_direction.as_str(),
                    row.conflict_policy.as_str(),
                    settings,
                    row.sync_status.as_str(),
                    opt_millis(row.last_sync_at),
                    row.error_message,
                    opt_millis(row.running_since),
                    bool_to_int(row.requires_reauth),
                    to_millis(row.created_at),
                    to_millis(Utc::now()),
                ],
            )
            .map_err(map_sql_error)?;
            debug!("integration saved");
            Ok(())
        })
        .await
    }

    async fn save_credentials(
        &self,
        id: &str,
        credentials: &IntegrationCredentials,
    ) -> DomainResult<()> {
        let id = id.to_string();
        let creds = credentials.clone();
        with_connection(&self.db, move |conn| {
            let changed = conn
                .execute(
                    "UPDATE calendar_integrations
                     SET access_token = ?1, refresh_token = ?2, token_expires_at = ?3,
                         token_type = ?4, token_scope = ?5, updated_at = ?6
                     WHERE id = ?7",
                    params![
                        creds.access_token,
                        creds.refresh_token,
                        opt_millis(creds.expires_at),
                        creds.token_type,
                        creds.scope,
                        to_millis(Utc::now()),
                        id,
                    ],
                )
                .map_err(map_sql_error)?;
            require_updated(changed, &id)
        })
        .await
    }

    #[instrument(skip(self, credentials))]
    async fn reconnect(
        &self,
        id: &str,
        credentials: &IntegrationCredentials,
        provider_account_id: Option<&str>,
    ) -> DomainResult<()> {
        let id = id.to_string();
        let creds = credentials.clone();
        let account = provider_account_id.map(str::to_string);
        with_connection(&self.db, move |conn| {
            let changed = conn
                .execute(
                    "UPDATE calendar_integrations
                     SET access_token = ?1, refresh_token = ?2, token_expires_at = ?3,
                         token_type = ?4, token_scope = ?5,
                         provider_account_id = COALESCE(?6, provider_account_id),
                         sync_enabled = 1, requires_reauth = 0, sync_status = 'active',
                         error_message = NULL, updated_at = ?7
                     WHERE id = ?8",
                    params![
                        creds.access_token,
                        creds.refresh_token,
                        opt_millis(creds.expires_at),
                        creds.token_type,
                        creds.scope,
                        account,
                        to_millis(Utc::now()),
                        id,
                    ],
                )
                .map_err(map_sql_error)?;
            require_updated(changed, &id)
        })
        .await
    }

    async fn mark_reauth_required(
        &self,
        id: &str,
        status: SyncStatus,
        reason: &str,
    ) -> DomainResult<()> {
        let id = id.to_string();
        let reason = reason.to_string();
        with_connection(&self.db, move |conn| {
            let changed = conn
                .execute(
                    "UPDATE calendar_integrations
                     SET sync_status = ?1, error_message = ?2, requires_reauth = 1, updated_at = ?3
                     WHERE id = ?4",
                    params![status.as_str(), reason, to_millis(Utc::now()), id],
                )
                .map_err(map_sql_error)?;
            require_updated(changed, &id)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn try_begin_run(
        &self,
        id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let id = id.to_string();
        with_connection(&self.db, move |conn| {
            let claimed = conn
                .execute(
                    "UPDATE calendar_integrations
                     SET running_since = ?1, updated_at = ?1
                     WHERE id = ?2 AND (running_since IS NULL OR running_since < ?3)",
                    params![to_millis(now), id, to_millis(stale_before)],
                )
                .map_err(map_sql_error)?;
            if claimed == 1 {
                return Ok(true);
            }
            if Self::exists(conn, &id)? {
                Ok(false)
            } else {
                Err(StudioSyncError::NotFound(format!("integration {id}")))
            }
        })
        .await
    }

    #[instrument(skip(self, update), fields(status = %update.sync_status))]
    async fn finish_run(&self, id: &str, update: &RunStatusUpdate) -> DomainResult<()> {
        let id = id.to_string();
        let update = update.clone();
        with_connection(&self.db, move |conn| {
            let changed = conn
                .execute(
                    "UPDATE calendar_integrations
                     SET running_since = NULL, sync_status = ?1,
                         last_sync_at = COALESCE(?2, last_sync_at),
                         error_message = ?3, updated_at = ?4
                     WHERE id = ?5",
                    params![
                        update.sync_status.as_str(),
                        opt_millis(update.last_sync_at),
                        update.error_message,
                        to_millis(Utc::now()),
                        id,
                    ],
                )
                .map_err(map_sql_error)?;
            require_updated(changed, &id)
        })
        .await
    }

    async fn disable(&self, id: &str) -> DomainResult<()> {
        let id = id.to_string();
        with_connection(&self.db, move |conn| {
            let changed = conn
                .execute(
                    "UPDATE calendar_integrations
                     SET access_token = NULL, refresh_token = NULL, token_expires_at = NULL,
                         token_type = NULL, token_scope = NULL, sync_enabled = 0, updated_at = ?1
                     WHERE id = ?2",
                    params![to_millis(Utc::now()), id],
                )
                .map_err(map_sql_error)?;
            require_updated(changed, &id)
        })
        .await
    }
}

const INTEGRATION_SELECT_SQL: &str = "SELECT
        id, studio_id, provider, provider_account_id, access_token, refresh_token,
        token_expires_at, token_type, token_scope, sync_enabled, sync_direction,
        conflict_policy, settings_json, sync_status, last_sync_at, error_message,
        running_since, requires_reauth, created_at, updated_at
    FROM calendar_integrations";

const INTEGRATION_EXISTS_SQL: &str =
    "SELECT EXISTS(SELECT 1 FROM calendar_integrations WHERE id = ?1)";

const INTEGRATION_UPSERT_SQL: &str = "INSERT INTO calendar_integrations (
        id, studio_id, provider, provider_account_id, access_token, refresh_token,
        token_expires_at, token_type, token_scope, sync_enabled, sync_direction,
        conflict_policy, settings_json, sync_status, last_sync_at, error_message,
        running_since, requires_reauth, created_at, updated_at
    ) VALUES (
        ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20
    )
    ON CONFLICT(id) DO UPDATE SET
        studio_id = excluded.studio_id,
        provider = excluded.provider,
        provider_account_id = excluded.provider_account_id,
        access_token = excluded.access_token,
        refresh_token = excluded.refresh_token,
        token_expires_at = excluded.token_expires_at,
        token_type = excluded.token_type,
        token_scope = excluded.token_scope,
        sync_enabled = excluded.sync_enabled,
        sync_direction = excluded.sync_direction,
        conflict_policy = excluded.conflict_policy,
        settings_json = excluded.settings_json,
        sync_status = excluded.sync_status,
        last_sync_at = excluded.last_sync_at,
        error_message = excluded.error_message,
        running_since = excluded.running_since,
        requires_reauth = excluded.requires_reauth,
        updated_at = excluded.updated_at";

fn map_integration_row(row: &Row<'_>) -> rusqlite::Result<CalendarIntegration> {
    let provider: String = row.get(2)?;
    let sync_direction: String = row.get(10)?;
    let conflict_policy: String = row.get(11)?;
    let settings: String = row.get(12)?;
    let sync_status: String = row.get(13)?;

    Ok(CalendarIntegration {
        id: row.get(0)?,
        studio_id: row.get(1)?,
        provider: parse_enum(2, &provider)?,
        provider_account_id: row.get(3)?,
        credentials: IntegrationCredentials {
            access_token: row.get(4)?,
            refresh_token: row.get(5)?,
            expires_at: from_opt_millis(6, row.get(6)?)?,
            token_type: row.get(7)?,
            scope: row.get(8)?,
        },
        sync_enabled: int_to_bool(row.get(9)?),
        sync_direction: parse_status("sync_direction", &sync_direction),
        conflict_policy: parse_status("conflict_policy", &conflict_policy),
        settings: parse_json(12, &settings)?,
        sync_status: parse_status("sync_status", &sync_status),
        last_sync_at: from_opt_millis(14, row.get(14)?)?,
        error_message: row.get(15)?,
        running_since: from_opt_millis(16, row.get(16)?)?,
        requires_reauth: int_to_bool(row.get(17)?),
        created_at: from_millis(18, row.get(18)?)?,
        updated_at: from_millis(19, row.get(19)?)?,
    })
}
