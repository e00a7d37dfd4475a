//! SQLite-backed imported event repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use studiosync_core::{EventRepository, MigrationUpdate};
use studiosync_domain::{ImportedEvent, Result as DomainResult, StudioSyncError};
use tracing::instrument;

use super::columns::{
    bool_to_int, from_millis, from_opt_millis, int_to_bool, opt_millis, parse_enum, parse_json,
    parse_opt_json, parse_status, to_json, to_millis,
};
use super::manager::{map_sql_error, DbManager};
use super::{with_connection, SqliteConnection};

/// SQLite-backed imported event repository.
pub struct SqliteEventRepository {
    db: Arc<DbManager>,
}

impl SqliteEventRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    fn select_one(
        conn: &SqliteConnection,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> DomainResult<Option<ImportedEvent>> {
        conn.query_row(&format!("{EVENT_SELECT_SQL} {clause}"), params, map_event_row)
            .optional()
            .map_err(map_sql_error)
    }

    fn select_many(
        conn: &SqliteConnection,
        clause: &str,
        params: impl rusqlite::Params,
    ) -> DomainResult<Vec<ImportedEvent>> {
        let mut stmt = conn.prepare(&format!("{EVENT_SELECT_SQL} {clause}")).map_err(map_sql_error)?;
        let rows = stmt.query_map(params, map_event_row).map_err(map_sql_error)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
    }
}

#[async_trait]
impl EventRepository for SqliteEventRepository {
    async fn get(&self, id: &str) -> DomainResult<Option<ImportedEvent>> {
        let id = id.to_string();
        with_connection(&self.db, move |conn| Self::select_one(conn, "WHERE id = ?1", params![id]))
            .await
    }

    async fn find_by_external_id(
        &self,
        integration_id: &str,
        external_id: &str,
    ) -> DomainResult<Option<ImportedEvent>> {
        let integration_id = integration_id.to_string();
        let external_id = external_id.to_string();
        with_connection(&self.db, move |conn| {
            Self::select_one(
                conn,
                "WHERE integration_id = ?1 AND external_id = ?2",
                params![integration_id, external_id],
            )
        })
        .await
    }

    async fn find_by_schedule(
        &self,
        integration_id: &str,
        schedule_id: &str,
    ) -> DomainResult<Option<ImportedEvent>> {
        let integration_id = integration_id.to_string();
        let schedule_id = schedule_id.to_string();
        with_connection(&self.db, move |conn| {
            Self::select_one(
                conn,
                "WHERE integration_id = ?1 AND mapped_schedule_id = ?2
                 ORDER BY updated_at DESC LIMIT 1",
                params![integration_id, schedule_id],
            )
        })
        .await
    }

    #[instrument(skip(self, event), fields(external_id = %event.external_id))]
    async fn upsert(&self, event: &ImportedEvent) -> DomainResult<ImportedEvent> {
        let row = event.clone();
        let raw_data = to_json(&row.raw_data)?;
        let error_details = row.error_details.as_ref().map(to_json).transpose()?;
        with_connection(&self.db, move |conn| {
            conn.execute(
                EVENT_UPSERT_SQL,
                params![
                    row.id,
                    row.integration_id,
                    row.studio_id,
                    row.provider.as_str(),
                    row.external_id,
                    row.title,
                    row.description,
                    to_millis(row.start_time),
                    to_millis(row.end_time),
                    bool_to_int(row.all_day),
                    row.instructor_name,
                    row.instructor_email,
                    row.location,
                    row.room,
                    row.category,
                    row.skill_level,
                    row.max_participants,
                    row.current_participants,
                    row.price,
                    row.material_fee,
                    raw_data,
                    row.content_hash,
                    opt_millis(row.remote_updated_at),
                    row.migration_status.as_str(),
                    row.mapped_class_id,
                    row.mapped_schedule_id,
                    error_details,
                    to_millis(row.created_at),
                    to_millis(row.updated_at),
                ],
            )
            .map_err(map_sql_error)?;

            Self::select_one(
                conn,
                "WHERE integration_id = ?1 AND external_id = ?2",
                params![row.integration_id, row.external_id],
            )?
            .ok_or_else(|| {
                StudioSyncError::Internal(format!("event {} vanished after upsert", row.external_id))
            })
        })
        .await
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn update_migration(&self, event_id: &str, update: &MigrationUpdate) -> DomainResult<()> {
        let event_id = event_id.to_string();
        let update = update.clone();
        let error_details = update.error_details.as_ref().map(to_json).transpose()?;
        with_connection(&self.db, move |conn| {
            let changed = conn
                .execute(
                    "UPDATE imported_events
                     SET migration_status = ?1, mapped_class_id = ?2, mapped_schedule_id = ?3,
                         error_details = ?4, updated_at = ?5
                     WHERE id = ?6",
                    params![
                        update.status.as_str(),
                        update.mapped_class_id,
                        update.mapped_schedule_id,
                        error_details,
                        to_millis(Utc::now()),
                        event_id,
                    ],
                )
                .map_err(map_sql_error)?;
            if changed == 0 {
                return Err(StudioSyncError::NotFound(format!("imported event {event_id}")));
            }
            Ok(())
        })
        .await
    }

    async fn list_in_window(
        &self,
        integration_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<ImportedEvent>> {
        let integration_id = integration_id.to_string();
        with_connection(&self.db, move |conn| {
            Self::select_many(
                conn,
                "WHERE integration_id = ?1 AND start_time <= ?3 AND end_time >= ?2
                 ORDER BY start_time, id",
                params![integration_id, to_millis(start), to_millis(end)],
            )
        })
        .await
    }

    async fn list_by_studio(
        &self,
        studio_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<ImportedEvent>> {
        let studio_id = studio_id.to_string();
        with_connection(&self.db, move |conn| {
            Self::select_many(
                conn,
                "WHERE studio_id = ?1 AND start_time <= ?3 AND end_time >= ?2
                 ORDER BY start_time, id",
                params![studio_id, to_millis(start), to_millis(end)],
            )
        })
        .await
    }

    async fn list_awaiting_review(&self, studio_id: &str) -> DomainResult<Vec<ImportedEvent>> {
        let studio_id = studio_id.to_string();
        with_connection(&self.db, move |conn| {
            Self::select_many(
                conn,
                "WHERE studio_id = ?1 AND migration_status = 'pending'
                 ORDER BY created_at, id",
                params![studio_id],
            )
        })
        .await
    }
}

const EVENT_SELECT_SQL: &str = "SELECT
        id, integration_id, studio_id, provider, external_id, title, description,
        start_time, end_time, all_day, instructor_name, instructor_email, location, room,
        category, skill_level, max_participants, current_participants, price, material_fee,
        raw_data, content_hash, remote_updated_at, migration_status, mapped_class_id,
        mapped_schedule_id, error_details, created_at, updated_at
    FROM imported_events";

// id and created_at are only written on insert.
const EVENT_UPSERT_SQL: &str = "INSERT INTO imported_events (
        id, integration_id, studio_id, provider, external_id, title, description,
        start_time, end_time, all_day, instructor_name, instructor_email, location, room,
        category, skill_level, max_participants, current_participants, price, material_fee,
        raw_data, content_hash, remote_updated_at, migration_status, mapped_class_id,
        mapped_schedule_id, error_details, created_at, updated_at
    ) VALUES (
        ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19,
        ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29
    )
    ON CONFLICT(integration_id, external_id) DO UPDATE SET
        studio_id = excluded.studio_id,
        provider = excluded.provider,
        title = excluded.title,
        description = excluded.description,
        start_time = excluded.start_time,
        end_time = excluded.end_time,
        all_day = excluded.all_day,
        instructor_name = excluded.instructor_name,
        instructor_email = excluded.instructor_email,
        location = excluded.location,
        room = excluded.room,
        category = excluded.category,
        skill_level = excluded.skill_level,
        max_participants = excluded.max_participants,
        current_participants = excluded.current_participants,
        price = excluded.price,
        material_fee = excluded.material_fee,
        raw_data = excluded.raw_data,
        content_hash = excluded.content_hash,
        remote_updated_at = excluded.remote_updated_at,
        migration_status = excluded.migration_status,
        mapped_class_id = excluded.mapped_class_id,
        mapped_schedule_id = excluded.mapped_schedule_id,
        error_details = excluded.error_details,
        updated_at = excluded.updated_at";

fn map_event_row(row: &Row<'_>) -> rusqlite::Result<ImportedEvent> {
    let provider: String = row.get(3)?;
    let raw_data: String = row.get(20)?;
    let migration_status: String = row.get(23)?;

    Ok(ImportedEvent {
        id: row.get(0)?,
        integration_id: row.get(1)?,
        studio_id: row.get(2)?,
        provider: parse_enum(3, &provider)?,
        external_id: row.get(4)?,
        title: row.get(5)?,
        description: row.get(6)?,
        start_time: from_millis(7, row.get(7)?)?,
        end_time: from_millis(8, row.get(8)?)?,
        all_day: int_to_bool(row.get(9)?),
        instructor_name: row.get(10)?,
        instructor_email: row.get(11)?,
        location: row.get(12)?,
        room: row.get(13)?,
        category: row.get(14)?,
        skill_level: row.get(15)?,
        max_participants: row.get(16)?,
        current_participants: row.get(17)?,
        price: row.get(18)?,
        material_fee: row.get(19)?,
        raw_data: parse_json(20, &raw_data)?,
        content_hash: row.get(21)?,
        remote_updated_at: from_opt_millis(22, row.get(22)?)?,
        migration_status: parse_status("migration_status", &migration_status),
        mapped_class_id: row.get(24)?,
        mapped_schedule_id: row.get(25)?,
        error_details: parse_opt_json(26, row.get(26)?)?,
        created_at: from_millis(27, row.get(27)?)?,
        updated_at: from_millis(28, row.get(28)?)?,
    })
}
