//! SQLite-backed class catalog.
//!
//! Schedules removed by studio staff are soft-deleted so the export phase
//! can see the removal; `delete_schedule` is a hard delete used only to
//! undo a schedule the mapping pipeline created.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use studiosync_core::CatalogRepository;
use studiosync_domain::{
    Catalog, CatalogClass, CatalogInstructor, ClassSchedule, Result as DomainResult,
    ScheduleChange, StudioSyncError,
};
use tracing::{debug, instrument};

use super::columns::{from_millis, opt_millis, to_millis};
use super::manager::{map_sql_error, DbManager};
use super::{with_connection, SqliteConnection};

/// SQLite-backed catalog repository.
pub struct SqliteCatalogRepository {
    db: Arc<DbManager>,
}

impl SqliteCatalogRepository {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Insert or replace a class.
    pub async fn upsert_class(
        &self,
        class: &CatalogClass,
        description: Option<&str>,
    ) -> DomainResult<()> {
        let class = class.clone();
        let description = description.map(str::to_string);
        with_connection(&self.db, move |conn| {
            conn.execute(
                "INSERT INTO catalog_classes
                    (id, studio_id, name, description, category, instructor_id, instructor_email)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    studio_id = excluded.studio_id,
                    name = excluded.name,
                    description = excluded.description,
                    category = excluded.category,
                    instructor_id = excluded.instructor_id,
                    instructor_email = excluded.instructor_email",
                params![
                    class.id,
                    class.studio_id,
                    class.name,
                    description,
                    class.category,
                    class.instructor_id,
                    class.instructor_email,
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    pub async fn upsert_instructor(&self, instructor: &CatalogInstructor) -> DomainResult<()> {
        let instructor = instructor.clone();
        with_connection(&self.db, move |conn| {
            conn.execute(
                "INSERT INTO catalog_instructors (id, studio_id, name, email)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    studio_id = excluded.studio_id,
                    name = excluded.name,
                    email = excluded.email",
                params![instructor.id, instructor.studio_id, instructor.name, instructor.email],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    /// Mark a schedule deleted by studio staff; the next export pass removes
    /// it from export-capable providers.
    #[instrument(skip(self))]
    pub async fn soft_delete_schedule(&self, schedule_id: &str) -> DomainResult<()> {
        let schedule_id = schedule_id.to_string();
        with_connection(&self.db, move |conn| {
            let now = to_millis(Utc::now());
            let changed = conn
                .execute(
                    "UPDATE class_schedules SET deleted_at = ?1, updated_at = ?1
                     WHERE id = ?2 AND deleted_at IS NULL",
                    params![now, schedule_id],
                )
                .map_err(map_sql_error)?;
            if changed == 0 {
                return Err(StudioSyncError::NotFound(format!("class schedule {schedule_id}")));
            }
            Ok(())
        })
        .await
    }

    fn schedule_exists(conn: &SqliteConnection, schedule_id: &str) -> DomainResult<bool> {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM class_schedules WHERE id = ?1 AND deleted_at IS NULL)",
            params![schedule_id],
            |row| row.get::<_, i64>(0),
        )
        .map(|found| found != 0)
        .map_err(map_sql_error)
    }
}

#[async_trait]
impl CatalogRepository for SqliteCatalogRepository {
    #[instrument(skip(self))]
    async fn load_catalog(&self, studio_id: &str) -> DomainResult<Catalog> {
        let studio_id = studio_id.to_string();
        with_connection(&self.db, move |conn| {
            let classes = {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, studio_id, name, category, instructor_id, instructor_email
                         FROM catalog_classes WHERE studio_id = ?1",
                    )
                    .map_err(map_sql_error)?;
                let rows = stmt.query_map(params![studio_id], map_class_row).map_err(map_sql_error)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?
            };

            let instructors = {
                let mut stmt = conn
                    .prepare(
                        "SELECT id, studio_id, name, email
                         FROM catalog_instructors WHERE studio_id = ?1",
                    )
                    .map_err(map_sql_error)?;
                let rows =
                    stmt.query_map(params![studio_id], map_instructor_row).map_err(map_sql_error)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?
            };

            let schedules = {
                let mut stmt = conn
                    .prepare(&format!(
                        "{SCHEDULE_SELECT_SQL} WHERE s.studio_id = ?1 AND s.deleted_at IS NULL"
                    ))
                    .map_err(map_sql_error)?;
                let rows =
                    stmt.query_map(params![studio_id], map_schedule_row).map_err(map_sql_error)?;
                rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)?
            };

            debug!(
                classes = classes.len(),
                instructors = instructors.len(),
                schedules = schedules.len(),
                "catalog loaded"
            );
            Ok(Catalog::new(classes, instructors, schedules))
        })
        .await
    }

    async fn get_schedule(&self, schedule_id: &str) -> DomainResult<Option<ClassSchedule>> {
        let schedule_id = schedule_id.to_string();
        with_connection(&self.db, move |conn| {
            conn.query_row(
                &format!("{SCHEDULE_SELECT_SQL} WHERE s.id = ?1 AND s.deleted_at IS NULL"),
                params![schedule_id],
                map_schedule_row,
            )
            .optional()
            .map_err(map_sql_error)
        })
        .await
    }

    #[instrument(skip(self, schedule), fields(schedule_id = %schedule.id))]
    async fn create_schedule(&self, schedule: &ClassSchedule) -> DomainResult<()> {
        let schedule = schedule.clone();
        with_connection(&self.db, move |conn| {
            conn.execute(
                "INSERT INTO class_schedules
                    (id, class_id, studio_id, start_time, end_time, instructor_id, location,
                     created_at, updated_at, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, NULL)",
                params![
                    schedule.id,
                    schedule.class_id,
                    schedule.studio_id,
                    to_millis(schedule.start_time),
                    to_millis(schedule.end_time),
                    schedule.instructor_id,
                    schedule.location,
                    to_millis(schedule.updated_at),
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    async fn update_schedule_times(
        &self,
        schedule_id: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> DomainResult<()> {
        let schedule_id = schedule_id.to_string();
        with_connection(&self.db, move |conn| {
            let changed = conn
                .execute(
                    "UPDATE class_schedules
                     SET start_time = ?1, end_time = ?2, updated_at = ?3
                     WHERE id = ?4 AND deleted_at IS NULL
                       AND (start_time != ?1 OR end_time != ?2)",
                    params![
                        to_millis(start_time),
                        to_millis(end_time),
                        to_millis(Utc::now()),
                        schedule_id,
                    ],
                )
                .map_err(map_sql_error)?;
            if changed == 0 && !Self::schedule_exists(conn, &schedule_id)? {
                return Err(StudioSyncError::NotFound(format!("class schedule {schedule_id}")));
            }
            Ok(())
        })
        .await
    }

    async fn delete_schedule(&self, schedule_id: &str) -> DomainResult<()> {
        let schedule_id = schedule_id.to_string();
        with_connection(&self.db, move |conn| {
            conn.execute("DELETE FROM class_schedules WHERE id = ?1", params![schedule_id])
                .map_err(map_sql_error)?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn schedule_changes_since(
        &self,
        studio_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> DomainResult<Vec<ScheduleChange>> {
        let studio_id = studio_id.to_string();
        with_connection(&self.db, move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT s.id, s.class_id, s.studio_id, s.start_time, s.end_time,
                            s.instructor_id, s.location, s.updated_at,
                            c.name, c.description, s.deleted_at IS NOT NULL
                     FROM class_schedules s
                     JOIN catalog_classes c ON c.id = s.class_id
                     WHERE s.studio_id = ?1 AND (?2 IS NULL OR s.updated_at > ?2)
                     ORDER BY s.updated_at, s.id",
                )
                .map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![studio_id, opt_millis(since)], |row| {
                    Ok(ScheduleChange {
                        schedule: map_schedule_row(row)?,
                        class_name: row.get(8)?,
                        class_description: row.get(9)?,
                        deleted: row.get(10)?,
                    })
                })
                .map_err(map_sql_error)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(map_sql_error)
        })
        .await
    }
}

const SCHEDULE_SELECT_SQL: &str = "SELECT
        s.id, s.class_id, s.studio_id, s.start_time, s.end_time, s.instructor_id,
        s.location, s.updated_at
    FROM class_schedules s";

fn map_class_row(row: &Row<'_>) -> rusqlite::Result<CatalogClass> {
    Ok(CatalogClass {
        id: row.get(0)?,
        studio_id: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        instructor_id: row.get(4)?,
        instructor_email: row.get(5)?,
    })
}

fn map_instructor_row(row: &Row<'_>) -> rusqlite::Result<CatalogInstructor> {
    Ok(CatalogInstructor {
        id: row.get(0)?,
        studio_id: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
    })
}

fn map_schedule_row(row: &Row<'_>) -> rusqlite::Result<ClassSchedule> {
    Ok(ClassSchedule {
        id: row.get(0)?,
        class_id: row.get(1)?,
        studio_id: row.get(2)?,
        start_time: from_millis(3, row.get(3)?)?,
        end_time: from_millis(4, row.get(4)?)?,
        instructor_id: row.get(5)?,
        location: row.get(6)?,
        updated_at: from_millis(7, row.get(7)?)?,
    })
}
