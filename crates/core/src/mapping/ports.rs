//! Port interfaces for the class catalog and imported events

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use studiosync_domain::{
    Catalog, ClassSchedule, ImportedEvent, MigrationStatus, Result, ScheduleChange,
};

/// Pipeline-owned columns of an imported event.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationUpdate {
    pub status: MigrationStatus,
    pub mapped_class_id: Option<String>,
    pub mapped_schedule_id: Option<String>,
    pub error_details: Option<Value>,
}

/// Trait for the studio's internal class catalog
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn load_catalog(&self, studio_id: &str) -> Result<Catalog>;

    async fn get_schedule(&self, schedule_id: &str) -> Result<Option<ClassSchedule>>;

    async fn create_schedule(&self, schedule: &ClassSchedule) -> Result<()>;

    /// Move a schedule. Leaves `updated_at` alone when the times are equal.
    async fn update_schedule_times(
        &self,
        schedule_id: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<()>;

    /// Compensation for a schedule created by a mapping that failed to
    /// persist.
    async fn delete_schedule(&self, schedule_id: &str) -> Result<()>;

    /// Schedules created, moved or deleted after `since` (all when `None`).
    async fn schedule_changes_since(
        &self,
        studio_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ScheduleChange>>;
}

/// Trait for imported event persistence
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<ImportedEvent>>;

    async fn find_by_external_id(
        &self,
        integration_id: &str,
        external_id: &str,
    ) -> Result<Option<ImportedEvent>>;

    async fn find_by_schedule(
        &self,
        integration_id: &str,
        schedule_id: &str,
    ) -> Result<Option<ImportedEvent>>;

    /// Insert, or update in place on (integration_id, external_id).
    ///
    /// An existing row keeps its id and `created_at`; the stored row is
    /// returned.
    async fn upsert(&self, event: &ImportedEvent) -> Result<ImportedEvent>;

    async fn update_migration(&self, event_id: &str, update: &MigrationUpdate) -> Result<()>;

    /// Rows of `integration_id` overlapping `[start, end]`.
    async fn list_in_window(
        &self,
        integration_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ImportedEvent>>;

    async fn list_by_studio(
        &self,
        studio_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ImportedEvent>>;

    /// Pending rows of a studio, oldest first.
    async fn list_awaiting_review(&self, studio_id: &str) -> Result<Vec<ImportedEvent>>;
}
