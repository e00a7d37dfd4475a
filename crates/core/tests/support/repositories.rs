//! In-memory repository implementations for testing
//!
//! Provides mocks for every core repository port so orchestrator and
//! pipeline tests run without a database.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use studiosync_core::{
    CatalogRepository, EventRepository, IntegrationRepository, MigrationUpdate, OAuthStateStore,
    PendingAuthorization, RunStatusUpdate,
};
use studiosync_domain::{
    CalendarIntegration, CalendarProvider, Catalog, CatalogClass, CatalogInstructor,
    ClassSchedule, ImportedEvent, IntegrationCredentials, MigrationStatus, Result as DomainResult,
    ScheduleChange, StudioSyncError, SyncStatus,
};

/// In-memory mock for `IntegrationRepository`.
#[derive(Default, Clone)]
pub struct InMemoryIntegrationRepository {
    rows: Arc<Mutex<HashMap<String, CalendarIntegration>>>,
}

impl InMemoryIntegrationRepository {
    pub fn with(integration: CalendarIntegration) -> Self {
        let repo = Self::default();
        repo.put(integration);
        repo
    }

    pub fn put(&self, integration: CalendarIntegration) {
        self.rows.lock().unwrap().insert(integration.id.clone(), integration);
    }

    pub fn snapshot(&self, id: &str) -> CalendarIntegration {
        self.rows.lock().unwrap().get(id).cloned().expect("integration exists")
    }

    pub fn update(&self, id: &str, f: impl FnOnce(&mut CalendarIntegration)) {
        f(self.rows.lock().unwrap().get_mut(id).expect("integration exists"));
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.rows.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl IntegrationRepository for InMemoryIntegrationRepository {
    async fn get(&self, id: &str) -> DomainResult<Option<CalendarIntegration>> {
        Ok(self.rows.lock().unwrap().get(id).cloned())
    }

    async fn find_by_studio_provider(
        &self,
        studio_id: &str,
        provider: CalendarProvider,
    ) -> DomainResult<Option<CalendarIntegration>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .values()
            .find(|i| i.studio_id == studio_id && i.provider == provider)
            .cloned())
    }

    async fn list_by_studio(&self, studio_id: &str) -> DomainResult<Vec<CalendarIntegration>> {
        let mut rows: Vec<_> =
            self.rows.lock().unwrap().values().filter(|i| i.studio_id == studio_id).cloned().collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    async fn list_enabled(&self) -> DomainResult<Vec<CalendarIntegration>> {
        let mut rows: Vec<_> =
            self.rows.lock().unwrap().values().filter(|i| i.sync_enabled).cloned().collect();
        rows.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(rows)
    }

    async fn upsert(&self, integration: &CalendarIntegration) -> DomainResult<()> {
        self.put(integration.clone());
        Ok(())
    }

    async fn save_credentials(
        &self,
        id: &str,
        credentials: &IntegrationCredentials,
    ) -> DomainResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(id).ok_or_else(|| StudioSyncError::NotFound(id.to_string()))?;
        row.credentials = credentials.clone();
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn reconnect(
        &self,
        id: &str,
        credentials: &IntegrationCredentials,
        provider_account_id: Option<&str>,
    ) -> DomainResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(id).ok_or_else(|| StudioSyncError::NotFound(id.to_string()))?;
        row.credentials = credentials.clone();
        if let Some(account) = provider_account_id {
            row.provider_account_id = Some(account.to_string());
        }
        row.sync_enabled = true;
        row.requires_reauth = false;
        row.sync_status = SyncStatus::Active;
        row.error_message = None;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_reauth_required(
        &self,
        id: &str,
        status: SyncStatus,
        reason: &str,
    ) -> DomainResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(id).ok_or_else(|| StudioSyncError::NotFound(id.to_string()))?;
        row.sync_status = status;
        row.error_message = Some(reason.to_string());
        row.requires_reauth = true;
        Ok(())
    }

    async fn try_begin_run(
        &self,
        id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(id).ok_or_else(|| StudioSyncError::NotFound(id.to_string()))?;
        match row.running_since {
            Some(since) if since >= stale_before => Ok(false),
            _ => {
                row.running_since = Some(now);
                Ok(true)
            }
        }
    }

    async fn finish_run(&self, id: &str, update: &RunStatusUpdate) -> DomainResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(id).ok_or_else(|| StudioSyncError::NotFound(id.to_string()))?;
        row.running_since = None;
        row.sync_status = update.sync_status;
        if let Some(at) = update.last_sync_at {
            row.last_sync_at = Some(at);
        }
        row.error_message = update.error_message.clone();
        Ok(())
    }

    async fn disable(&self, id: &str) -> DomainResult<()> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows.get_mut(id).ok_or_else(|| StudioSyncError::NotFound(id.to_string()))?;
        row.credentials = IntegrationCredentials::default();
        row.sync_enabled = false;
        Ok(())
    }
}

/// In-memory mock for `EventRepository`.
///
/// `fail_migration_updates` makes every `update_migration` call fail, for
/// exercising the pipeline's compensation path.
#[derive(Default, Clone)]
pub struct InMemoryEventRepository {
    rows: Arc<Mutex<Vec<ImportedEvent>>>,
    fail_migration_updates: Arc<AtomicBool>,
}

impl InMemoryEventRepository {
    pub fn all(&self) -> Vec<ImportedEvent> {
        self.rows.lock().unwrap().clone()
    }

    pub fn by_external_id(&self, external_id: &str) -> ImportedEvent {
        self.all()
            .into_iter()
            .find(|e| e.external_id == external_id)
            .expect("event stored")
    }

    pub fn insert(&self, event: ImportedEvent) {
        self.rows.lock().unwrap().push(event);
    }

    pub fn fail_migration_updates(&self, fail: bool) {
        self.fail_migration_updates.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn get(&self, id: &str) -> DomainResult<Option<ImportedEvent>> {
        Ok(self.rows.lock().unwrap().iter().find(|e| e.id == id).cloned())
    }

    async fn find_by_external_id(
        &self,
        integration_id: &str,
        external_id: &str,
    ) -> DomainResult<Option<ImportedEvent>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.integration_id == integration_id && e.external_id == external_id)
            .cloned())
    }

    async fn find_by_schedule(
        &self,
        integration_id: &str,
        schedule_id: &str,
    ) -> DomainResult<Option<ImportedEvent>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|e| {
                e.integration_id == integration_id
                    && e.mapped_schedule_id.as_deref() == Some(schedule_id)
            })
            .cloned())
    }

    async fn upsert(&self, event: &ImportedEvent) -> DomainResult<ImportedEvent> {
        let mut rows = self.rows.lock().unwrap();
        let existing = rows.iter_mut().find(|e| {
            e.integration_id == event.integration_id && e.external_id == event.external_id
        });
        match existing {
            Some(row) => {
                let (id, created_at) = (row.id.clone(), row.created_at);
                *row = ImportedEvent { id, created_at, updated_at: Utc::now(), ..event.clone() };
                Ok(row.clone())
            }
            None => {
                rows.push(event.clone());
                Ok(event.clone())
            }
        }
    }

    async fn update_migration(&self, event_id: &str, update: &MigrationUpdate) -> DomainResult<()> {
        if self.fail_migration_updates.load(Ordering::SeqCst) {
            return Err(StudioSyncError::Database("injected update failure".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|e| e.id == event_id)
            .ok_or_else(|| StudioSyncError::NotFound(event_id.to_string()))?;
        row.migration_status = update.status;
        row.mapped_class_id = update.mapped_class_id.clone();
        row.mapped_schedule_id = update.mapped_schedule_id.clone();
        row.error_details = update.error_details.clone();
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn list_in_window(
        &self,
        integration_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<ImportedEvent>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.integration_id == integration_id && e.start_time <= end && e.end_time >= start)
            .cloned()
            .collect())
    }

    async fn list_by_studio(
        &self,
        studio_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DomainResult<Vec<ImportedEvent>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.studio_id == studio_id && e.start_time <= end && e.end_time >= start)
            .cloned()
            .collect())
    }

    async fn list_awaiting_review(&self, studio_id: &str) -> DomainResult<Vec<ImportedEvent>> {
        let mut rows: Vec<_> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.studio_id == studio_id && e.migration_status == MigrationStatus::Pending)
            .cloned()
            .collect();
        rows.sort_by_key(|e| e.created_at);
        Ok(rows)
    }
}

/// In-memory mock for `CatalogRepository`.
///
/// `delete_locally` simulates a studio owner deleting a schedule (exported
/// as a deletion); `delete_schedule` is the pipeline's hard delete.
#[derive(Default, Clone)]
pub struct InMemoryCatalogRepository {
    classes: Arc<Mutex<Vec<CatalogClass>>>,
    instructors: Arc<Mutex<Vec<CatalogInstructor>>>,
    schedules: Arc<Mutex<Vec<ClassSchedule>>>,
    deleted: Arc<Mutex<Vec<ClassSchedule>>>,
}

impl InMemoryCatalogRepository {
    pub fn new(classes: Vec<CatalogClass>) -> Self {
        let repo = Self::default();
        *repo.classes.lock().unwrap() = classes;
        repo
    }

    pub fn with_instructor(self, instructor: CatalogInstructor) -> Self {
        self.instructors.lock().unwrap().push(instructor);
        self
    }

    pub fn add_schedule(&self, schedule: ClassSchedule) {
        self.schedules.lock().unwrap().push(schedule);
    }

    pub fn schedules(&self) -> Vec<ClassSchedule> {
        self.schedules.lock().unwrap().clone()
    }

    /// Local edit by the studio owner.
    pub fn edit_schedule(&self, id: &str, start: DateTime<Utc>, end: DateTime<Utc>) {
        let mut schedules = self.schedules.lock().unwrap();
        let schedule = schedules.iter_mut().find(|s| s.id == id).expect("schedule exists");
        schedule.start_time = start;
        schedule.end_time = end;
        schedule.updated_at = Utc::now();
    }

    pub fn delete_locally(&self, id: &str) {
        let mut schedules = self.schedules.lock().unwrap();
        if let Some(pos) = schedules.iter().position(|s| s.id == id) {
            let mut schedule = schedules.remove(pos);
            schedule.updated_at = Utc::now();
            self.deleted.lock().unwrap().push(schedule);
        }
    }

    fn class_name(&self, class_id: &str) -> String {
        let classes = self.classes.lock().unwrap();
        classes.iter().find(|c| c.id == class_id).map(|c| c.name.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryCatalogRepository {
    async fn load_catalog(&self, studio_id: &str) -> DomainResult<Catalog> {
        let classes =
            self.classes.lock().unwrap().iter().filter(|c| c.studio_id == studio_id).cloned().collect();
        let instructors = self
            .instructors
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.studio_id == studio_id)
            .cloned()
            .collect();
        let schedules = self
            .schedules
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.studio_id == studio_id)
            .cloned()
            .collect();
        Ok(Catalog::new(classes, instructors, schedules))
    }

    async fn get_schedule(&self, schedule_id: &str) -> DomainResult<Option<ClassSchedule>> {
        Ok(self.schedules.lock().unwrap().iter().find(|s| s.id == schedule_id).cloned())
    }

    async fn create_schedule(&self, schedule: &ClassSchedule) -> DomainResult<()> {
        self.add_schedule(schedule.clone());
        Ok(())
    }

    async fn update_schedule_times(
        &self,
        schedule_id: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> DomainResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        let schedule = schedules
            .iter_mut()
            .find(|s| s.id == schedule_id)
            .ok_or_else(|| StudioSyncError::NotFound(schedule_id.to_string()))?;
        if schedule.start_time != start_time || schedule.end_time != end_time {
            schedule.start_time = start_time;
            schedule.end_time = end_time;
            schedule.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_schedule(&self, schedule_id: &str) -> DomainResult<()> {
        self.schedules.lock().unwrap().retain(|s| s.id != schedule_id);
        Ok(())
    }

    async fn schedule_changes_since(
        &self,
        studio_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> DomainResult<Vec<ScheduleChange>> {
        let changed = |s: &ClassSchedule| {
            s.studio_id == studio_id && since.map_or(true, |since| s.updated_at > since)
        };
        let live: Vec<_> = self.schedules.lock().unwrap().iter().filter(|s| changed(s)).cloned().collect();
        let deleted: Vec<_> = self.deleted.lock().unwrap().iter().filter(|s| changed(s)).cloned().collect();

        let mut changes = Vec::new();
        for (schedule, deleted) in live.into_iter().map(|s| (s, false)).chain(deleted.into_iter().map(|s| (s, true))) {
            let class_name = self.class_name(&schedule.class_id);
            changes.push(ScheduleChange { schedule, class_name, class_description: None, deleted });
        }
        Ok(changes)
    }
}

/// In-memory mock for `OAuthStateStore`.
#[derive(Default, Clone)]
pub struct InMemoryStateStore {
    rows: Arc<Mutex<HashMap<String, PendingAuthorization>>>,
}

impl InMemoryStateStore {
    pub fn update(&self, state: &str, f: impl FnOnce(&mut PendingAuthorization)) {
        f(self.rows.lock().unwrap().get_mut(state).expect("state exists"));
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl OAuthStateStore for InMemoryStateStore {
    async fn save(&self, pending: &PendingAuthorization) -> DomainResult<()> {
        self.rows.lock().unwrap().insert(pending.state.clone(), pending.clone());
        Ok(())
    }

    async fn take(&self, state: &str) -> DomainResult<Option<PendingAuthorization>> {
        Ok(self.rows.lock().unwrap().remove(state))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> DomainResult<usize> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|_, pending| pending.expires_at >= now);
        Ok(before - rows.len())
    }
}
