//! Sync orchestrator - one run per integration
//!
//! A run claims the integration's persisted lock, fetches the sync window
//! from the provider, upserts and maps what changed, resolves conflicts,
//! pushes local edits for exporting integrations and finally writes the
//! integration's status. Runs of different integrations are independent.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::{json, Value};
use studiosync_common::{RetryConfig, RetryExecutor};
use studiosync_domain::constants::{
    REASON_CANCELLED_AT_PROVIDER, REASON_DELETED_LOCALLY, REASON_REJECTED,
    REASON_REMOVED_AT_PROVIDER,
};
use studiosync_domain::{
    CalendarIntegration, CanonicalEvent, Catalog, ErrorDetail, ImportResult, ImportedEvent,
    MigrationStatus, ProviderErrorKind, Result, ScheduleChange, StudioSyncError, SyncConfig,
    SyncDirection, SyncStatus, SyncWindow,
};
use tracing::{debug, error, info, instrument, warn};

use super::policy::{retry_config, ProviderRetryPolicy};
use crate::conflict::{local_version, ConflictResolver, Resolution};
use crate::credentials::ports::{IntegrationRepository, RunStatusUpdate};
use crate::credentials::{AccessToken, CredentialStore};
use crate::mapping::ports::{CatalogRepository, EventRepository, MigrationUpdate};
use crate::mapping::MappingPipeline;
use crate::providers::{NativeEvent, ProviderAdapter, ProviderRegistry};

/// Run parameters derived from [`SyncConfig`].
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub past_days: i64,
    pub future_days: i64,
    pub run_timeout: Duration,
    /// A lock older than this is taken over.
    pub stale_lock: chrono::Duration,
    pub retry: RetryConfig,
    /// Upper bound for `Retry-After` waits.
    pub max_retry_delay: Duration,
}

impl SyncOptions {
    pub fn from_config(sync: &SyncConfig) -> Self {
        Self {
            past_days: sync.past_days,
            future_days: sync.future_days,
            run_timeout: Duration::from_secs(sync.run_timeout_secs),
            stale_lock: chrono::Duration::seconds(sync.stale_lock_secs),
            retry: retry_config(sync),
            max_retry_delay: Duration::from_millis(sync.max_delay_ms),
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Completed(ImportResult),
    /// Another run holds the integration's lock.
    AlreadyRunning,
    /// Disabled, paused or waiting for re-authorization.
    Skipped { reason: String },
    /// The deadline passed; rows committed before it remain.
    TimedOut(ImportResult),
    Failed { result: ImportResult, error: StudioSyncError },
}

impl SyncOutcome {
    pub fn result(&self) -> Option<&ImportResult> {
        match self {
            Self::Completed(result) | Self::TimedOut(result) | Self::Failed { result, .. } => {
                Some(result)
            }
            Self::AlreadyRunning | Self::Skipped { .. } => None,
        }
    }

    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Mutable state of one run.
struct RunContext<'a> {
    integration: &'a CalendarIntegration,
    adapter: Arc<dyn ProviderAdapter>,
    token: AccessToken,
    catalog: Catalog,
    /// Schedules created, moved or left in conflict by this run; not
    /// exported.
    touched: HashSet<String>,
    result: &'a Mutex<ImportResult>,
}

pub struct SyncOrchestrator {
    integrations: Arc<dyn IntegrationRepository>,
    events: Arc<dyn EventRepository>,
    catalog: Arc<dyn CatalogRepository>,
    credentials: Arc<CredentialStore>,
    registry: ProviderRegistry,
    pipeline: Arc<MappingPipeline>,
    options: SyncOptions,
    retry: RetryExecutor<ProviderRetryPolicy>,
}

impl SyncOrchestrator {
    pub fn new(
        integrations: Arc<dyn IntegrationRepository>,
        events: Arc<dyn EventRepository>,
        catalog: Arc<dyn CatalogRepository>,
        credentials: Arc<CredentialStore>,
        registry: ProviderRegistry,
        pipeline: Arc<MappingPipeline>,
    ) -> Self {
        Self::with_options(
            integrations,
            events,
            catalog,
            credentials,
            registry,
            pipeline,
            SyncOptions::default(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_options(
        integrations: Arc<dyn IntegrationRepository>,
        events: Arc<dyn EventRepository>,
        catalog: Arc<dyn CatalogRepository>,
        credentials: Arc<CredentialStore>,
        registry: ProviderRegistry,
        pipeline: Arc<MappingPipeline>,
        options: SyncOptions,
    ) -> Self {
        let retry = RetryExecutor::new(
            options.retry.clone(),
            ProviderRetryPolicy::new(options.max_retry_delay),
        );
        Self { integrations, events, catalog, credentials, registry, pipeline, options, retry }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Sync one integration.
    ///
    /// Only repository failures around the run itself are returned as
    /// errors; everything that happens inside the run is reported through
    /// the outcome.
    #[instrument(skip(self))]
    pub async fn run_sync(&self, integration_id: &str) -> Result<SyncOutcome> {
        let integration = self
            .integrations
            .get(integration_id)
            .await?
            .ok_or_else(|| StudioSyncError::NotFound(format!("integration {integration_id}")))?;

        if let Some(reason) = skip_reason(&integration) {
            debug!(reason, "sync skipped");
            return Ok(SyncOutcome::Skipped { reason: reason.to_string() });
        }

        let now = Utc::now();
        if !self.integrations.try_begin_run(integration_id, now, now - self.options.stale_lock).await? {
            info!("sync already running; skipping");
            return Ok(SyncOutcome::AlreadyRunning);
        }

        info!(provider = %integration.provider, direction = %integration.sync_direction, "sync run started");
        let partial = Mutex::new(ImportResult::default());
        let run = tokio::time::timeout(self.options.run_timeout, self.execute(&integration, &partial)).await;
        let result = partial.into_inner();

        let (outcome, update) = match run {
            Ok(Ok(())) => {
                info!(
                    total_events = result.total_events,
                    imported = result.successfully_imported,
                    duplicates = result.duplicate_events,
                    failed = result.failed_imports,
                    requires_review = result.requires_review,
                    exported = result.exported_events,
                    "sync run completed"
                );
                (SyncOutcome::Completed(result), RunStatusUpdate::succeeded(Utc::now()))
            }
            Ok(Err(err)) => {
                error!(error = %err, "sync run failed");
                let mut update = RunStatusUpdate::failed(err.to_string());
                if matches!(err, StudioSyncError::Auth(_)) {
                    update.sync_status = self.status_after_auth_failure(integration_id).await;
                }
                (SyncOutcome::Failed { result, error: err }, update)
            }
            Err(_) => {
                let message = format!("sync run timed out after {:?}", self.options.run_timeout);
                error!(total_events = result.total_events, "{message}");
                (SyncOutcome::TimedOut(result), RunStatusUpdate::failed(message))
            }
        };

        if let Err(err) = self.integrations.finish_run(integration_id, &update).await {
            error!(error = %err, "failed to release sync lock; it expires after the stale timeout");
        }
        Ok(outcome)
    }

    /// An `expired` status set by the credential store survives the run's
    /// final status write; every other auth failure is an `error`.
    async fn status_after_auth_failure(&self, integration_id: &str) -> SyncStatus {
        match self.integrations.get(integration_id).await {
            Ok(Some(current)) if current.requires_reauth => current.sync_status,
            _ => SyncStatus::Error,
        }
    }

    /// Run every enabled integration concurrently.
    #[instrument(skip(self))]
    pub async fn run_all_enabled(&self) -> Result<Vec<(String, Result<SyncOutcome>)>> {
        let integrations = self.integrations.list_enabled().await?;
        let runs = integrations.iter().map(|integration| async move {
            (integration.id.clone(), self.run_sync(&integration.id).await)
        });
        let outcomes = join_all(runs).await;

        let completed = outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, Ok(SyncOutcome::Completed(_))))
            .count();
        info!(integrations = outcomes.len(), completed, "sync pass finished");
        Ok(outcomes)
    }

    /// Ingest one provider webhook notification through the regular
    /// upsert and mapping path.
    #[instrument(skip(self, payload))]
    pub async fn ingest_webhook(&self, integration_id: &str, payload: &Value) -> Result<ImportResult> {
        let integration = self
            .integrations
            .get(integration_id)
            .await?
            .ok_or_else(|| StudioSyncError::NotFound(format!("integration {integration_id}")))?;
        if let Some(reason) = skip_reason(&integration) {
            return Err(StudioSyncError::InvalidInput(format!(
                "integration {integration_id} does not accept webhooks: {reason}"
            )));
        }

        let adapter = self.registry.get(integration.provider)?;
        let token = self.valid_token(&integration).await?;
        let catalog = self.pipeline.load_catalog(&integration.studio_id).await?;
        let partial = Mutex::new(ImportResult::default());
        {
            let mut ctx = RunContext {
                integration: &integration,
                adapter,
                token,
                catalog,
                touched: HashSet::new(),
                result: &partial,
            };

            let adapter = Arc::clone(&ctx.adapter);
            let settings = &integration.settings;
            let native = self
                .call_provider(&mut ctx, |token| {
                    let adapter = Arc::clone(&adapter);
                    async move { adapter.normalize_webhook(&token, settings, payload).await }
                })
                .await?;

            match native {
                None => debug!("webhook does not concern an event"),
                Some(native) => {
                    partial.lock().total_events = 1;
                    match adapter.to_canonical(&native, settings) {
                        Ok(canonical) => self.ingest(&mut ctx, canonical).await?,
                        Err(err) => {
                            warn!(error = %err, "unusable webhook payload");
                            partial.lock().record_error(native.id.as_deref(), &err);
                        }
                    }
                }
            }
        }
        Ok(partial.into_inner())
    }

    async fn execute(&self, integration: &CalendarIntegration, partial: &Mutex<ImportResult>) -> Result<()> {
        let adapter = self.registry.get(integration.provider)?;
        let token = self.valid_token(integration).await?;
        let catalog = self.pipeline.load_catalog(&integration.studio_id).await?;
        let mut ctx = RunContext {
            integration,
            adapter,
            token,
            catalog,
            touched: HashSet::new(),
            result: partial,
        };

        if integration.sync_direction.imports() {
            let window =
                SyncWindow::around(Utc::now(), self.options.past_days, self.options.future_days);
            self.import_phase(&mut ctx, &window).await?;
        }
        if integration.sync_direction.exports() {
            self.export_phase(&mut ctx).await?;
        }
        Ok(())
    }

    /// Token refreshes that fail with network or 5xx errors are retried like
    /// any other provider call.
    async fn valid_token(&self, integration: &CalendarIntegration) -> Result<AccessToken> {
        self.with_retry(|| self.credentials.get_valid_token(integration)).await
    }

    /// Retries transient failures; a 401 gets one forced token refresh.
    async fn call_provider<T, F, Fut>(&self, ctx: &mut RunContext<'_>, op: F) -> Result<T>
    where
        F: Fn(AccessToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let first = {
            let token = ctx.token.clone();
            self.with_retry(|| op(token.clone())).await
        };
        match first {
            Err(err) if err.is_unauthorized() => {
                warn!(error = %err, "provider rejected the access token; refreshing once");
                let integration = ctx.integration;
                let rejected = ctx.token.clone();
                ctx.token = self
                    .with_retry(|| self.credentials.refresh_after_unauthorized(integration, &rejected))
                    .await?;
                let token = ctx.token.clone();
                self.with_retry(|| op(token.clone())).await
            }
            other => other,
        }
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry.execute(op).await.map_err(|err| {
            err.into_source()
                .unwrap_or_else(|| StudioSyncError::Internal("invalid retry configuration".into()))
        })
    }

    #[instrument(skip_all, fields(integration_id = %ctx.integration.id))]
    async fn import_phase(&self, ctx: &mut RunContext<'_>, window: &SyncWindow) -> Result<()> {
        let integration = ctx.integration;
        let adapter = Arc::clone(&ctx.adapter);
        let natives = self
            .call_provider(ctx, |token| {
                let adapter = Arc::clone(&adapter);
                async move { adapter.list_events(&token, window, &integration.settings).await }
            })
            .await?;

        ctx.result.lock().total_events = natives.len();
        debug!(count = natives.len(), "provider events fetched");

        let mut seen = HashSet::new();
        for native in &natives {
            match adapter.to_canonical(native, &integration.settings) {
                Ok(canonical) => {
                    seen.insert(canonical.external_id.clone());
                    self.ingest(ctx, canonical).await?;
                }
                Err(err) => {
                    warn!(external_id = ?native.id, error = %err, "skipping unusable provider event");
                    if let Some(external_id) = native.id.as_deref() {
                        seen.insert(external_id.to_string());
                        self.mark_invalid(integration, external_id, &err).await?;
                    }
                    ctx.result.lock().record_error(native.id.as_deref(), &err);
                }
            }
        }

        self.track_removals(ctx, window, &seen).await
    }

    /// A stored event whose new payload is unusable moves to `error`.
    async fn mark_invalid(
        &self,
        integration: &CalendarIntegration,
        external_id: &str,
        err: &StudioSyncError,
    ) -> Result<()> {
        let Some(stored) = self.events.find_by_external_id(&integration.id, external_id).await? else {
            return Ok(());
        };
        if !stored.migration_status.can_transition_to(MigrationStatus::Error) {
            return Ok(());
        }
        let update = MigrationUpdate {
            status: MigrationStatus::Error,
            mapped_class_id: stored.mapped_class_id,
            mapped_schedule_id: stored.mapped_schedule_id,
            error_details: Some(json!({ "reason": "invalid_payload", "message": err.to_string() })),
        };
        self.events.update_migration(&stored.id, &update).await
    }

    async fn track_removals(
        &self,
        ctx: &RunContext<'_>,
        window: &SyncWindow,
        seen: &HashSet<String>,
    ) -> Result<()> {
        let integration = ctx.integration;
        let stored = self.events.list_in_window(&integration.id, window.start, window.end).await?;
        let mut removed = 0_usize;
        for event in stored {
            if seen.contains(&event.external_id) || event.migration_status == MigrationStatus::Skipped {
                continue;
            }
            let update = MigrationUpdate {
                status: MigrationStatus::Skipped,
                mapped_class_id: event.mapped_class_id,
                mapped_schedule_id: event.mapped_schedule_id,
                error_details: Some(json!({ "reason": REASON_REMOVED_AT_PROVIDER })),
            };
            self.events.update_migration(&event.id, &update).await?;
            ctx.result.lock().record_skip(&event.external_id, REASON_REMOVED_AT_PROVIDER);
            removed += 1;
        }
        if removed > 0 {
            info!(removed, "events no longer at the provider marked skipped");
        }
        Ok(())
    }

    /// Upsert one canonical event and map it when it is new or changed.
    async fn ingest(&self, ctx: &mut RunContext<'_>, canonical: CanonicalEvent) -> Result<()> {
        let integration = ctx.integration;
        let existing =
            self.events.find_by_external_id(&integration.id, &canonical.external_id).await?;

        if let Some(stored) = &existing {
            let reappeared = skip_reason_of(stored) == Some(REASON_REMOVED_AT_PROVIDER);
            if stored.content_hash == canonical.content_hash() && !reappeared {
                self.refresh_unhashed(stored, &canonical).await?;
                ctx.result.lock().duplicate_events += 1;
                return Ok(());
            }
            if reappeared {
                debug!(external_id = %stored.external_id, "event is back at the provider");
            }
            if integration.sync_direction == SyncDirection::Bidirectional
                && self.resolve_conflict(ctx, stored, &canonical).await?
            {
                return Ok(());
            }
        }

        let cancelled = canonical.cancelled;
        let mut row = ImportedEvent::from_canonical(integration, canonical);
        let mut rejected = false;
        if let Some(stored) = &existing {
            row.mapped_class_id = stored.mapped_class_id.clone();
            row.mapped_schedule_id = stored.mapped_schedule_id.clone();
            if skip_reason_of(stored) == Some(REASON_REJECTED) {
                row.migration_status = stored.migration_status;
                row.error_details = stored.error_details.clone();
                rejected = true;
            }
        }
        if cancelled && !rejected {
            row.skip(REASON_CANCELLED_AT_PROVIDER);
        }

        let stored = self.events.upsert(&row).await?;
        {
            let mut result = ctx.result.lock();
            result.successfully_imported += 1;
            if rejected {
                debug!(external_id = %stored.external_id, "changed event keeps its rejection");
                result.record_skip(&stored.external_id, REASON_REJECTED);
                return Ok(());
            }
            if cancelled {
                debug!(external_id = %stored.external_id, "cancelled at provider");
                result.record_skip(&stored.external_id, REASON_CANCELLED_AT_PROVIDER);
                return Ok(());
            }
        }

        match self.pipeline.apply(&stored, &mut ctx.catalog).await {
            Ok(mapping) => {
                if let Some(schedule_id) = &mapping.mapped_schedule_id {
                    ctx.touched.insert(schedule_id.clone());
                }
                ctx.result.lock().record_mapping(mapping);
            }
            Err(err) => {
                warn!(external_id = %stored.external_id, error = %err, "mapping failed");
                ctx.result.lock().record_error(Some(&stored.external_id), &err);
            }
        }
        Ok(())
    }

    /// Booking counts, the raw payload and the provider timestamp change
    /// without changing the content hash; they are written on every fetch
    /// while the migration columns stay as they are.
    async fn refresh_unhashed(&self, stored: &ImportedEvent, incoming: &CanonicalEvent) -> Result<()> {
        if stored.current_participants == incoming.current_participants
            && stored.raw_data == incoming.raw_data
            && stored.remote_updated_at == incoming.remote_updated_at
        {
            return Ok(());
        }
        let mut row = stored.clone();
        row.current_participants = incoming.current_participants;
        row.raw_data = incoming.raw_data.clone();
        row.remote_updated_at = incoming.remote_updated_at;
        row.updated_at = Utc::now();
        self.events.upsert(&row).await?;
        Ok(())
    }

    /// Returns true when the conflict was handled and the incoming version
    /// must not be stored.
    async fn resolve_conflict(
        &self,
        ctx: &mut RunContext<'_>,
        stored: &ImportedEvent,
        incoming: &CanonicalEvent,
    ) -> Result<bool> {
        let Some(schedule) = stored
            .mapped_schedule_id
            .as_deref()
            .and_then(|id| ctx.catalog.schedules.iter().find(|s| s.id == id))
            .cloned()
        else {
            return Ok(false);
        };
        if !ConflictResolver::is_conflict(stored, &schedule, incoming, ctx.integration.last_sync_at) {
            return Ok(false);
        }

        match ConflictResolver::new(ctx.integration.conflict_policy).resolve(stored, &schedule, incoming) {
            Resolution::PushLocal(local) => {
                info!(external_id = %stored.external_id, "conflict: pushing local schedule");
                let native = self.push_update(ctx, &stored.external_id, &local).await?;
                self.store_pushed(ctx, stored, &native).await?;
                ctx.touched.insert(schedule.id);
                Ok(true)
            }
            Resolution::AcceptRemote => {
                info!(external_id = %stored.external_id, "conflict: accepting remote version");
                Ok(false)
            }
            Resolution::Review(record) => {
                info!(external_id = %stored.external_id, schedule_id = %record.schedule_id, "conflict left for review");
                ctx.touched.insert(record.schedule_id.clone());
                ctx.result.lock().record_conflict(record);
                Ok(true)
            }
        }
    }

    async fn push_update(
        &self,
        ctx: &mut RunContext<'_>,
        external_id: &str,
        event: &CanonicalEvent,
    ) -> Result<NativeEvent> {
        let adapter = Arc::clone(&ctx.adapter);
        let integration = ctx.integration;
        let settings = &integration.settings;
        self.call_provider(ctx, |token| {
            let adapter = Arc::clone(&adapter);
            async move { adapter.update_event(&token, external_id, event, settings).await }
        })
        .await
    }

    /// Store the provider's copy of an exported event so the next fetch
    /// sees no content change.
    async fn store_pushed(
        &self,
        ctx: &mut RunContext<'_>,
        previous: &ImportedEvent,
        native: &NativeEvent,
    ) -> Result<()> {
        let pushed = ctx.adapter.to_canonical(native, &ctx.integration.settings)?;
        let mut row = ImportedEvent::from_canonical(ctx.integration, pushed);
        row.migration_status = previous.migration_status;
        row.mapped_class_id = previous.mapped_class_id.clone();
        row.mapped_schedule_id = previous.mapped_schedule_id.clone();
        row.error_details = previous.error_details.clone();
        self.events.upsert(&row).await?;
        ctx.result.lock().exported_events += 1;
        Ok(())
    }

    #[instrument(skip_all, fields(integration_id = %ctx.integration.id))]
    async fn export_phase(&self, ctx: &mut RunContext<'_>) -> Result<()> {
        let integration = ctx.integration;
        if !ctx.adapter.supports_export() {
            let err = StudioSyncError::Config(format!(
                "{} does not accept exported events",
                integration.provider
            ));
            warn!(provider = %integration.provider, "export skipped: provider is read-only");
            ctx.result.lock().error_details.push(ErrorDetail::new(None, &err));
            return Ok(());
        }

        let changes = self
            .catalog
            .schedule_changes_since(&integration.studio_id, integration.last_sync_at)
            .await?;
        debug!(count = changes.len(), "local schedule changes to export");

        for change in changes {
            if ctx.touched.contains(&change.schedule.id) {
                continue;
            }
            let linked = self.events.find_by_schedule(&integration.id, &change.schedule.id).await?;
            if let Err(err) = self.export_change(ctx, &change, linked.as_ref()).await {
                if aborts_run(&err) {
                    return Err(err);
                }
                warn!(schedule_id = %change.schedule.id, error = %err, "export of schedule failed");
                let external_id = linked.as_ref().map(|e| e.external_id.as_str());
                ctx.result.lock().record_error(external_id, &err);
            }
        }
        Ok(())
    }

    async fn export_change(
        &self,
        ctx: &mut RunContext<'_>,
        change: &ScheduleChange,
        linked: Option<&ImportedEvent>,
    ) -> Result<()> {
        let adapter = Arc::clone(&ctx.adapter);
        let integration = ctx.integration;
        let settings = &integration.settings;

        match (change.deleted, linked) {
            (true, None) => Ok(()),
            (true, Some(event)) => {
                let external_id = event.external_id.as_str();
                let deleted = self
                    .call_provider(ctx, |token| {
                        let adapter = Arc::clone(&adapter);
                        async move { adapter.delete_event(&token, external_id, settings).await }
                    })
                    .await;
                match deleted {
                    Ok(()) => {}
                    Err(StudioSyncError::Provider(err)) if err.kind == ProviderErrorKind::NotFound => {
                        debug!(external_id, "already gone at provider");
                    }
                    Err(err) => return Err(err),
                }
                let update = MigrationUpdate {
                    status: MigrationStatus::Skipped,
                    mapped_class_id: event.mapped_class_id.clone(),
                    mapped_schedule_id: event.mapped_schedule_id.clone(),
                    error_details: Some(json!({ "reason": REASON_DELETED_LOCALLY })),
                };
                self.events.update_migration(&event.id, &update).await?;
                ctx.result.lock().exported_events += 1;
                Ok(())
            }
            (false, Some(event)) => {
                let local = local_version(event, &change.schedule);
                if local.content_hash() == event.content_hash {
                    return Ok(());
                }
                let native = self.push_update(ctx, &event.external_id, &local).await?;
                self.store_pushed(ctx, event, &native).await
            }
            (false, None) => {
                let schedule = &change.schedule;
                let canonical = CanonicalEvent {
                    title: change.class_name.clone(),
                    description: change.class_description.clone(),
                    start_time: schedule.start_time,
                    end_time: schedule.end_time,
                    location: schedule.location.clone(),
                    ..CanonicalEvent::default()
                };
                let native = self
                    .call_provider(ctx, |token| {
                        let adapter = Arc::clone(&adapter);
                        let canonical = &canonical;
                        async move { adapter.create_event(&token, canonical, settings).await }
                    })
                    .await?;

                let created = ctx.adapter.to_canonical(&native, settings)?;
                let mut row = ImportedEvent::from_canonical(ctx.integration, created);
                row.migration_status = MigrationStatus::Imported;
                row.mapped_class_id = Some(schedule.class_id.clone());
                row.mapped_schedule_id = Some(schedule.id.clone());
                let row = self.events.upsert(&row).await?;
                debug!(external_id = %row.external_id, schedule_id = %schedule.id, "schedule exported");
                ctx.result.lock().exported_events += 1;
                Ok(())
            }
        }
    }
}

fn skip_reason(integration: &CalendarIntegration) -> Option<&'static str> {
    if !integration.sync_enabled {
        Some("sync disabled")
    } else if integration.requires_reauth {
        Some("re-authorization required")
    } else if integration.sync_status == SyncStatus::Paused {
        Some("sync paused")
    } else {
        None
    }
}

/// `reason` recorded on a skipped row.
fn skip_reason_of(event: &ImportedEvent) -> Option<&str> {
    if event.migration_status != MigrationStatus::Skipped {
        return None;
    }
    event.error_details.as_ref()?.get("reason")?.as_str()
}

/// Errors that end the whole run instead of a single event.
fn aborts_run(err: &StudioSyncError) -> bool {
    err.is_transient()
        || err.is_unauthorized()
        || matches!(err, StudioSyncError::Auth(_) | StudioSyncError::Database(_))
}
