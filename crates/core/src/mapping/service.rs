//! Mapping pipeline - turns imported events into native schedules

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use studiosync_domain::constants::{REASON_LOW_CONFIDENCE, REASON_REJECTED};
use studiosync_domain::{
    Catalog, ClassSchedule, EventMapping, ImportedEvent, MappingConfig, MigrationStatus, Result,
    StudioSyncError,
};
use tracing::{debug, info, instrument, warn};

use super::ports::{CatalogRepository, EventRepository, MigrationUpdate};
use super::scorer::evaluate;

/// Where an event's schedule ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Placement {
    /// The event's existing schedule was moved to the new times.
    Moved(String),
    Created(String),
    /// The class already has a schedule at that start time.
    SlotTaken(String),
}

/// Applies scoring verdicts and review decisions to stored events.
pub struct MappingPipeline {
    catalog: Arc<dyn CatalogRepository>,
    events: Arc<dyn EventRepository>,
    config: MappingConfig,
}

impl MappingPipeline {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        events: Arc<dyn EventRepository>,
        config: MappingConfig,
    ) -> Self {
        Self { catalog, events, config }
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    pub async fn load_catalog(&self, studio_id: &str) -> Result<Catalog> {
        self.catalog.load_catalog(studio_id).await
    }

    /// Score a pending event and persist the verdict.
    ///
    /// `catalog` is the run's snapshot and is kept in step with schedules
    /// created or moved here.
    ///
    /// # Errors
    /// `Mapping` when the verdict could not be persisted; the stored status
    /// is unchanged and any schedule created for it is removed again.
    #[instrument(skip(self, event, catalog), fields(event_id = %event.id, external_id = %event.external_id))]
    pub async fn apply(&self, event: &ImportedEvent, catalog: &mut Catalog) -> Result<EventMapping> {
        if event.migration_status != MigrationStatus::Pending {
            return Err(StudioSyncError::InvalidInput(format!(
                "event {} is {}, only pending events are mapped",
                event.id, event.migration_status
            )));
        }

        let mut mapping = evaluate(event, catalog, &self.config);
        let mut created = None;

        let update = match mapping.migration_status {
            MigrationStatus::Mapped => {
                let class_id = mapping.suggested_class_id.clone().unwrap_or_default();
                let linked_same_class = event
                    .mapped_schedule_id
                    .as_deref()
                    .and_then(|id| catalog.schedules.iter().find(|s| s.id == id))
                    .is_some_and(|s| s.class_id == class_id);

                if self.config.auto_import || linked_same_class {
                    let placement = self
                        .place_schedule(event, &class_id, mapping.suggested_instructor_id.clone(), catalog)
                        .await?;
                    match placement {
                        Placement::Moved(id) => {
                            mapping.migration_status = MigrationStatus::Imported;
                            mapping.mapped_schedule_id = Some(id);
                        }
                        Placement::Created(id) => {
                            mapping.migration_status = MigrationStatus::Imported;
                            mapping.mapped_schedule_id = Some(id.clone());
                            created = Some(id);
                        }
                        Placement::SlotTaken(id) => {
                            debug!(schedule_id = %id, "class already scheduled in this slot");
                            mapping.mapped_schedule_id = Some(id);
                        }
                    }
                }

                MigrationUpdate {
                    status: mapping.migration_status,
                    mapped_class_id: Some(class_id),
                    mapped_schedule_id: mapping.mapped_schedule_id.clone(),
                    error_details: None,
                }
            }
            MigrationStatus::Pending => MigrationUpdate {
                status: MigrationStatus::Pending,
                mapped_class_id: event.mapped_class_id.clone(),
                mapped_schedule_id: event.mapped_schedule_id.clone(),
                error_details: Some(review_details(&mapping)),
            },
            _ => {
                let mut details = review_details(&mapping);
                details["reason"] = json!(REASON_LOW_CONFIDENCE);
                MigrationUpdate {
                    status: MigrationStatus::Skipped,
                    mapped_class_id: event.mapped_class_id.clone(),
                    mapped_schedule_id: event.mapped_schedule_id.clone(),
                    error_details: Some(details),
                }
            }
        };

        if let Err(err) = self.events.update_migration(&event.id, &update).await {
            if let Some(schedule_id) = created {
                self.compensate(&schedule_id, catalog).await;
            }
            return Err(StudioSyncError::Mapping(format!(
                "failed to persist mapping for {}: {err}",
                event.external_id
            )));
        }

        debug!(
            status = %mapping.migration_status,
            confidence = mapping.confidence_score,
            class_id = ?mapping.suggested_class_id,
            "event mapped"
        );
        Ok(mapping)
    }

    /// Moves the event's linked schedule, reuses one in the same slot, or
    /// creates one.
    async fn place_schedule(
        &self,
        event: &ImportedEvent,
        class_id: &str,
        instructor_id: Option<String>,
        catalog: &mut Catalog,
    ) -> Result<Placement> {
        if let Some(linked) = event
            .mapped_schedule_id
            .as_deref()
            .and_then(|id| catalog.schedules.iter_mut().find(|s| s.id == id))
            .filter(|s| s.class_id == class_id)
        {
            if linked.start_time != event.start_time || linked.end_time != event.end_time {
                self.catalog.update_schedule_times(&linked.id, event.start_time, event.end_time).await?;
                linked.start_time = event.start_time;
                linked.end_time = event.end_time;
                linked.updated_at = Utc::now();
            }
            return Ok(Placement::Moved(linked.id.clone()));
        }

        if let Some(existing) =
            catalog.schedules_for(class_id).find(|s| s.start_time == event.start_time)
        {
            return Ok(Placement::SlotTaken(existing.id.clone()));
        }

        let schedule = ClassSchedule {
            id: uuid::Uuid::now_v7().to_string(),
            class_id: class_id.to_string(),
            studio_id: event.studio_id.clone(),
            start_time: event.start_time,
            end_time: event.end_time,
            instructor_id,
            location: event.location.clone(),
            updated_at: Utc::now(),
        };
        self.catalog.create_schedule(&schedule).await?;
        let id = schedule.id.clone();
        catalog.schedules.push(schedule);
        info!(schedule_id = %id, class_id, "schedule created from imported event");
        Ok(Placement::Created(id))
    }

    async fn compensate(&self, schedule_id: &str, catalog: &mut Catalog) {
        catalog.schedules.retain(|s| s.id != schedule_id);
        if let Err(err) = self.catalog.delete_schedule(schedule_id).await {
            warn!(schedule_id, error = %err, "failed to remove schedule of unpersisted mapping");
        }
    }

    async fn load_event(&self, event_id: &str) -> Result<ImportedEvent> {
        self.events
            .get(event_id)
            .await?
            .ok_or_else(|| StudioSyncError::NotFound(format!("imported event {event_id}")))
    }

    /// Reviewer accepts `class_id` for a pending event; it is imported
    /// straight away.
    #[instrument(skip(self))]
    pub async fn approve(&self, event_id: &str, class_id: &str) -> Result<EventMapping> {
        let event = self.load_event(event_id).await?;
        if event.migration_status != MigrationStatus::Pending {
            return Err(StudioSyncError::InvalidInput(format!(
                "event {event_id} is {}, only pending events can be approved",
                event.migration_status
            )));
        }

        let mut catalog = self.catalog.load_catalog(&event.studio_id).await?;
        let class = catalog
            .class(class_id)
            .cloned()
            .ok_or_else(|| StudioSyncError::NotFound(format!("class {class_id}")))?;
        let instructor_id = class.instructor_id.clone().or_else(|| {
            let email = event.instructor_email.as_deref()?;
            catalog.instructor_by_email(email).map(|i| i.id.clone())
        });

        let placement = self.place_schedule(&event, class_id, instructor_id.clone(), &mut catalog).await?;
        let (schedule_id, created) = match placement {
            Placement::Created(id) => (id.clone(), Some(id)),
            Placement::Moved(id) | Placement::SlotTaken(id) => (id, None),
        };

        let update = MigrationUpdate {
            status: MigrationStatus::Imported,
            mapped_class_id: Some(class_id.to_string()),
            mapped_schedule_id: Some(schedule_id.clone()),
            error_details: None,
        };
        if let Err(err) = self.events.update_migration(event_id, &update).await {
            if let Some(id) = created {
                self.compensate(&id, &mut catalog).await;
            }
            return Err(StudioSyncError::Mapping(format!("failed to persist approval: {err}")));
        }

        info!(class_id, schedule_id = %schedule_id, "pending event approved");
        Ok(EventMapping {
            event_id: event.id,
            external_id: event.external_id,
            suggested_class_id: Some(class_id.to_string()),
            suggested_instructor_id: instructor_id,
            confidence_score: 1.0,
            mapping_reasons: vec!["approved by reviewer".to_string()],
            requires_manual_review: false,
            migration_status: MigrationStatus::Imported,
            mapped_schedule_id: Some(schedule_id),
        })
    }

    /// Reviewer discards a pending or mapped event.
    #[instrument(skip(self))]
    pub async fn reject(&self, event_id: &str) -> Result<()> {
        let event = self.load_event(event_id).await?;
        if !event.migration_status.can_transition_to(MigrationStatus::Skipped) {
            return Err(StudioSyncError::InvalidInput(format!(
                "event {event_id} is {} and cannot be rejected",
                event.migration_status
            )));
        }

        let update = MigrationUpdate {
            status: MigrationStatus::Skipped,
            mapped_class_id: event.mapped_class_id,
            mapped_schedule_id: event.mapped_schedule_id,
            error_details: Some(json!({ "reason": REASON_REJECTED })),
        };
        self.events.update_migration(event_id, &update).await?;
        info!("event rejected by reviewer");
        Ok(())
    }

    /// Put a failed event back to pending and map it again.
    #[instrument(skip(self))]
    pub async fn retry(&self, event_id: &str) -> Result<EventMapping> {
        let mut event = self.load_event(event_id).await?;
        if !event.migration_status.can_transition_to(MigrationStatus::Pending) {
            return Err(StudioSyncError::InvalidInput(format!(
                "event {event_id} is {}, only failed events can be retried",
                event.migration_status
            )));
        }

        let update = MigrationUpdate {
            status: MigrationStatus::Pending,
            mapped_class_id: event.mapped_class_id.clone(),
            mapped_schedule_id: event.mapped_schedule_id.clone(),
            error_details: None,
        };
        self.events.update_migration(event_id, &update).await?;
        event.migration_status = MigrationStatus::Pending;
        event.error_details = None;

        let mut catalog = self.catalog.load_catalog(&event.studio_id).await?;
        self.apply(&event, &mut catalog).await
    }
}

fn review_details(mapping: &EventMapping) -> Value {
    json!({
        "suggested_class_id": mapping.suggested_class_id,
        "confidence_score": mapping.confidence_score,
        "reasons": mapping.mapping_reasons,
    })
}
