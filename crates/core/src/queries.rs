//! Read-only views for the studio portal

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use studiosync_domain::{
    CalendarIntegration, CalendarProvider, ConflictPolicy, ImportedEvent, Result, StudioSyncError,
    SyncDirection, SyncStatus,
};

use crate::credentials::ports::IntegrationRepository;
use crate::mapping::ports::EventRepository;

/// Integration without its credentials.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrationSummary {
    pub id: String,
    pub studio_id: String,
    pub provider: CalendarProvider,
    pub provider_account_id: Option<String>,
    pub connected: bool,
    pub sync_enabled: bool,
    pub sync_direction: SyncDirection,
    pub conflict_policy: ConflictPolicy,
    pub sync_status: SyncStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub requires_reauth: bool,
    pub running: bool,
}

impl From<&CalendarIntegration> for IntegrationSummary {
    fn from(integration: &CalendarIntegration) -> Self {
        Self {
            id: integration.id.clone(),
            studio_id: integration.studio_id.clone(),
            provider: integration.provider,
            provider_account_id: integration.provider_account_id.clone(),
            connected: integration.credentials.access_token.is_some(),
            sync_enabled: integration.sync_enabled,
            sync_direction: integration.sync_direction,
            conflict_policy: integration.conflict_policy,
            sync_status: integration.sync_status,
            last_sync_at: integration.last_sync_at,
            error_message: integration.error_message.clone(),
            requires_reauth: integration.requires_reauth,
            running: integration.running_since.is_some(),
        }
    }
}

pub struct IntegrationQueries {
    integrations: Arc<dyn IntegrationRepository>,
    events: Arc<dyn EventRepository>,
}

impl IntegrationQueries {
    pub fn new(integrations: Arc<dyn IntegrationRepository>, events: Arc<dyn EventRepository>) -> Self {
        Self { integrations, events }
    }

    pub async fn integrations_for_studio(&self, studio_id: &str) -> Result<Vec<IntegrationSummary>> {
        let integrations = self.integrations.list_by_studio(studio_id).await?;
        Ok(integrations.iter().map(IntegrationSummary::from).collect())
    }

    pub async fn integration(&self, integration_id: &str) -> Result<IntegrationSummary> {
        self.integrations
            .get(integration_id)
            .await?
            .map(|integration| IntegrationSummary::from(&integration))
            .ok_or_else(|| StudioSyncError::NotFound(format!("integration {integration_id}")))
    }

    /// Imported events of a studio overlapping `[start, end]`.
    pub async fn events_for_studio(
        &self,
        studio_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ImportedEvent>> {
        if end < start {
            return Err(StudioSyncError::InvalidInput("end is before start".into()));
        }
        self.events.list_by_studio(studio_id, start, end).await
    }

    pub async fn events_awaiting_review(&self, studio_id: &str) -> Result<Vec<ImportedEvent>> {
        self.events.list_awaiting_review(studio_id).await
    }
}
