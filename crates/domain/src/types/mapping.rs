//! Mapping suggestions and run summaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::MigrationStatus;
use crate::errors::StudioSyncError;

/// Pipeline verdict for one imported event. Not persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMapping {
    pub event_id: String,
    pub external_id: String,
    pub suggested_class_id: Option<String>,
    pub suggested_instructor_id: Option<String>,
    pub confidence_score: f64,
    /// Contributing signals, strongest first.
    pub mapping_reasons: Vec<String>,
    pub requires_manual_review: bool,
    /// Status the pipeline decided on.
    pub migration_status: MigrationStatus,
    pub mapped_schedule_id: Option<String>,
}

/// Per-event failure collected during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub external_id: Option<String>,
    /// Error variant name (`Validation`, `Mapping`, ...).
    pub kind: String,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(external_id: Option<&str>, error: &StudioSyncError) -> Self {
        let kind = match error {
            StudioSyncError::Database(_) => "Database",
            StudioSyncError::Config(_) => "Config",
            StudioSyncError::Network(_) => "Network",
            StudioSyncError::Auth(_) => "Auth",
            StudioSyncError::Provider(_) => "Provider",
            StudioSyncError::Validation(_) => "Validation",
            StudioSyncError::Mapping(_) => "Mapping",
            StudioSyncError::ConflictUnresolved(_) => "ConflictUnresolved",
            StudioSyncError::NotFound(_) => "NotFound",
            StudioSyncError::InvalidInput(_) => "InvalidInput",
            StudioSyncError::Internal(_) => "Internal",
        };
        Self {
            external_id: external_id.map(str::to_string),
            kind: kind.to_string(),
            message: error.to_string(),
        }
    }
}

/// A bidirectional conflict left for a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub event_id: String,
    pub external_id: String,
    pub schedule_id: String,
    pub local_updated_at: DateTime<Utc>,
    pub remote_updated_at: Option<DateTime<Utc>>,
}

/// Event stored by a run but deliberately left out of mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedEvent {
    pub external_id: String,
    /// Machine-readable reason, the same value written to `error_details`.
    pub reason: String,
}

/// Summary of one sync run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImportResult {
    pub total_events: usize,
    /// New or content-changed rows written.
    pub successfully_imported: usize,
    pub failed_imports: usize,
    pub requires_review: usize,
    /// Re-fetched events whose content did not change.
    pub duplicate_events: usize,
    pub error_details: Vec<ErrorDetail>,
    /// Cancelled, removed or reviewer-rejected events this run touched.
    #[serde(default)]
    pub skipped_events: Vec<SkippedEvent>,
    pub mapping_suggestions: Vec<EventMapping>,
    pub conflicts: Vec<ConflictRecord>,
    pub exported_events: usize,
}

impl ImportResult {
    pub fn record_error(&mut self, external_id: Option<&str>, error: &StudioSyncError) {
        self.failed_imports += 1;
        self.error_details.push(ErrorDetail::new(external_id, error));
    }

    pub fn record_skip(&mut self, external_id: &str, reason: &str) {
        self.skipped_events
            .push(SkippedEvent { external_id: external_id.to_string(), reason: reason.to_string() });
    }

    pub fn record_mapping(&mut self, mapping: EventMapping) {
        if mapping.requires_manual_review {
            self.requires_review += 1;
        }
        self.mapping_suggestions.push(mapping);
    }

    pub fn record_conflict(&mut self, conflict: ConflictRecord) {
        self.requires_review += 1;
        self.conflicts.push(conflict);
    }
}
