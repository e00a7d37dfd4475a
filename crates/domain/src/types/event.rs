//! Canonical and persisted event representations

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::integration::{CalendarIntegration, CalendarProvider};
use crate::impl_domain_status_conversions;

/// Lifecycle stage of an imported event on its way to a native schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStatus {
    #[default]
    Pending,
    Mapped,
    Imported,
    Error,
    Skipped,
}

impl_domain_status_conversions!(MigrationStatus {
    Pending => "pending",
    Mapped => "mapped",
    Imported => "imported",
    Error => "error",
    Skipped => "skipped",
});

impl MigrationStatus {
    /// Pending and mapped events can still move forward.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Mapped)
    }

    /// Allowed pipeline and review transitions.
    ///
    /// `pending -> mapped -> imported`; `error` and `skipped` from any
    /// non-terminal state; `error -> pending` for a manual retry.
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Pending, Self::Mapped) | (Self::Mapped, Self::Imported) => true,
            (Self::Pending | Self::Mapped, Self::Error | Self::Skipped) => true,
            (Self::Error, Self::Pending) => true,
            _ => false,
        }
    }
}

/// Provider-independent event fields produced by an adapter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CanonicalEvent {
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub all_day: bool,
    pub instructor_name: Option<String>,
    pub instructor_email: Option<String>,
    pub location: Option<String>,
    pub room: Option<String>,
    pub category: Option<String>,
    pub skill_level: Option<String>,
    pub max_participants: Option<u32>,
    pub current_participants: Option<u32>,
    /// Price in minor currency units.
    pub price: Option<i64>,
    pub material_fee: Option<i64>,
    /// Provider cancelled the booking; stored, then skipped.
    pub cancelled: bool,
    pub remote_updated_at: Option<DateTime<Utc>>,
    pub raw_data: serde_json::Value,
}

/// Subset of fields that decide whether an event needs re-mapping.
#[derive(Serialize)]
struct HashedFields<'a> {
    title: &'a str,
    description: Option<&'a str>,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    all_day: bool,
    instructor_name: Option<&'a str>,
    instructor_email: Option<&'a str>,
    location: Option<&'a str>,
    room: Option<&'a str>,
    category: Option<&'a str>,
    skill_level: Option<&'a str>,
    max_participants: Option<u32>,
    price: Option<i64>,
    material_fee: Option<i64>,
    cancelled: bool,
}

impl CanonicalEvent {
    /// Stable hash of the mapping-relevant content.
    ///
    /// `raw_data`, `current_participants` and `remote_updated_at` are left
    /// out so booking counts and provider etags do not trigger re-mapping.
    pub fn content_hash(&self) -> String {
        let fields = HashedFields {
            title: &self.title,
            description: self.description.as_deref(),
            start_time: self.start_time,
            end_time: self.end_time,
            all_day: self.all_day,
            instructor_name: self.instructor_name.as_deref(),
            instructor_email: self.instructor_email.as_deref(),
            location: self.location.as_deref(),
            room: self.room.as_deref(),
            category: self.category.as_deref(),
            skill_level: self.skill_level.as_deref(),
            max_participants: self.max_participants,
            price: self.price,
            material_fee: self.material_fee,
            cancelled: self.cancelled,
        };
        // Serializing a struct of plain fields cannot fail.
        let bytes = serde_json::to_vec(&fields).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }
}

/// One ingested external event, unique per (integration, external id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedEvent {
    pub id: String,
    pub integration_id: String,
    pub studio_id: String,
    pub provider: CalendarProvider,
    pub external_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub all_day: bool,
    pub instructor_name: Option<String>,
    pub instructor_email: Option<String>,
    pub location: Option<String>,
    pub room: Option<String>,
    pub category: Option<String>,
    pub skill_level: Option<String>,
    pub max_participants: Option<u32>,
    pub current_participants: Option<u32>,
    pub price: Option<i64>,
    pub material_fee: Option<i64>,
    pub raw_data: serde_json::Value,
    pub content_hash: String,
    pub remote_updated_at: Option<DateTime<Utc>>,
    pub migration_status: MigrationStatus,
    pub mapped_class_id: Option<String>,
    pub mapped_schedule_id: Option<String>,
    pub error_details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportedEvent {
    /// Fresh pending row for `canonical` under `integration`.
    pub fn from_canonical(integration: &CalendarIntegration, canonical: CanonicalEvent) -> Self {
        let now = Utc::now();
        let content_hash = canonical.content_hash();
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            integration_id: integration.id.clone(),
            studio_id: integration.studio_id.clone(),
            provider: integration.provider,
            external_id: canonical.external_id,
            title: canonical.title,
            description: canonical.description,
            start_time: canonical.start_time,
            end_time: canonical.end_time,
            all_day: canonical.all_day,
            instructor_name: canonical.instructor_name,
            instructor_email: canonical.instructor_email,
            location: canonical.location,
            room: canonical.room,
            category: canonical.category,
            skill_level: canonical.skill_level,
            max_participants: canonical.max_participants,
            current_participants: canonical.current_participants,
            price: canonical.price,
            material_fee: canonical.material_fee,
            raw_data: canonical.raw_data,
            content_hash,
            remote_updated_at: canonical.remote_updated_at,
            migration_status: MigrationStatus::Pending,
            mapped_class_id: None,
            mapped_schedule_id: None,
            error_details: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Canonical view of the stored row.
    pub fn to_canonical(&self) -> CanonicalEvent {
        CanonicalEvent {
            external_id: self.external_id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            start_time: self.start_time,
            end_time: self.end_time,
            all_day: self.all_day,
            instructor_name: self.instructor_name.clone(),
            instructor_email: self.instructor_email.clone(),
            location: self.location.clone(),
            room: self.room.clone(),
            category: self.category.clone(),
            skill_level: self.skill_level.clone(),
            max_participants: self.max_participants,
            current_participants: self.current_participants,
            price: self.price,
            material_fee: self.material_fee,
            cancelled: false,
            remote_updated_at: self.remote_updated_at,
            raw_data: self.raw_data.clone(),
        }
    }

    /// Marks the row skipped with a machine-readable reason.
    pub fn skip(&mut self, reason: &str) {
        self.migration_status = MigrationStatus::Skipped;
        self.error_details = Some(serde_json::json!({ "reason": reason }));
        self.updated_at = Utc::now();
    }

    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }
}

/// Time range fetched by one sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SyncWindow {
    /// `[now - past_days, now + future_days]`
    pub fn around(now: DateTime<Utc>, past_days: i64, future_days: i64) -> Self {
        Self { start: now - Duration::days(past_days), end: now + Duration::days(future_days) }
    }

    /// True when `[start, end)` of an event overlaps the window.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        start <= self.end && end >= self.start
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample() -> CanonicalEvent {
        CanonicalEvent {
            external_id: "evt-1".into(),
            title: "Wheel Throwing".into(),
            start_time: Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            raw_data: serde_json::json!({"etag": "a"}),
            ..CanonicalEvent::default()
        }
    }

    #[test]
    fn hash_ignores_raw_payload_and_booking_counts() {
        let a = sample();
        let mut b = sample();
        b.raw_data = serde_json::json!({"etag": "b"});
        b.current_participants = Some(4);
        assert_eq!(a.content_hash(), b.content_hash());

        b.title = "Wheel Throwing II".into();
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn state_machine_edges() {
        use MigrationStatus::{Error, Imported, Mapped, Pending, Skipped};
        assert!(Pending.can_transition_to(Mapped));
        assert!(Mapped.can_transition_to(Imported));
        assert!(Pending.can_transition_to(Skipped));
        assert!(Mapped.can_transition_to(Error));
        assert!(Error.can_transition_to(Pending));

        assert!(!Pending.can_transition_to(Imported));
        assert!(!Imported.can_transition_to(Pending));
        assert!(!Skipped.can_transition_to(Mapped));
        assert!(!Error.can_transition_to(Mapped));
    }

    #[test]
    fn window_is_centered_on_now() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let window = SyncWindow::around(now, 30, 90);
        assert_eq!(window.start, now - Duration::days(30));
        assert_eq!(window.end, now + Duration::days(90));
        assert!(window.overlaps(now, now + Duration::hours(1)));
        assert!(!window.overlaps(now - Duration::days(40), now - Duration::days(39)));
    }
}
