//! Connected provider accounts and their per-provider settings

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// External scheduling system a studio can connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarProvider {
    Google,
    Outlook,
    Apple,
    Acuity,
    Mindbody,
    Calendly,
    Square,
}

impl_domain_status_conversions!(CalendarProvider {
    Google => "google",
    Outlook => "outlook",
    Apple => "apple",
    Acuity => "acuity",
    Mindbody => "mindbody",
    Calendly => "calendly",
    Square => "square",
});

/// Which way events flow between the platform and the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    #[default]
    ImportOnly,
    ExportOnly,
    Bidirectional,
}

impl_domain_status_conversions!(SyncDirection {
    ImportOnly => "import_only",
    ExportOnly => "export_only",
    Bidirectional => "bidirectional",
});

impl SyncDirection {
    pub const fn imports(self) -> bool {
        matches!(self, Self::ImportOnly | Self::Bidirectional)
    }

    pub const fn exports(self) -> bool {
        matches!(self, Self::ExportOnly | Self::Bidirectional)
    }
}

/// Integration-level health surfaced to the studio owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    #[default]
    Active,
    Error,
    Paused,
    Expired,
}

impl_domain_status_conversions!(SyncStatus {
    Active => "active",
    Error => "error",
    Paused => "paused",
    Expired => "expired",
});

/// Who wins when both sides changed the same event since the last sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    LocalWins,
    RemoteWins,
    #[default]
    ManualReview,
}

impl_domain_status_conversions!(ConflictPolicy {
    LocalWins => "local_wins",
    RemoteWins => "remote_wins",
    ManualReview => "manual_review",
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoogleSettings {
    #[serde(default = "primary_calendar")]
    pub calendar_id: String,
    #[serde(default = "utc_zone")]
    pub timezone: String,
    #[serde(default)]
    pub sync_attendees: bool,
    #[serde(default)]
    pub default_reminder_minutes: Option<u32>,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            calendar_id: primary_calendar(),
            timezone: utc_zone(),
            sync_attendees: false,
            default_reminder_minutes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OutlookSettings {
    /// Graph calendar id; `None` targets the default calendar.
    #[serde(default)]
    pub calendar_id: Option<String>,
    #[serde(default = "utc_zone")]
    pub timezone: String,
    #[serde(default)]
    pub sync_attendees: bool,
    #[serde(default)]
    pub default_reminder_minutes: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppleSettings {
    #[serde(default)]
    pub calendar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CalendlySettings {
    #[serde(default)]
    pub organization_uri: Option<String>,
    #[serde(default)]
    pub user_uri: Option<String>,
    #[serde(default)]
    pub default_event_types: Vec<String>,
    #[serde(default = "utc_zone")]
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SquareSettings {
    #[serde(default)]
    pub location_id: String,
    #[serde(default)]
    pub merchant_id: Option<String>,
    #[serde(default = "enabled")]
    pub sync_services: bool,
    #[serde(default = "enabled")]
    pub sync_team_members: bool,
    /// Square `service_variation_id` to internal category.
    #[serde(default)]
    pub service_categories: BTreeMap<String, String>,
    /// Service booked for schedules exported to Square.
    #[serde(default)]
    pub service_variation_id: Option<String>,
    /// Team member assigned to exported bookings.
    #[serde(default)]
    pub team_member_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MindbodySettings {
    pub site_id: String,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default = "enabled")]
    pub sync_class_schedules: bool,
    #[serde(default)]
    pub sync_appointments: bool,
    /// Mindbody staff id to local instructor id.
    #[serde(default)]
    pub staff_mapping: BTreeMap<String, String>,
    /// Mindbody reports wall-clock times in the site's zone.
    #[serde(default = "utc_zone")]
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcuitySettings {
    #[serde(default)]
    pub calendar_id: Option<String>,
    /// Acuity appointment type id to local class id.
    #[serde(default)]
    pub appointment_type_mapping: BTreeMap<String, String>,
    #[serde(default)]
    pub sync_cancellations: bool,
}

/// Provider-typed settings blob. The orchestrator passes it through as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderSettings {
    Google(GoogleSettings),
    Outlook(OutlookSettings),
    Apple(AppleSettings),
    Acuity(AcuitySettings),
    Mindbody(MindbodySettings),
    Calendly(CalendlySettings),
    Square(SquareSettings),
}

impl ProviderSettings {
    pub const fn provider(&self) -> CalendarProvider {
        match self {
            Self::Google(_) => CalendarProvider::Google,
            Self::Outlook(_) => CalendarProvider::Outlook,
            Self::Apple(_) => CalendarProvider::Apple,
            Self::Acuity(_) => CalendarProvider::Acuity,
            Self::Mindbody(_) => CalendarProvider::Mindbody,
            Self::Calendly(_) => CalendarProvider::Calendly,
            Self::Square(_) => CalendarProvider::Square,
        }
    }

    /// Empty settings for a freshly connected provider.
    pub fn default_for(provider: CalendarProvider) -> Self {
        match provider {
            CalendarProvider::Google => Self::Google(GoogleSettings::default()),
            CalendarProvider::Outlook => Self::Outlook(OutlookSettings::default()),
            CalendarProvider::Apple => Self::Apple(AppleSettings::default()),
            CalendarProvider::Acuity => Self::Acuity(AcuitySettings::default()),
            CalendarProvider::Mindbody => Self::Mindbody(MindbodySettings::default()),
            CalendarProvider::Calendly => Self::Calendly(CalendlySettings::default()),
            CalendarProvider::Square => Self::Square(SquareSettings::default()),
        }
    }
}

/// OAuth credential columns of an integration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IntegrationCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl IntegrationCredentials {
    /// True when the token expires within `margin_secs` (or already has).
    ///
    /// Tokens without an expiry never count as expiring.
    pub fn expires_within(&self, margin_secs: i64, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires_at| now + chrono::Duration::seconds(margin_secs) >= expires_at)
    }

    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none()
    }
}

/// A studio's connected account with one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarIntegration {
    pub id: String,
    pub studio_id: String,
    pub provider: CalendarProvider,
    pub provider_account_id: Option<String>,
    pub credentials: IntegrationCredentials,
    pub sync_enabled: bool,
    pub sync_direction: SyncDirection,
    pub conflict_policy: ConflictPolicy,
    pub settings: ProviderSettings,
    pub sync_status: SyncStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// Single-flight marker; set while a run owns the integration.
    pub running_since: Option<DateTime<Utc>>,
    /// Set by a terminal auth failure, cleared by a new code exchange.
    pub requires_reauth: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalendarIntegration {
    /// New, enabled, import-only integration with default settings.
    pub fn new(id: impl Into<String>, studio_id: impl Into<String>, provider: CalendarProvider) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            studio_id: studio_id.into(),
            provider,
            provider_account_id: None,
            credentials: IntegrationCredentials::default(),
            sync_enabled: true,
            sync_direction: SyncDirection::default(),
            conflict_policy: ConflictPolicy::default(),
            settings: ProviderSettings::default_for(provider),
            sync_status: SyncStatus::Active,
            last_sync_at: None,
            error_message: None,
            running_since: None,
            requires_reauth: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Account details returned by a provider at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProviderAccount {
    pub account_id: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub timezone: Option<String>,
    /// Default calendar, location or organization to sync.
    pub default_target: Option<String>,
    /// Secondary identifier (Square merchant, Calendly organization).
    pub parent_id: Option<String>,
}

fn primary_calendar() -> String {
    "primary".to_string()
}

fn utc_zone() -> String {
    "UTC".to_string()
}

const fn enabled() -> bool {
    true
}
