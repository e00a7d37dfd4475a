//! Configuration structures
//!
//! Every section has a `Default` and deserializes with `#[serde(default)]`, so
//! a config file only needs to name what it changes.

use serde::{Deserialize, Serialize};

use crate::constants::{
    AMBIGUITY_MARGIN, AUTO_MAP_THRESHOLD, DEFAULT_BASE_DELAY_MS, DEFAULT_DB_PATH,
    DEFAULT_FUTURE_DAYS, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY_MS, DEFAULT_PAST_DAYS,
    DEFAULT_POOL_SIZE, DEFAULT_RUN_TIMEOUT_SECS, DEFAULT_STALE_LOCK_SECS, DEFAULT_SYNC_CRON,
    REFRESH_MARGIN_SECS, REVIEW_THRESHOLD, WEIGHT_CATEGORY, WEIGHT_INSTRUCTOR_EMAIL,
    WEIGHT_RECURRENCE, WEIGHT_TITLE,
};
use crate::types::CalendarProvider;

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    pub mapping: MappingConfig,
    pub providers: ProvidersConfig,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: DEFAULT_DB_PATH.to_string(), pool_size: DEFAULT_POOL_SIZE }
    }
}

/// Sync run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub enabled: bool,
    /// Six-field cron expression for the periodic trigger.
    pub cron: String,
    pub past_days: i64,
    pub future_days: i64,
    pub run_timeout_secs: u64,
    /// A `running_since` older than this is treated as a crashed run.
    pub stale_lock_secs: i64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub refresh_margin_secs: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: DEFAULT_SYNC_CRON.to_string(),
            past_days: DEFAULT_PAST_DAYS,
            future_days: DEFAULT_FUTURE_DAYS,
            run_timeout_secs: DEFAULT_RUN_TIMEOUT_SECS,
            stale_lock_secs: DEFAULT_STALE_LOCK_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            refresh_margin_secs: REFRESH_MARGIN_SECS,
        }
    }
}

/// Signal weights for the confidence score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingWeights {
    pub title: f64,
    pub instructor_email: f64,
    pub category: f64,
    pub recurrence: f64,
}

impl Default for MappingWeights {
    fn default() -> Self {
        Self {
            title: WEIGHT_TITLE,
            instructor_email: WEIGHT_INSTRUCTOR_EMAIL,
            category: WEIGHT_CATEGORY,
            recurrence: WEIGHT_RECURRENCE,
        }
    }
}

/// Mapping pipeline thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    pub weights: MappingWeights,
    pub auto_map_threshold: f64,
    pub review_threshold: f64,
    pub ambiguity_margin: f64,
    /// Create a schedule for auto-mapped events whose slot is free.
    pub auto_import: bool,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            weights: MappingWeights::default(),
            auto_map_threshold: AUTO_MAP_THRESHOLD,
            review_threshold: REVIEW_THRESHOLD,
            ambiguity_margin: AMBIGUITY_MARGIN,
            auto_import: true,
        }
    }
}

/// OAuth client registration for one provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthClientConfig {
    pub client_id: String,
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    /// Overrides the provider's production API host (sandboxes, tests).
    pub base_url: Option<String>,
    /// Overrides the provider's token endpoint.
    pub token_url: Option<String>,
    /// Overrides the provider's authorization endpoint.
    pub auth_url: Option<String>,
    pub scopes: Vec<String>,
    /// Mindbody API key header.
    pub api_key: Option<String>,
}

impl OAuthClientConfig {
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty()
    }
}

/// Per-provider client registrations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub google: OAuthClientConfig,
    pub outlook: OAuthClientConfig,
    pub calendly: OAuthClientConfig,
    pub square: OAuthClientConfig,
    pub mindbody: OAuthClientConfig,
    pub acuity: OAuthClientConfig,
}

impl ProvidersConfig {
    /// Registration for `provider`; Apple has none.
    pub const fn get(&self, provider: CalendarProvider) -> Option<&OAuthClientConfig> {
        match provider {
            CalendarProvider::Google => Some(&self.google),
            CalendarProvider::Outlook => Some(&self.outlook),
            CalendarProvider::Calendly => Some(&self.calendly),
            CalendarProvider::Square => Some(&self.square),
            CalendarProvider::Mindbody => Some(&self.mindbody),
            CalendarProvider::Acuity => Some(&self.acuity),
            CalendarProvider::Apple => None,
        }
    }

    pub fn get_mut(&mut self, provider: CalendarProvider) -> Option<&mut OAuthClientConfig> {
        match provider {
            CalendarProvider::Google => Some(&mut self.google),
            CalendarProvider::Outlook => Some(&mut self.outlook),
            CalendarProvider::Calendly => Some(&mut self.calendly),
            CalendarProvider::Square => Some(&mut self.square),
            CalendarProvider::Mindbody => Some(&mut self.mindbody),
            CalendarProvider::Acuity => Some(&mut self.acuity),
            CalendarProvider::Apple => None,
        }
    }
}
