//! Engine constants
//!
//! Defaults for every tunable. The matching `Config` sections override them.

// Credential lifecycle
pub const REFRESH_MARGIN_SECS: i64 = 300;
pub const OAUTH_STATE_TTL_SECS: i64 = 600;

// Sync window and run bounds
pub const DEFAULT_PAST_DAYS: i64 = 30;
pub const DEFAULT_FUTURE_DAYS: i64 = 90;
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_STALE_LOCK_SECS: i64 = 900;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_BASE_DELAY_MS: u64 = 500;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
pub const DEFAULT_SYNC_CRON: &str = "0 */15 * * * *";

// Mapping thresholds
pub const AUTO_MAP_THRESHOLD: f64 = 0.85;
pub const REVIEW_THRESHOLD: f64 = 0.5;
pub const AMBIGUITY_MARGIN: f64 = 0.05;

// Mapping signal weights
pub const WEIGHT_TITLE: f64 = 0.60;
pub const WEIGHT_INSTRUCTOR_EMAIL: f64 = 0.35;
pub const WEIGHT_CATEGORY: f64 = 0.15;
pub const WEIGHT_RECURRENCE: f64 = 0.10;

// Skip / error reasons recorded in `error_details`
pub const REASON_REMOVED_AT_PROVIDER: &str = "removed_at_provider";
pub const REASON_CANCELLED_AT_PROVIDER: &str = "cancelled_at_provider";
pub const REASON_LOW_CONFIDENCE: &str = "low_confidence";
pub const REASON_REJECTED: &str = "rejected_by_reviewer";
pub const REASON_DELETED_LOCALLY: &str = "deleted_locally";

// Persistence
pub const DEFAULT_DB_PATH: &str = "studiosync.db";
pub const DEFAULT_POOL_SIZE: u32 = 8;

// HTTP
pub const HTTP_TIMEOUT_SECS: u64 = 30;
pub const USER_AGENT: &str = concat!("studiosync/", env!("CARGO_PKG_VERSION"));
