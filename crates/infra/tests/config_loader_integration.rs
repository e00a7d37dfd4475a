//! Configuration files driving the worker's wiring.

use std::fs;
use std::time::Duration;

use studiosync_domain::constants::DEFAULT_PAST_DAYS;
use studiosync_domain::{CalendarProvider, StudioSyncError};
use studiosync_infra::config::load_from_file;
use studiosync_infra::{build_registry, DbManager, HttpClient, SyncSchedulerConfig};
use tempfile::TempDir;

#[test]
fn toml_file_configures_database_scheduler_and_providers() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("engine.db");
    let config_path = dir.path().join("studiosync.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[database]
path = "{}"
pool_size = 2

[sync]
cron = "0 */10 * * * *"
future_days = 60
run_timeout_secs = 120

[mapping]
auto_import = false

[providers.google]
client_id = "google-app"
base_url = "http://127.0.0.1:9/calendar"

[providers.mindbody]
client_id = "mb-app"
api_key = "mb-key"
"#,
            db_path.display().to_string().replace('\\', "/")
        ),
    )
    .unwrap();

    let config = load_from_file(Some(config_path)).unwrap();
    assert_eq!(config.sync.future_days, 60);
    assert_eq!(config.sync.past_days, DEFAULT_PAST_DAYS);
    assert!(!config.mapping.auto_import);
    assert!(config.providers.google.is_configured());
    assert!(!config.providers.outlook.is_configured());

    let db = DbManager::open(&config.database).unwrap();
    db.health_check().unwrap();
    assert!(db_path.exists());

    let scheduler = SyncSchedulerConfig::from_sync_config(&config.sync);
    assert_eq!(scheduler.cron_expression, "0 */10 * * * *");
    assert_eq!(scheduler.job_timeout, Duration::from_secs(180));

    let registry = build_registry(&config.providers, HttpClient::new().unwrap()).unwrap();
    assert!(registry.get(CalendarProvider::Mindbody).is_ok());
    assert!(registry.get(CalendarProvider::Google).is_ok());
}

#[test]
fn json_file_with_mistyped_value_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("config.json");
    fs::write(&config_path, r#"{ "database": { "path": "x.db" }, "sync": { "past_days": "seven" } }"#)
        .unwrap();

    let err = load_from_file(Some(config_path)).unwrap_err();
    assert!(matches!(err, StudioSyncError::Config(_)));
}

#[test]
fn missing_file_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    let err = load_from_file(Some(dir.path().join("absent.toml"))).unwrap_err();
    assert!(matches!(err, StudioSyncError::Config(message) if message.contains("not found")));
}
