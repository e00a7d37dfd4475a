//! Configuration loader
//!
//! Loads engine configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. If `STUDIOSYNC_DB_PATH` is set, configuration comes from the environment
//! 2. Otherwise the loader searches for a config file (JSON or TOML)
//! 3. With no file anywhere, built-in defaults are used
//!
//! Provider client credentials are read from the environment in every case,
//! so secrets never need to live in a config file.
//!
//! ## Environment Variables
//! - `STUDIOSYNC_DB_PATH`: Database file path
//! - `STUDIOSYNC_DB_POOL_SIZE`: Connection pool size
//! - `STUDIOSYNC_SYNC_ENABLED`: Whether the periodic sync runs (true/false)
//! - `STUDIOSYNC_SYNC_CRON`: Six-field cron expression for the sync trigger
//! - `STUDIOSYNC_SYNC_PAST_DAYS` / `STUDIOSYNC_SYNC_FUTURE_DAYS`: Sync window
//! - `STUDIOSYNC_SYNC_RUN_TIMEOUT_SECS`: Per-run timeout
//! - `STUDIOSYNC_SYNC_MAX_ATTEMPTS`: Provider call attempts per run
//! - `STUDIOSYNC_<PROVIDER>_CLIENT_ID` / `_CLIENT_SECRET` / `_BASE_URL`
//! - `STUDIOSYNC_MINDBODY_API_KEY`: Mindbody site API key
//!
//! ## File Locations
//! The loader searches `studiosync.{toml,json}` then `config.{toml,json}` in
//! the working directory, its parent, and next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use studiosync_domain::{CalendarProvider, Config, Result, StudioSyncError};

const CONFIG_FILE_NAMES: &[&str] =
    &["studiosync.toml", "studiosync.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `StudioSyncError::Config` if an environment value or the config
/// file found is invalid.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            return Ok(config);
        }
        Err(e) => {
            tracing::debug!(error = %e, "environment configuration incomplete, trying file");
        }
    }

    if find_config_path().is_some() {
        return load_from_file(None);
    }

    tracing::info!("No config file found; using built-in defaults");
    let mut config = Config::default();
    apply_provider_env(&mut config)?;
    Ok(config)
}

/// Load configuration from environment variables
///
/// `STUDIOSYNC_DB_PATH` is required; every other value falls back to its
/// default.
///
/// # Errors
/// Returns `StudioSyncError::Config` if the database path is missing or a
/// value does not parse.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();
    config.database.path = env_var("STUDIOSYNC_DB_PATH")?;

    if let Some(size) = env_parse::<u32>("STUDIOSYNC_DB_POOL_SIZE")? {
        config.database.pool_size = size;
    }

    config.sync.enabled = env_bool("STUDIOSYNC_SYNC_ENABLED", config.sync.enabled);
    if let Ok(cron) = std::env::var("STUDIOSYNC_SYNC_CRON") {
        config.sync.cron = cron;
    }
    if let Some(days) = env_parse::<i64>("STUDIOSYNC_SYNC_PAST_DAYS")? {
        config.sync.past_days = days;
    }
    if let Some(days) = env_parse::<i64>("STUDIOSYNC_SYNC_FUTURE_DAYS")? {
        config.sync.future_days = days;
    }
    if let Some(secs) = env_parse::<u64>("STUDIOSYNC_SYNC_RUN_TIMEOUT_SECS")? {
        config.sync.run_timeout_secs = secs;
    }
    if let Some(attempts) = env_parse::<u32>("STUDIOSYNC_SYNC_MAX_ATTEMPTS")? {
        config.sync.max_attempts = attempts;
    }

    apply_provider_env(&mut config)?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches the standard locations.
///
/// # Errors
/// Returns `StudioSyncError::Config` if the file is missing, unreadable or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(StudioSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => find_config_path().ok_or_else(|| {
            StudioSyncError::Config("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| StudioSyncError::Config(format!("Failed to read config file: {e}")))?;

    let mut config = parse_config(&contents, &config_path)?;
    apply_provider_env(&mut config)?;
    Ok(config)
}

/// Parse configuration from string content, by file extension.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| StudioSyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| StudioSyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(StudioSyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations.
pub fn find_config_path() -> Option<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.join(".."));
        dirs.insert(0, cwd);
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        dirs.push(exe_dir);
    }

    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

/// Overlay `STUDIOSYNC_<PROVIDER>_*` client registrations.
fn apply_provider_env(config: &mut Config) -> Result<()> {
    for provider in CalendarProvider::ALL {
        let Some(client) = config.providers.get_mut(*provider) else { continue };
        let prefix = format!("STUDIOSYNC_{}", provider.as_str().to_ascii_uppercase());

        if let Ok(id) = std::env::var(format!("{prefix}_CLIENT_ID")) {
            client.client_id = id;
        }
        if let Ok(secret) = std::env::var(format!("{prefix}_CLIENT_SECRET")) {
            client.client_secret = Some(secret);
        }
        if let Ok(base) = std::env::var(format!("{prefix}_BASE_URL")) {
            url::Url::from_str(&base).map_err(|e| {
                StudioSyncError::Config(format!("Invalid {prefix}_BASE_URL: {e}"))
            })?;
            client.base_url = Some(base);
        }
        if let Ok(key) = std::env::var(format!("{prefix}_API_KEY")) {
            client.api_key = Some(key);
        }
    }
    Ok(())
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        StudioSyncError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Optional numeric variable; set but unparseable is an error.
fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| StudioSyncError::Config(format!("Invalid {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use once_cell::sync::Lazy;
    use studiosync_domain::constants::DEFAULT_FUTURE_DAYS;
    use tempfile::NamedTempFile;

    use super::*;

    static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

    const ENV_KEYS: &[&str] = &[
        "STUDIOSYNC_DB_PATH",
        "STUDIOSYNC_DB_POOL_SIZE",
        "STUDIOSYNC_SYNC_ENABLED",
        "STUDIOSYNC_SYNC_CRON",
        "STUDIOSYNC_SYNC_PAST_DAYS",
        "STUDIOSYNC_GOOGLE_CLIENT_ID",
        "STUDIOSYNC_GOOGLE_CLIENT_SECRET",
        "STUDIOSYNC_SQUARE_BASE_URL",
        "STUDIOSYNC_MINDBODY_API_KEY",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    fn temp_config(contents: &str, extension: &str) -> (NamedTempFile, PathBuf) {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(contents.as_bytes()).unwrap();
        let path = temp_file.path().with_extension(extension);
        std::fs::copy(temp_file.path(), &path).unwrap();
        (temp_file, path)
    }

    #[test]
    fn test_env_bool_parsing() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");

        std::env::set_var("STUDIOSYNC_TEST_BOOL", "YES");
        assert!(env_bool("STUDIOSYNC_TEST_BOOL", false));
        std::env::set_var("STUDIOSYNC_TEST_BOOL", "off");
        assert!(!env_bool("STUDIOSYNC_TEST_BOOL", true));
        std::env::remove_var("STUDIOSYNC_TEST_BOOL");
        assert!(env_bool("STUDIOSYNC_TEST_BOOL", true));
    }

    #[test]
    fn test_load_from_env_with_overrides() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("STUDIOSYNC_DB_PATH", "/tmp/studiosync-test.db");
        std::env::set_var("STUDIOSYNC_DB_POOL_SIZE", "3");
        std::env::set_var("STUDIOSYNC_SYNC_ENABLED", "false");
        std::env::set_var("STUDIOSYNC_SYNC_PAST_DAYS", "7");
        std::env::set_var("STUDIOSYNC_GOOGLE_CLIENT_ID", "google-client");
        std::env::set_var("STUDIOSYNC_GOOGLE_CLIENT_SECRET", "google-secret");
        std::env::set_var("STUDIOSYNC_MINDBODY_API_KEY", "mb-key");

        let config = load_from_env().unwrap();
        assert_eq!(config.database.path, "/tmp/studiosync-test.db");
        assert_eq!(config.database.pool_size, 3);
        assert!(!config.sync.enabled);
        assert_eq!(config.sync.past_days, 7);
        assert_eq!(config.sync.future_days, DEFAULT_FUTURE_DAYS);
        assert_eq!(config.providers.google.client_id, "google-client");
        assert_eq!(config.providers.google.client_secret.as_deref(), Some("google-secret"));
        assert_eq!(config.providers.mindbody.api_key.as_deref(), Some("mb-key"));

        clear_env();
    }

    #[test]
    fn test_load_from_env_missing_db_path() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let err = load_from_env().unwrap_err();
        assert!(matches!(err, StudioSyncError::Config(_)), "Should be a Config error");
    }

    #[test]
    fn test_load_from_env_invalid_number() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("STUDIOSYNC_DB_PATH", "/tmp/studiosync-test.db");
        std::env::set_var("STUDIOSYNC_DB_POOL_SIZE", "not-a-number");

        let err = load_from_env().unwrap_err();
        assert!(matches!(err, StudioSyncError::Config(_)), "Should be a Config error");

        clear_env();
    }

    #[test]
    fn test_invalid_provider_base_url() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        std::env::set_var("STUDIOSYNC_DB_PATH", "/tmp/studiosync-test.db");
        std::env::set_var("STUDIOSYNC_SQUARE_BASE_URL", "not a url");
        assert!(matches!(load_from_env(), Err(StudioSyncError::Config(_))));

        clear_env();
    }

    #[test]
    fn test_load_from_file_toml_keeps_defaults() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let (_temp, path) = temp_config(
            r#"
[database]
path = "studio.db"

[sync]
cron = "0 0 * * * *"

[providers.square]
client_id = "sq-app"
base_url = "https://connect.squareupsandbox.com"
"#,
            "toml",
        );

        let config = load_from_file(Some(path.clone())).unwrap();
        assert_eq!(config.database.path, "studio.db");
        assert_eq!(config.sync.cron, "0 0 * * * *");
        assert_eq!(config.sync.future_days, DEFAULT_FUTURE_DAYS);
        assert_eq!(
            config.providers.square.base_url.as_deref(),
            Some("https://connect.squareupsandbox.com")
        );

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_json() {
        let _guard = ENV_LOCK.lock().expect("env mutex poisoned");
        clear_env();

        let (_temp, path) = temp_config(
            r#"{ "database": { "path": "test.db", "pool_size": 4 }, "mapping": { "auto_import": false } }"#,
            "json",
        );

        let config = load_from_file(Some(path.clone())).unwrap();
        assert_eq!(config.database.pool_size, 4);
        assert!(!config.mapping.auto_import);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_load_from_file_not_found() {
        let err = load_from_file(Some(PathBuf::from("/nonexistent/studiosync.toml"))).unwrap_err();
        assert!(matches!(err, StudioSyncError::Config(_)), "Should be a Config error");
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let (_temp, path) = temp_config(r#"{ "this is": "not valid json" "#, "json");
        assert!(load_from_file(Some(path.clone())).is_err(), "Should fail with invalid JSON");
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_parse_config_unsupported_format() {
        let result = parse_config("some content", &PathBuf::from("test.yaml"));
        assert!(matches!(result, Err(StudioSyncError::Config(_))));
    }
}
