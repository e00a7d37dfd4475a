//! StudioSync worker: runs the periodic calendar sync until Ctrl-C.
//!
//! Configuration comes from the environment (a `.env` file is honoured) or a
//! `studiosync.toml` next to the working directory. Set
//! `STUDIOSYNC_LOG_JSON=1` for JSON logs.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use studiosync_core::{CredentialStore, MappingPipeline, OAuthStateStore, SyncOrchestrator, SyncOptions};
use studiosync_infra::scheduling::{SyncScheduler, SyncSchedulerConfig};
use studiosync_infra::{
    build_registry, config, observability, DbManager, HttpClient, HttpOAuthClient,
    SqliteCatalogRepository, SqliteEventRepository, SqliteIntegrationRepository,
    SqliteOAuthStateStore,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(err).context("failed to read .env");
        }
    }

    let json_logs = std::env::var("STUDIOSYNC_LOG_JSON")
        .is_ok_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"));
    observability::init_tracing(json_logs)?;

    let config = config::load().context("failed to load configuration")?;
    let db = Arc::new(DbManager::open(&config.database).context("failed to open database")?);

    let states = SqliteOAuthStateStore::new(db.clone());
    match states.purge_expired(Utc::now()).await {
        Ok(purged) if purged > 0 => info!(purged, "expired OAuth states removed"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "could not purge expired OAuth states"),
    }

    let http = HttpClient::new()?;
    let integrations = Arc::new(SqliteIntegrationRepository::new(db.clone()));
    let events = Arc::new(SqliteEventRepository::new(db.clone()));
    let catalog = Arc::new(SqliteCatalogRepository::new(db.clone()));

    let oauth = Arc::new(HttpOAuthClient::new(http.clone(), config.providers.clone()));
    let credentials = Arc::new(
        CredentialStore::new(integrations.clone(), oauth)
            .with_refresh_margin(config.sync.refresh_margin_secs),
    );
    let pipeline = Arc::new(MappingPipeline::new(catalog.clone(), events.clone(), config.mapping));
    let registry = build_registry(&config.providers, http)?;

    let orchestrator = Arc::new(SyncOrchestrator::with_options(
        integrations,
        events,
        catalog,
        credentials,
        registry,
        pipeline,
        SyncOptions::from_config(&config.sync),
    ));

    if !config.sync.enabled {
        info!("periodic sync disabled; running a single pass");
        let scheduler =
            SyncScheduler::with_config(SyncSchedulerConfig::from_sync_config(&config.sync), orchestrator);
        scheduler.run_now().await?;
        return Ok(());
    }

    let mut scheduler =
        SyncScheduler::with_config(SyncSchedulerConfig::from_sync_config(&config.sync), orchestrator);
    scheduler.start().await?;
    info!(cron = %config.sync.cron, db_path = %config.database.path, "studiosync worker running");

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    info!("shutdown requested");
    scheduler.stop().await?;
    Ok(())
}
