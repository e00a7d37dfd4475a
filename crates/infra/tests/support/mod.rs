//! Shared fixtures for `studiosync-infra` integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use studiosync_core::{AccessToken, IntegrationRepository};
use studiosync_domain::{
    CalendarIntegration, CalendarProvider, CatalogClass, CatalogInstructor, IntegrationCredentials,
};
use studiosync_infra::{
    DbManager, HttpClient, SqliteCatalogRepository, SqliteEventRepository,
    SqliteIntegrationRepository,
};
use tempfile::TempDir;

pub const STUDIO: &str = "studio-1";
pub const INTEGRATION: &str = "int-1";

/// Migrated SQLite database in a temp dir that lives as long as the value.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let manager =
            DbManager::new(temp_dir.path().join("studiosync.db"), 4).expect("db manager should be created");
        manager.run_migrations().expect("migrations should run");
        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }

    pub fn integrations(&self) -> SqliteIntegrationRepository {
        SqliteIntegrationRepository::new(Arc::clone(&self.manager))
    }

    pub fn events(&self) -> SqliteEventRepository {
        SqliteEventRepository::new(Arc::clone(&self.manager))
    }

    pub fn catalog(&self) -> SqliteCatalogRepository {
        SqliteCatalogRepository::new(Arc::clone(&self.manager))
    }

    /// Store an enabled integration with a token valid for another hour.
    pub async fn seed_integration(&self, provider: CalendarProvider) -> CalendarIntegration {
        let integration = integration(provider);
        self.integrations().upsert(&integration).await.expect("integration stored");
        integration
    }

    /// A "Power Yoga" class taught by sarah@x.com.
    pub async fn seed_power_yoga(&self) {
        let catalog = self.catalog();
        catalog
            .upsert_instructor(&CatalogInstructor {
                id: "i1".into(),
                studio_id: STUDIO.into(),
                name: "Sarah Lee".into(),
                email: Some("sarah@x.com".into()),
            })
            .await
            .expect("instructor stored");
        catalog
            .upsert_class(
                &CatalogClass {
                    id: "c1".into(),
                    studio_id: STUDIO.into(),
                    name: "Power Yoga".into(),
                    category: Some("yoga".into()),
                    instructor_id: Some("i1".into()),
                    instructor_email: Some("sarah@x.com".into()),
                },
                Some("Strong vinyasa flow"),
            )
            .await
            .expect("class stored");
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}

pub fn integration(provider: CalendarProvider) -> CalendarIntegration {
    let mut integration = CalendarIntegration::new(INTEGRATION, STUDIO, provider);
    integration.credentials = IntegrationCredentials {
        access_token: Some("access-0".into()),
        refresh_token: Some("refresh-0".into()),
        expires_at: Some(Utc::now() + chrono::Duration::hours(1)),
        token_type: Some("Bearer".into()),
        scope: None,
    };
    integration
}

pub fn token() -> AccessToken {
    AccessToken::new("access-0")
}

/// Client without retries so error mapping is observed directly.
pub fn http() -> HttpClient {
    HttpClient::builder().max_attempts(1).build().expect("http client should build")
}

/// Hours from now, truncated to the second so RFC 3339 round-trips.
pub fn at(hours_from_now: i64) -> DateTime<Utc> {
    let now = Utc::now();
    let base = Utc.timestamp_opt(now.timestamp(), 0).single().unwrap_or(now);
    base + chrono::Duration::hours(hours_from_now)
}
