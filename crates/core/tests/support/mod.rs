//! Shared test helpers for `studiosync-core` integration tests.
//!
//! Fixtures and in-memory mocks so tests can focus on behaviour instead of
//! wiring.

#![allow(dead_code)]

pub mod oauth;
pub mod providers;
pub mod repositories;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use studiosync_common::{BackoffStrategy, Jitter, RetryConfig};
use studiosync_core::{
    CredentialStore, MappingPipeline, ProviderRegistry, SyncOptions, SyncOrchestrator,
};
use studiosync_domain::{
    CalendarIntegration, CalendarProvider, CatalogClass, IntegrationCredentials, MappingConfig,
};

pub use oauth::FakeTokenClient;
pub use providers::{fake_event, FakeAdapter};
pub use repositories::{
    InMemoryCatalogRepository, InMemoryEventRepository, InMemoryIntegrationRepository,
    InMemoryStateStore,
};

pub const STUDIO: &str = "studio-1";
pub const INTEGRATION: &str = "int-1";

/// An enabled integration whose token is valid for another hour.
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

pub fn class(id: &str, name: &str, email: Option<&str>, category: Option<&str>) -> CatalogClass {
    CatalogClass {
        id: id.into(),
        studio_id: STUDIO.into(),
        name: name.into(),
        category: category.map(str::to_string),
        instructor_id: None,
        instructor_email: email.map(str::to_string),
    }
}

/// Hours from now, truncated to the second so RFC 3339 round-trips.
pub fn at(hours_from_now: i64) -> DateTime<Utc> {
    let now = Utc::now();
    let base = Utc.timestamp_opt(now.timestamp(), 0).single().unwrap_or(now);
    base + chrono::Duration::hours(hours_from_now)
}

/// Options with millisecond backoff so retry tests stay fast.
pub fn fast_options() -> SyncOptions {
    SyncOptions {
        retry: RetryConfig {
            max_attempts: 3,
            backoff: BackoffStrategy::Fixed(Duration::from_millis(1)),
            jitter: Jitter::None,
        },
        max_retry_delay: Duration::from_millis(5),
        ..SyncOptions::default()
    }
}

/// Everything an orchestrator test needs, wired with in-memory ports.
pub struct Harness {
    pub integrations: InMemoryIntegrationRepository,
    pub events: InMemoryEventRepository,
    pub catalog: InMemoryCatalogRepository,
    pub client: FakeTokenClient,
    pub adapter: FakeAdapter,
    pub credentials: Arc<CredentialStore>,
    pub pipeline: Arc<MappingPipeline>,
    pub orchestrator: SyncOrchestrator,
}

impl Harness {
    pub fn new(integration: CalendarIntegration, adapter: FakeAdapter, catalog: InMemoryCatalogRepository) -> Self {
        Self::build(integration, adapter, catalog, FakeTokenClient::default(), MappingConfig::default(), fast_options())
    }

    pub fn build(
        integration: CalendarIntegration,
        adapter: FakeAdapter,
        catalog: InMemoryCatalogRepository,
        client: FakeTokenClient,
        mapping: MappingConfig,
        options: SyncOptions,
    ) -> Self {
        let integrations = InMemoryIntegrationRepository::with(integration);
        let events = InMemoryEventRepository::default();
        let credentials =
            Arc::new(CredentialStore::new(Arc::new(integrations.clone()), Arc::new(client.clone())));
        let pipeline = Arc::new(MappingPipeline::new(
            Arc::new(catalog.clone()),
            Arc::new(events.clone()),
            mapping,
        ));
        let registry = ProviderRegistry::new().with_adapter(Arc::new(adapter.clone()));
        let orchestrator = SyncOrchestrator::with_options(
            Arc::new(integrations.clone()),
            Arc::new(events.clone()),
            Arc::new(catalog.clone()),
            Arc::clone(&credentials),
            registry,
            Arc::clone(&pipeline),
            options,
        );
        Self { integrations, events, catalog, client, adapter, credentials, pipeline, orchestrator }
    }

    pub fn integration(&self) -> CalendarIntegration {
        self.integrations.snapshot(INTEGRATION)
    }
}
