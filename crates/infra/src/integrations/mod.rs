//! External service integrations: provider adapters and the OAuth client.

pub mod oauth;
pub mod providers;

use std::sync::Arc;

use studiosync_core::ProviderRegistry;
use studiosync_domain::{CalendarProvider, ProvidersConfig, Result};
use tracing::debug;

use crate::http::HttpClient;

pub use oauth::HttpOAuthClient;
pub use providers::{
    AcuityAdapter, CalendlyAdapter, GoogleCalendarAdapter, MindbodyAdapter,
    OutlookCalendarAdapter, SquareAdapter,
};

/// Registry with every adapter, pointed at configured base URL overrides.
///
/// Apple has no adapter; looking it up yields a `Config` error.
pub fn build_registry(providers: &ProvidersConfig, http: HttpClient) -> Result<ProviderRegistry> {
    let base = |provider: CalendarProvider| {
        providers.get(provider).and_then(|client| client.base_url.as_deref())
    };

    let registry = ProviderRegistry::new()
        .with_adapter(Arc::new(GoogleCalendarAdapter::new(http.clone(), base(CalendarProvider::Google))))
        .with_adapter(Arc::new(OutlookCalendarAdapter::new(http.clone(), base(CalendarProvider::Outlook))?))
        .with_adapter(Arc::new(CalendlyAdapter::new(http.clone(), base(CalendarProvider::Calendly))))
        .with_adapter(Arc::new(SquareAdapter::new(http.clone(), base(CalendarProvider::Square))?))
        .with_adapter(Arc::new(MindbodyAdapter::new(
            http.clone(),
            base(CalendarProvider::Mindbody),
            providers.mindbody.api_key.as_deref(),
        )?))
        .with_adapter(Arc::new(AcuityAdapter::new(http, base(CalendarProvider::Acuity))));

    debug!(providers = ?registry.providers(), "provider registry built");
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use studiosync_domain::StudioSyncError;

    use super::*;

    #[test]
    fn registry_covers_every_provider_but_apple() {
        let registry = build_registry(&ProvidersConfig::default(), HttpClient::new().unwrap()).unwrap();
        assert_eq!(registry.providers().len(), 6);
        assert!(matches!(registry.get(CalendarProvider::Apple), Err(StudioSyncError::Config(_))));
        assert!(registry.get(CalendarProvider::Square).unwrap().provider() == CalendarProvider::Square);
    }
}
