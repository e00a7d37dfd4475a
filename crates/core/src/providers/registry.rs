//! Adapter lookup by provider

use std::collections::HashMap;
use std::sync::Arc;

use studiosync_domain::{CalendarProvider, Result, StudioSyncError};

use super::ports::ProviderAdapter;

/// Closed set of adapters keyed by provider.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    adapters: HashMap<CalendarProvider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `adapter` under its own provider, replacing any previous one.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    /// # Errors
    /// `Config` when no adapter is registered (Apple has none).
    pub fn get(&self, provider: CalendarProvider) -> Result<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned().ok_or_else(|| {
            StudioSyncError::Config(format!("no adapter registered for provider {provider}"))
        })
    }

    pub fn providers(&self) -> Vec<CalendarProvider> {
        let mut providers: Vec<_> = self.adapters.keys().copied().collect();
        providers.sort();
        providers
    }
}
