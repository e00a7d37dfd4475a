//! Provider adapter port
//!
//! One implementation per external scheduling system. The orchestrator only
//! sees this trait; provider differences stay behind it.

use async_trait::async_trait;
use serde_json::Value;
use studiosync_domain::{
    CalendarProvider, CanonicalEvent, ProviderAccount, ProviderSettings, Result, SyncWindow,
};

use crate::credentials::AccessToken;

/// A provider event as returned by its API.
///
/// `payload` is the provider's own JSON (possibly enriched with lookups such
/// as Square service names) and is stored as `raw_data`.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeEvent {
    pub id: Option<String>,
    pub payload: Value,
}

impl NativeEvent {
    pub fn new(payload: Value) -> Self {
        let id = payload.get("id").and_then(Value::as_str).map(str::to_string);
        Self { id, payload }
    }

    pub fn with_id(id: impl Into<String>, payload: Value) -> Self {
        Self { id: Some(id.into()), payload }
    }
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> CalendarProvider;

    /// Every event overlapping `window`, all pages drained.
    async fn list_events(
        &self,
        token: &AccessToken,
        window: &SyncWindow,
        settings: &ProviderSettings,
    ) -> Result<Vec<NativeEvent>>;

    /// Native payload to canonical fields.
    ///
    /// # Errors
    /// `Validation` when the payload has no id or unparseable times.
    fn to_canonical(&self, native: &NativeEvent, settings: &ProviderSettings)
        -> Result<CanonicalEvent>;

    /// Canonical fields to the provider's create/update body.
    fn from_canonical(&self, event: &CanonicalEvent, settings: &ProviderSettings) -> Result<Value>;

    /// Whether the provider API accepts writes from us.
    fn supports_export(&self) -> bool {
        false
    }

    /// Create the event and return the provider's copy.
    async fn create_event(
        &self,
        token: &AccessToken,
        event: &CanonicalEvent,
        settings: &ProviderSettings,
    ) -> Result<NativeEvent>;

    /// Update `external_id` and return the provider's copy.
    async fn update_event(
        &self,
        token: &AccessToken,
        external_id: &str,
        event: &CanonicalEvent,
        settings: &ProviderSettings,
    ) -> Result<NativeEvent>;

    async fn delete_event(
        &self,
        token: &AccessToken,
        external_id: &str,
        settings: &ProviderSettings,
    ) -> Result<()>;

    async fn get_account_info(&self, token: &AccessToken) -> Result<ProviderAccount>;

    /// Settings for a new connection, seeded from the account's defaults.
    fn default_settings(&self, account: &ProviderAccount) -> ProviderSettings;

    /// Turn a webhook notification into the event it refers to.
    ///
    /// `Ok(None)` for notifications that do not concern an event.
    async fn normalize_webhook(
        &self,
        _token: &AccessToken,
        _settings: &ProviderSettings,
        _payload: &Value,
    ) -> Result<Option<NativeEvent>> {
        Ok(None)
    }
}
