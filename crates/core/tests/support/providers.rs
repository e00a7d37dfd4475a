//! Scripted provider adapter
//!
//! Events are plain JSON objects:
//! `{"id", "title", "start", "end", "description", "instructor_email",
//! "category", "booked", "cancelled"}`. Exported events are written back into the
//! same list so the next fetch returns them, like a real calendar would.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use studiosync_core::{AccessToken, NativeEvent, ProviderAdapter};
use studiosync_domain::{
    CalendarProvider, CanonicalEvent, ProviderAccount, ProviderSettings, Result as DomainResult,
    StudioSyncError, SyncWindow,
};

/// Build a fake provider event.
pub fn fake_event(id: &str, title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Value {
    json!({
        "id": id,
        "title": title,
        "start": start.to_rfc3339(),
        "end": end.to_rfc3339(),
    })
}

#[derive(Clone)]
pub struct FakeAdapter {
    provider: CalendarProvider,
    events: Arc<Mutex<Vec<Value>>>,
    failures: Arc<Mutex<VecDeque<StudioSyncError>>>,
    delay: Option<Duration>,
    export: bool,
    list_calls: Arc<AtomicUsize>,
    tokens_seen: Arc<Mutex<Vec<String>>>,
    created: Arc<Mutex<Vec<CanonicalEvent>>>,
    updated: Arc<Mutex<Vec<(String, CanonicalEvent)>>>,
    deleted: Arc<Mutex<Vec<String>>>,
}

impl FakeAdapter {
    pub fn new(provider: CalendarProvider) -> Self {
        Self {
            provider,
            events: Arc::default(),
            failures: Arc::default(),
            delay: None,
            export: true,
            list_calls: Arc::default(),
            tokens_seen: Arc::default(),
            created: Arc::default(),
            updated: Arc::default(),
            deleted: Arc::default(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn read_only(mut self) -> Self {
        self.export = false;
        self
    }

    pub fn set_events(&self, events: Vec<Value>) {
        *self.events.lock().unwrap() = events;
    }

    pub fn push_event(&self, event: Value) {
        self.events.lock().unwrap().push(event);
    }

    /// Edit a remote event in place.
    pub fn edit_event(&self, id: &str, f: impl FnOnce(&mut Value)) {
        let mut events = self.events.lock().unwrap();
        let event = events.iter_mut().find(|e| e["id"] == id).expect("remote event exists");
        f(event);
    }

    pub fn remove_event(&self, id: &str) {
        self.events.lock().unwrap().retain(|e| e["id"] != id);
    }

    /// `list_events` fails with these errors, in order, before succeeding.
    pub fn fail_next(&self, error: StudioSyncError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<CanonicalEvent> {
        self.created.lock().unwrap().clone()
    }

    pub fn updated(&self) -> Vec<(String, CanonicalEvent)> {
        self.updated.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    fn next_failure(&self) -> Option<StudioSyncError> {
        self.failures.lock().unwrap().pop_front()
    }

    fn encode(id: &str, event: &CanonicalEvent) -> Value {
        json!({
            "id": id,
            "title": event.title,
            "description": event.description,
            "start": event.start_time.to_rfc3339(),
            "end": event.end_time.to_rfc3339(),
            "instructor_email": event.instructor_email,
            "category": event.category,
            "location": event.location,
        })
    }
}

fn parse_time(payload: &Value, field: &str) -> DomainResult<DateTime<Utc>> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| StudioSyncError::Validation(format!("missing or invalid {field}")))
}

fn text(payload: &Value, field: &str) -> Option<String> {
    payload.get(field).and_then(Value::as_str).map(str::to_string)
}

#[async_trait]
impl ProviderAdapter for FakeAdapter {
    fn provider(&self) -> CalendarProvider {
        self.provider
    }

    async fn list_events(
        &self,
        token: &AccessToken,
        _window: &SyncWindow,
        _settings: &ProviderSettings,
    ) -> DomainResult<Vec<NativeEvent>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().unwrap().push(token.secret().to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.next_failure() {
            return Err(error);
        }
        let events = self.events.lock().unwrap().clone();
        Ok(events.into_iter().map(NativeEvent::new).collect())
    }

    fn to_canonical(
        &self,
        native: &NativeEvent,
        _settings: &ProviderSettings,
    ) -> DomainResult<CanonicalEvent> {
        let payload = &native.payload;
        let external_id = native
            .id
            .clone()
            .ok_or_else(|| StudioSyncError::Validation("event has no id".into()))?;
        Ok(CanonicalEvent {
            external_id,
            title: text(payload, "title").unwrap_or_default(),
            description: text(payload, "description"),
            start_time: parse_time(payload, "start")?,
            end_time: parse_time(payload, "end")?,
            instructor_email: text(payload, "instructor_email"),
            location: text(payload, "location"),
            category: text(payload, "category"),
            current_participants: payload
                .get("booked")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok()),
            cancelled: payload.get("cancelled").and_then(Value::as_bool).unwrap_or(false),
            raw_data: payload.clone(),
            ..CanonicalEvent::default()
        })
    }

    fn from_canonical(
        &self,
        event: &CanonicalEvent,
        _settings: &ProviderSettings,
    ) -> DomainResult<Value> {
        Ok(Self::encode(&event.external_id, event))
    }

    fn supports_export(&self) -> bool {
        self.export
    }

    async fn create_event(
        &self,
        _token: &AccessToken,
        event: &CanonicalEvent,
        _settings: &ProviderSettings,
    ) -> DomainResult<NativeEvent> {
        let mut created = self.created.lock().unwrap();
        created.push(event.clone());
        let payload = Self::encode(&format!("created-{}", created.len()), event);
        self.events.lock().unwrap().push(payload.clone());
        Ok(NativeEvent::new(payload))
    }

    async fn update_event(
        &self,
        _token: &AccessToken,
        external_id: &str,
        event: &CanonicalEvent,
        _settings: &ProviderSettings,
    ) -> DomainResult<NativeEvent> {
        self.updated.lock().unwrap().push((external_id.to_string(), event.clone()));
        let payload = Self::encode(external_id, event);
        let mut events = self.events.lock().unwrap();
        events.retain(|e| e["id"] != external_id);
        events.push(payload.clone());
        Ok(NativeEvent::new(payload))
    }

    async fn delete_event(
        &self,
        _token: &AccessToken,
        external_id: &str,
        _settings: &ProviderSettings,
    ) -> DomainResult<()> {
        self.deleted.lock().unwrap().push(external_id.to_string());
        self.remove_event(external_id);
        Ok(())
    }

    async fn get_account_info(&self, _token: &AccessToken) -> DomainResult<ProviderAccount> {
        Ok(ProviderAccount {
            account_id: "acct-1".into(),
            email: Some("owner@studio.test".into()),
            default_target: Some("primary".into()),
            ..ProviderAccount::default()
        })
    }

    fn default_settings(&self, _account: &ProviderAccount) -> ProviderSettings {
        ProviderSettings::default_for(self.provider)
    }

    async fn normalize_webhook(
        &self,
        _token: &AccessToken,
        _settings: &ProviderSettings,
        payload: &Value,
    ) -> DomainResult<Option<NativeEvent>> {
        Ok(payload.get("event").cloned().map(NativeEvent::new))
    }
}
