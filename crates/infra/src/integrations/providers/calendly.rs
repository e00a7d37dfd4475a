//! Calendly v2 adapter (read-only)
//!
//! Scheduled events are enriched with their event type so the canonical
//! title and description come from the bookable offering rather than the
//! invitee-facing event name.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use studiosync_core::{AccessToken, NativeEvent, ProviderAdapter};
use studiosync_domain::{
    CalendarProvider, CalendlySettings, CanonicalEvent, ProviderAccount, ProviderSettings,
    Result as DomainResult, StudioSyncError, SyncWindow,
};
use tracing::{debug, instrument, warn};

use super::{
    export_unsupported, fill_workshop_details, opt_timestamp_at, require_id, settings_mismatch,
    str_at, timestamp_at, u32_at, uri_id, ProviderApi,
};
use crate::http::HttpClient;

pub const CALENDLY_API_BASE: &str = "https://api.calendly.com";
const PAGE_SIZE: &str = "100";

/// Key under which the event type is attached to a scheduled event.
const EVENT_TYPE_KEY: &str = "event_type_details";

pub struct CalendlyAdapter {
    api: ProviderApi,
}

impl CalendlyAdapter {
    pub fn new(http: HttpClient, base_url: Option<&str>) -> Self {
        Self { api: ProviderApi::new(http, base_url.unwrap_or(CALENDLY_API_BASE)) }
    }

    fn settings<'a>(&self, settings: &'a ProviderSettings) -> DomainResult<&'a CalendlySettings> {
        match settings {
            ProviderSettings::Calendly(calendly) => Ok(calendly),
            other => Err(settings_mismatch(CalendarProvider::Calendly, other)),
        }
    }

    async fn user_uri(&self, token: &AccessToken, settings: &CalendlySettings) -> DomainResult<String> {
        if let Some(uri) = &settings.user_uri {
            return Ok(uri.clone());
        }
        let me = self.api.get(token, "users/me", &[]).await?;
        str_at(&me, "/resource/uri")
            .ok_or_else(|| StudioSyncError::Validation("calendly user has no uri".into()))
    }

    /// Every page of a Calendly collection endpoint.
    async fn collect(
        &self,
        token: &AccessToken,
        path: &str,
        query: Vec<(&str, String)>,
    ) -> DomainResult<Vec<Value>> {
        let mut items = Vec::new();
        let mut next = Some(path.to_string());
        let mut query = query;

        while let Some(url) = next.take() {
            let mut page = self.api.get(token, &url, &query).await?;
            if let Some(Value::Array(batch)) = page.get_mut("collection").map(Value::take) {
                items.extend(batch);
            }
            next = str_at(&page, "/pagination/next_page");
            query.clear();
        }
        Ok(items)
    }

    async fn event_types(
        &self,
        token: &AccessToken,
        user_uri: &str,
    ) -> DomainResult<HashMap<String, Value>> {
        let types = self
            .collect(
                token,
                "event_types",
                vec![("user", user_uri.to_string()), ("active", "true".into()), ("count", PAGE_SIZE.into())],
            )
            .await?;
        Ok(types
            .into_iter()
            .filter_map(|item| str_at(&item, "/uri").map(|uri| (uri, item)))
            .collect())
    }

    fn enrich(mut event: Value, types: &HashMap<String, Value>) -> NativeEvent {
        if let Some(details) = str_at(&event, "/event_type").and_then(|uri| types.get(&uri)) {
            if let Value::Object(map) = &mut event {
                map.insert(EVENT_TYPE_KEY.into(), details.clone());
            }
        }
        let id = str_at(&event, "/uri").map(|uri| uri_id(&uri).to_string());
        NativeEvent { id, payload: event }
    }
}

#[async_trait]
impl ProviderAdapter for CalendlyAdapter {
    fn provider(&self) -> CalendarProvider {
        CalendarProvider::Calendly
    }

    #[instrument(skip(self, token, settings), fields(provider = "calendly"))]
    async fn list_events(
        &self,
        token: &AccessToken,
        window: &SyncWindow,
        settings: &ProviderSettings,
    ) -> DomainResult<Vec<NativeEvent>> {
        let settings = self.settings(settings)?;
        let user_uri = self.user_uri(token, settings).await?;

        let scheduled = self
            .collect(
                token,
                "scheduled_events",
                vec![
                    ("user", user_uri.clone()),
                    ("min_start_time", window.start.to_rfc3339()),
                    ("max_start_time", window.end.to_rfc3339()),
                    ("status", "active".into()),
                    ("count", PAGE_SIZE.into()),
                ],
            )
            .await?;

        let types = match self.event_types(token, &user_uri).await {
            Ok(types) => types,
            Err(err) if err.is_unauthorized() || err.is_transient() => return Err(err),
            Err(err) => {
                warn!(error = %err, "event type lookup failed; importing without enrichment");
                HashMap::new()
            }
        };

        let events: Vec<_> = scheduled.into_iter().map(|event| Self::enrich(event, &types)).collect();
        debug!(count = events.len(), event_types = types.len(), "calendly events fetched");
        Ok(events)
    }

    fn to_canonical(
        &self,
        native: &NativeEvent,
        _settings: &ProviderSettings,
    ) -> DomainResult<CanonicalEvent> {
        let payload = &native.payload;
        let external_id = match &native.id {
            Some(id) => id.clone(),
            None => match str_at(payload, "/uri") {
                Some(uri) => uri_id(&uri).to_string(),
                None => require_id(native, "/uri")?,
            },
        };
        let type_pointer = |field: &str| format!("/{EVENT_TYPE_KEY}/{field}");

        let mut event = CanonicalEvent {
            external_id,
            title: str_at(payload, &type_pointer("name"))
                .or_else(|| str_at(payload, "/name"))
                .unwrap_or_default(),
            description: str_at(payload, &type_pointer("description_plain"))
                .or_else(|| str_at(payload, &type_pointer("description"))),
            start_time: timestamp_at(payload, "/start_time")?,
            end_time: timestamp_at(payload, "/end_time")?,
            instructor_name: str_at(payload, "/event_memberships/0/user_name"),
            instructor_email: str_at(payload, "/event_memberships/0/user_email"),
            location: str_at(payload, "/location/location"),
            max_participants: u32_at(payload, "/invitees_counter/limit"),
            current_participants: Some(u32_at(payload, "/invitees_counter/total").unwrap_or(1)),
            cancelled: str_at(payload, "/status").as_deref() == Some("canceled"),
            remote_updated_at: opt_timestamp_at(payload, "/updated_at"),
            raw_data: payload.clone(),
            ..CanonicalEvent::default()
        };
        fill_workshop_details(&mut event);
        Ok(event)
    }

    fn from_canonical(&self, _event: &CanonicalEvent, _settings: &ProviderSettings) -> DomainResult<Value> {
        Err(export_unsupported(CalendarProvider::Calendly))
    }

    async fn create_event(
        &self,
        _token: &AccessToken,
        _event: &CanonicalEvent,
        _settings: &ProviderSettings,
    ) -> DomainResult<NativeEvent> {
        Err(export_unsupported(CalendarProvider::Calendly))
    }

    async fn update_event(
        &self,
        _token: &AccessToken,
        _external_id: &str,
        _event: &CanonicalEvent,
        _settings: &ProviderSettings,
    ) -> DomainResult<NativeEvent> {
        Err(export_unsupported(CalendarProvider::Calendly))
    }

    async fn delete_event(
        &self,
        _token: &AccessToken,
        _external_id: &str,
        _settings: &ProviderSettings,
    ) -> DomainResult<()> {
        Err(export_unsupported(CalendarProvider::Calendly))
    }

    async fn get_account_info(&self, token: &AccessToken) -> DomainResult<ProviderAccount> {
        let me = self.api.get(token, "users/me", &[]).await?;
        let uri = str_at(&me, "/resource/uri")
            .ok_or_else(|| StudioSyncError::Validation("calendly user has no uri".into()))?;
        Ok(ProviderAccount {
            account_id: uri.clone(),
            display_name: str_at(&me, "/resource/name"),
            email: str_at(&me, "/resource/email"),
            timezone: str_at(&me, "/resource/timezone"),
            default_target: Some(uri),
            parent_id: str_at(&me, "/resource/current_organization"),
        })
    }

    fn default_settings(&self, account: &ProviderAccount) -> ProviderSettings {
        ProviderSettings::Calendly(CalendlySettings {
            organization_uri: account.parent_id.clone(),
            user_uri: account.default_target.clone(),
            default_event_types: Vec::new(),
            timezone: account.timezone.clone().unwrap_or_else(|| "UTC".into()),
        })
    }

    /// `invitee.created` / `invitee.canceled` notifications.
    ///
    /// The payload names the scheduled event either inline or by URI; a URI
    /// is resolved with one GET. Cancellations mark the event `canceled` so
    /// it is stored and skipped.
    #[instrument(skip_all, fields(provider = "calendly"))]
    async fn normalize_webhook(
        &self,
        token: &AccessToken,
        _settings: &ProviderSettings,
        payload: &Value,
    ) -> DomainResult<Option<NativeEvent>> {
        let kind = str_at(payload, "/event").unwrap_or_default();
        let cancelled = match kind.as_str() {
            "invitee.created" => false,
            "invitee.canceled" => true,
            other => {
                debug!(event = other, "ignoring calendly webhook");
                return Ok(None);
            }
        };

        let mut event = match payload.pointer("/payload/scheduled_event") {
            Some(inline @ Value::Object(_)) => inline.clone(),
            _ => match payload.pointer("/payload/event") {
                Some(inline @ Value::Object(_)) => inline.clone(),
                Some(Value::String(uri)) => {
                    let mut fetched = self.api.get(token, uri, &[]).await?;
                    fetched.get_mut("resource").map(Value::take).unwrap_or(Value::Null)
                }
                _ => {
                    return Err(StudioSyncError::Validation(
                        "calendly webhook has no scheduled event".into(),
                    ))
                }
            },
        };

        if cancelled {
            if let Value::Object(map) = &mut event {
                map.insert("status".into(), Value::String("canceled".into()));
            }
        }
        Ok(Some(Self::enrich(event, &HashMap::new())))
    }
}
