//! Microsoft Graph (Outlook calendar) adapter

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use studiosync_core::{AccessToken, NativeEvent, ProviderAdapter};
use studiosync_domain::{
    CalendarProvider, CanonicalEvent, OutlookSettings, ProviderAccount, ProviderSettings,
    Result as DomainResult, StudioSyncError, SyncWindow,
};
use tracing::{debug, instrument};

use super::{
    bool_at, fill_workshop_details, opt_timestamp_at, parse_local, require_id, settings_mismatch,
    str_at, ProviderApi,
};
use crate::http::HttpClient;

pub const MICROSOFT_GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";
const OUTLOOK_TIMEZONE_HEADER: &str = r#"outlook.timezone="UTC""#;
const PAGE_SIZE: &str = "100";
const GRAPH_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Microsoft Calendar provider
pub struct OutlookCalendarAdapter {
    api: ProviderApi,
}

impl OutlookCalendarAdapter {
    pub fn new(http: HttpClient, base_url: Option<&str>) -> DomainResult<Self> {
        let api = ProviderApi::new(http, base_url.unwrap_or(MICROSOFT_GRAPH_API_BASE))
            .with_header("prefer", OUTLOOK_TIMEZONE_HEADER)?;
        Ok(Self { api })
    }

    fn settings<'a>(&self, settings: &'a ProviderSettings) -> DomainResult<&'a OutlookSettings> {
        match settings {
            ProviderSettings::Outlook(outlook) => Ok(outlook),
            other => Err(settings_mismatch(CalendarProvider::Outlook, other)),
        }
    }

    fn calendar_root(settings: &OutlookSettings) -> String {
        match settings.calendar_id.as_deref() {
            Some(id) if !id.eq_ignore_ascii_case("primary") => {
                format!("me/calendars/{}", urlencoding::encode(id))
            }
            _ => "me".to_string(),
        }
    }
}

/// Graph `dateTimeTimeZone` values have no offset; the zone is a sibling.
fn graph_time(payload: &Value, key: &str) -> DomainResult<DateTime<Utc>> {
    let raw = str_at(payload, &format!("/{key}/dateTime"))
        .ok_or_else(|| StudioSyncError::Validation(format!("event has no {key}.dateTime")))?;
    let zone = str_at(payload, &format!("/{key}/timeZone")).unwrap_or_else(|| "UTC".into());
    parse_local(&raw, &zone)
        .ok_or_else(|| StudioSyncError::Validation(format!("unparseable {key}.dateTime {raw:?}")))
}

#[async_trait]
impl ProviderAdapter for OutlookCalendarAdapter {
    fn provider(&self) -> CalendarProvider {
        CalendarProvider::Outlook
    }

    #[instrument(skip(self, token, settings), fields(provider = "outlook"))]
    async fn list_events(
        &self,
        token: &AccessToken,
        window: &SyncWindow,
        settings: &ProviderSettings,
    ) -> DomainResult<Vec<NativeEvent>> {
        let settings = self.settings(settings)?;
        let mut events = Vec::new();
        let mut next = Some(format!("{}/calendarView", Self::calendar_root(settings)));
        let mut query = vec![
            ("startDateTime", window.start.to_rfc3339()),
            ("endDateTime", window.end.to_rfc3339()),
            ("$top", PAGE_SIZE.to_string()),
        ];

        while let Some(path) = next.take() {
            let mut page = self.api.get(token, &path, &query).await?;
            if let Some(Value::Array(items)) = page.get_mut("value").map(Value::take) {
                events.extend(items.into_iter().map(NativeEvent::new));
            }
            // nextLink already carries the query
            next = str_at(&page, "/@odata.nextLink");
            query.clear();
        }

        debug!(count = events.len(), "outlook events fetched");
        Ok(events)
    }

    fn to_canonical(
        &self,
        native: &NativeEvent,
        _settings: &ProviderSettings,
    ) -> DomainResult<CanonicalEvent> {
        let payload = &native.payload;
        let mut event = CanonicalEvent {
            external_id: require_id(native, "/id")?,
            title: str_at(payload, "/subject").unwrap_or_default(),
            description: str_at(payload, "/bodyPreview"),
            start_time: graph_time(payload, "start")?,
            end_time: graph_time(payload, "end")?,
            all_day: bool_at(payload, "/isAllDay"),
            instructor_name: str_at(payload, "/organizer/emailAddress/name"),
            instructor_email: str_at(payload, "/organizer/emailAddress/address"),
            location: str_at(payload, "/location/displayName"),
            current_participants: payload
                .get("attendees")
                .and_then(Value::as_array)
                .and_then(|list| u32::try_from(list.len()).ok())
                .filter(|count| *count > 0),
            cancelled: bool_at(payload, "/isCancelled"),
            remote_updated_at: opt_timestamp_at(payload, "/lastModifiedDateTime"),
            raw_data: payload.clone(),
            ..CanonicalEvent::default()
        };
        fill_workshop_details(&mut event);
        Ok(event)
    }

    fn from_canonical(
        &self,
        event: &CanonicalEvent,
        settings: &ProviderSettings,
    ) -> DomainResult<Value> {
        let settings = self.settings(settings)?;
        let mut body = json!({
            "subject": event.title,
            "body": { "contentType": "text", "content": event.description.clone().unwrap_or_default() },
            "start": { "dateTime": event.start_time.format(GRAPH_DATETIME_FORMAT).to_string(), "timeZone": "UTC" },
            "end": { "dateTime": event.end_time.format(GRAPH_DATETIME_FORMAT).to_string(), "timeZone": "UTC" },
            "isAllDay": event.all_day,
        });
        if let Some(location) = &event.location {
            body["location"] = json!({ "displayName": location });
        }
        if let Some(minutes) = settings.default_reminder_minutes {
            body["isReminderOn"] = json!(true);
            body["reminderMinutesBeforeStart"] = json!(minutes);
        }
        Ok(body)
    }

    fn supports_export(&self) -> bool {
        true
    }

    async fn create_event(
        &self,
        token: &AccessToken,
        event: &CanonicalEvent,
        settings: &ProviderSettings,
    ) -> DomainResult<NativeEvent> {
        let body = self.from_canonical(event, settings)?;
        let path = format!("{}/events", Self::calendar_root(self.settings(settings)?));
        let created = self.api.send(Method::POST, token, &path, &body).await?;
        Ok(NativeEvent::new(created))
    }

    async fn update_event(
        &self,
        token: &AccessToken,
        external_id: &str,
        event: &CanonicalEvent,
        settings: &ProviderSettings,
    ) -> DomainResult<NativeEvent> {
        let body = self.from_canonical(event, settings)?;
        let path = format!("me/events/{}", urlencoding::encode(external_id));
        let updated = self.api.send(Method::PATCH, token, &path, &body).await?;
        Ok(NativeEvent::new(updated))
    }

    async fn delete_event(
        &self,
        token: &AccessToken,
        external_id: &str,
        _settings: &ProviderSettings,
    ) -> DomainResult<()> {
        self.api.delete(token, &format!("me/events/{}", urlencoding::encode(external_id))).await
    }

    async fn get_account_info(&self, token: &AccessToken) -> DomainResult<ProviderAccount> {
        let me = self.api.get(token, "me", &[]).await?;
        let account_id = str_at(&me, "/id")
            .ok_or_else(|| StudioSyncError::Validation("graph user has no id".into()))?;
        let timezone = match self.api.get(token, "me/mailboxSettings", &[]).await {
            Ok(mailbox) => str_at(&mailbox, "/timeZone"),
            Err(err) => {
                debug!(error = %err, "mailbox settings unavailable; leaving timezone unset");
                None
            }
        };
        Ok(ProviderAccount {
            account_id,
            display_name: str_at(&me, "/displayName"),
            email: str_at(&me, "/mail").or_else(|| str_at(&me, "/userPrincipalName")),
            timezone,
            default_target: None,
            parent_id: None,
        })
    }

    fn default_settings(&self, account: &ProviderAccount) -> ProviderSettings {
        ProviderSettings::Outlook(OutlookSettings {
            calendar_id: account.default_target.clone(),
            timezone: account.timezone.clone().unwrap_or_else(|| "UTC".into()),
            ..OutlookSettings::default()
        })
    }
}
