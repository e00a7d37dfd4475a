//! Google Calendar v3 adapter

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde_json::{json, Map, Value};
use studiosync_core::{AccessToken, NativeEvent, ProviderAdapter};
use studiosync_domain::{
    CalendarProvider, CanonicalEvent, GoogleSettings, ProviderAccount, ProviderSettings,
    Result as DomainResult, StudioSyncError, SyncWindow,
};
use tracing::{debug, instrument};

use super::{
    bool_at, fill_workshop_details, opt_timestamp_at, parse_date, parse_timestamp, require_id,
    settings_mismatch, str_at, ProviderApi,
};
use crate::http::HttpClient;

pub const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const PAGE_SIZE: &str = "250";

/// Google Calendar provider
pub struct GoogleCalendarAdapter {
    api: ProviderApi,
}

impl GoogleCalendarAdapter {
    pub fn new(http: HttpClient, base_url: Option<&str>) -> Self {
        Self { api: ProviderApi::new(http, base_url.unwrap_or(GOOGLE_CALENDAR_API_BASE)) }
    }

    fn settings<'a>(&self, settings: &'a ProviderSettings) -> DomainResult<&'a GoogleSettings> {
        match settings {
            ProviderSettings::Google(google) => Ok(google),
            other => Err(settings_mismatch(CalendarProvider::Google, other)),
        }
    }

    fn events_path(settings: &GoogleSettings) -> String {
        format!("calendars/{}/events", urlencoding::encode(&settings.calendar_id))
    }
}

/// `start`/`end` objects carry `dateTime` for timed events and `date` for
/// all-day ones.
fn event_time(
    payload: &Value,
    key: &str,
    zone: &str,
) -> DomainResult<(DateTime<Utc>, bool)> {
    if let Some(raw) = str_at(payload, &format!("/{key}/dateTime")) {
        return parse_timestamp(&raw).map(|at| (at, false)).ok_or_else(|| {
            StudioSyncError::Validation(format!("unparseable {key}.dateTime {raw:?}"))
        });
    }
    if let Some(raw) = str_at(payload, &format!("/{key}/date")) {
        return parse_date(&raw, zone).map(|at| (at, true)).ok_or_else(|| {
            StudioSyncError::Validation(format!("unparseable {key}.date {raw:?}"))
        });
    }
    Err(StudioSyncError::Validation(format!("event has no {key} time")))
}

fn time_body(event: &CanonicalEvent, at: DateTime<Utc>, zone: &str) -> Value {
    if event.all_day {
        json!({ "date": at.date_naive().to_string() })
    } else {
        json!({ "dateTime": at.to_rfc3339(), "timeZone": zone })
    }
}

#[async_trait]
impl ProviderAdapter for GoogleCalendarAdapter {
    fn provider(&self) -> CalendarProvider {
        CalendarProvider::Google
    }

    #[instrument(skip(self, token, settings), fields(provider = "google"))]
    async fn list_events(
        &self,
        token: &AccessToken,
        window: &SyncWindow,
        settings: &ProviderSettings,
    ) -> DomainResult<Vec<NativeEvent>> {
        let settings = self.settings(settings)?;
        let path = Self::events_path(settings);
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query = vec![
                ("timeMin", window.start.to_rfc3339()),
                ("timeMax", window.end.to_rfc3339()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
                ("maxResults", PAGE_SIZE.to_string()),
            ];
            if let Some(page) = page_token.take() {
                query.push(("pageToken", page));
            }

            let mut page = self.api.get(token, &path, &query).await?;
            if let Some(Value::Array(items)) = page.get_mut("items").map(Value::take) {
                events.extend(items.into_iter().map(NativeEvent::new));
            }

            match str_at(&page, "/nextPageToken") {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        debug!(count = events.len(), "google events fetched");
        Ok(events)
    }

    fn to_canonical(
        &self,
        native: &NativeEvent,
        settings: &ProviderSettings,
    ) -> DomainResult<CanonicalEvent> {
        let settings = self.settings(settings)?;
        let payload = &native.payload;
        let external_id = require_id(native, "/id")?;
        let (start_time, all_day) = event_time(payload, "start", &settings.timezone)?;
        let (end_time, _) = event_time(payload, "end", &settings.timezone)?;

        let mut event = CanonicalEvent {
            external_id,
            title: str_at(payload, "/summary").unwrap_or_default(),
            description: str_at(payload, "/description"),
            start_time,
            end_time,
            all_day,
            instructor_name: str_at(payload, "/creator/displayName")
                .or_else(|| str_at(payload, "/organizer/displayName")),
            instructor_email: str_at(payload, "/creator/email")
                .or_else(|| str_at(payload, "/organizer/email")),
            location: str_at(payload, "/location"),
            current_participants: payload
                .get("attendees")
                .and_then(Value::as_array)
                .and_then(|list| u32::try_from(list.len()).ok())
                .filter(|_| settings.sync_attendees),
            cancelled: str_at(payload, "/status").as_deref() == Some("cancelled")
                || bool_at(payload, "/cancelled"),
            remote_updated_at: opt_timestamp_at(payload, "/updated"),
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
        let mut body = Map::new();
        body.insert("summary".into(), json!(event.title));
        if let Some(description) = &event.description {
            body.insert("description".into(), json!(description));
        }
        if let Some(location) = &event.location {
            body.insert("location".into(), json!(location));
        }
        body.insert("start".into(), time_body(event, event.start_time, &settings.timezone));
        body.insert("end".into(), time_body(event, event.end_time, &settings.timezone));
        if let Some(minutes) = settings.default_reminder_minutes {
            body.insert(
                "reminders".into(),
                json!({
                    "useDefault": false,
                    "overrides": [
                        { "method": "email", "minutes": minutes },
                        { "method": "popup", "minutes": 10 },
                    ],
                }),
            );
        }
        Ok(Value::Object(body))
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
        let path = Self::events_path(self.settings(settings)?);
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
        let path = format!(
            "{}/{}",
            Self::events_path(self.settings(settings)?),
            urlencoding::encode(external_id)
        );
        let updated = self.api.send(Method::PUT, token, &path, &body).await?;
        Ok(NativeEvent::new(updated))
    }

    async fn delete_event(
        &self,
        token: &AccessToken,
        external_id: &str,
        settings: &ProviderSettings,
    ) -> DomainResult<()> {
        let path = format!(
            "{}/{}",
            Self::events_path(self.settings(settings)?),
            urlencoding::encode(external_id)
        );
        self.api.delete(token, &path).await
    }

    async fn get_account_info(&self, token: &AccessToken) -> DomainResult<ProviderAccount> {
        let calendar = self.api.get(token, "calendars/primary", &[]).await?;
        let account_id = str_at(&calendar, "/id").ok_or_else(|| {
            StudioSyncError::Validation("primary calendar has no id".into())
        })?;
        Ok(ProviderAccount {
            email: Some(account_id.clone()),
            display_name: str_at(&calendar, "/summary"),
            timezone: str_at(&calendar, "/timeZone"),
            default_target: Some("primary".into()),
            parent_id: None,
            account_id,
        })
    }

    fn default_settings(&self, account: &ProviderAccount) -> ProviderSettings {
        let mut settings = GoogleSettings::default();
        if let Some(zone) = &account.timezone {
            settings.timezone = zone.clone();
        }
        if let Some(target) = &account.default_target {
            settings.calendar_id = target.clone();
        }
        ProviderSettings::Google(settings)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::*;

    fn adapter() -> GoogleCalendarAdapter {
        GoogleCalendarAdapter::new(HttpClient::new().unwrap(), Some("http://localhost:1"))
    }

    fn settings() -> ProviderSettings {
        ProviderSettings::Google(GoogleSettings {
            timezone: "America/Vancouver".into(),
            default_reminder_minutes: Some(60),
            ..GoogleSettings::default()
        })
    }

    #[test]
    fn timed_event_maps_creator_as_instructor() {
        let native = NativeEvent::new(json!({
            "id": "g1",
            "summary": "Power Yoga",
            "start": { "dateTime": "2024-06-03T10:00:00-07:00" },
            "end": { "dateTime": "2024-06-03T11:00:00-07:00" },
            "creator": { "email": "sarah@x.com", "displayName": "Sarah" },
            "updated": "2024-05-30T12:00:00Z"
        }));

        let event = adapter().to_canonical(&native, &settings()).unwrap();
        assert_eq!(event.external_id, "g1");
        assert_eq!(event.start_time, Utc.with_ymd_and_hms(2024, 6, 3, 17, 0, 0).unwrap());
        assert_eq!(event.instructor_email.as_deref(), Some("sarah@x.com"));
        assert_eq!(event.category.as_deref(), Some("yoga"));
        assert!(!event.all_day);
        assert!(event.remote_updated_at.is_some());
    }

    #[test]
    fn all_day_dates_are_local_midnight() {
        let native = NativeEvent::new(json!({
            "id": "g2",
            "summary": "Open Studio",
            "start": { "date": "2024-06-01" },
            "end": { "date": "2024-06-02" }
        }));

        let event = adapter().to_canonical(&native, &settings()).unwrap();
        assert!(event.all_day);
        assert_eq!(event.start_time, Utc.with_ymd_and_hms(2024, 6, 1, 7, 0, 0).unwrap());
    }

    #[test]
    fn missing_times_fail_validation() {
        let native = NativeEvent::new(json!({ "id": "g3", "summary": "Broken" }));
        let err = adapter().to_canonical(&native, &settings()).unwrap_err();
        assert!(matches!(err, StudioSyncError::Validation(_)));
    }

    #[test]
    fn export_body_carries_zone_and_reminders() {
        let event = CanonicalEvent {
            title: "Glazing".into(),
            start_time: Utc.with_ymd_and_hms(2024, 6, 1, 17, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, 6, 1, 19, 0, 0).unwrap(),
            ..CanonicalEvent::default()
        };
        let body = adapter().from_canonical(&event, &settings()).unwrap();
        assert_eq!(body["start"]["timeZone"], "America/Vancouver");
        assert_eq!(body["reminders"]["overrides"][0]["minutes"], 60);
        assert!(body.get("description").is_none());
    }

    #[test]
    fn foreign_settings_are_rejected() {
        let err = adapter()
            .to_canonical(&NativeEvent::new(json!({"id": "x"})), &ProviderSettings::default_for(CalendarProvider::Square))
            .unwrap_err();
        assert!(matches!(err, StudioSyncError::Config(_)));
    }
}
