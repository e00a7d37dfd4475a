//! Acuity Scheduling adapter
//!
//! Appointments are booked by clients against an appointment type, so only
//! rescheduling and cancellation are exported. Creating an appointment from
//! a local schedule is refused.

use async_trait::async_trait;
use chrono::Duration;
use reqwest::Method;
use serde_json::{json, Value};
use studiosync_core::{AccessToken, NativeEvent, ProviderAdapter};
use studiosync_domain::{
    AcuitySettings, CalendarProvider, CanonicalEvent, ProviderAccount, ProviderSettings,
    Result as DomainResult, StudioSyncError, SyncWindow,
};
use tracing::{debug, instrument};

use super::{
    bool_at, fill_workshop_details, i64_at, parse_minor_units, require_id, settings_mismatch,
    str_at, timestamp_at, ProviderApi,
};
use crate::http::HttpClient;

pub const ACUITY_API_BASE: &str = "https://acuityscheduling.com/api/v1";
const MAX_RESULTS: &str = "1000";
const ACUITY_DATE_FORMAT: &str = "%Y-%m-%d";

pub struct AcuityAdapter {
    api: ProviderApi,
}

impl AcuityAdapter {
    pub fn new(http: HttpClient, base_url: Option<&str>) -> Self {
        Self { api: ProviderApi::new(http, base_url.unwrap_or(ACUITY_API_BASE)) }
    }

    fn settings<'a>(&self, settings: &'a ProviderSettings) -> DomainResult<&'a AcuitySettings> {
        match settings {
            ProviderSettings::Acuity(acuity) => Ok(acuity),
            other => Err(settings_mismatch(CalendarProvider::Acuity, other)),
        }
    }

    async fn appointments(
        &self,
        token: &AccessToken,
        window: &SyncWindow,
        settings: &AcuitySettings,
        canceled: bool,
    ) -> DomainResult<Vec<Value>> {
        let mut query = vec![
            ("minDate", window.start.format(ACUITY_DATE_FORMAT).to_string()),
            ("maxDate", window.end.format(ACUITY_DATE_FORMAT).to_string()),
            ("max", MAX_RESULTS.to_string()),
        ];
        if let Some(calendar) = settings.calendar_id.as_deref().filter(|id| !id.is_empty()) {
            query.push(("calendarID", calendar.to_string()));
        }
        if canceled {
            query.push(("canceled", "true".to_string()));
        }
        match self.api.get(token, "appointments", &query).await? {
            Value::Array(items) => Ok(items),
            other => Err(StudioSyncError::Validation(format!(
                "acuity appointments response is not a list: {other}"
            ))),
        }
    }

    /// Numeric id as the native id, plus the mapped local class id.
    fn tag(mut appointment: Value, settings: &AcuitySettings) -> Option<NativeEvent> {
        let id = i64_at(&appointment, "/id")?.to_string();
        let local_class = i64_at(&appointment, "/appointmentTypeID")
            .and_then(|type_id| settings.appointment_type_mapping.get(&type_id.to_string()).cloned());
        if let (Some(local), Value::Object(map)) = (local_class, &mut appointment) {
            map.insert("local_class_id".into(), Value::String(local));
        }
        Some(NativeEvent::with_id(id, appointment))
    }

    fn appointment_path(external_id: &str, action: &str) -> String {
        format!("appointments/{}/{action}", urlencoding::encode(external_id))
    }
}

#[async_trait]
impl ProviderAdapter for AcuityAdapter {
    fn provider(&self) -> CalendarProvider {
        CalendarProvider::Acuity
    }

    #[instrument(skip(self, token, settings), fields(provider = "acuity"))]
    async fn list_events(
        &self,
        token: &AccessToken,
        window: &SyncWindow,
        settings: &ProviderSettings,
    ) -> DomainResult<Vec<NativeEvent>> {
        let settings = self.settings(settings)?;
        let mut appointments = self.appointments(token, window, settings, false).await?;
        // Acuity omits cancelled appointments unless asked for them alone.
        if settings.sync_cancellations {
            appointments.extend(self.appointments(token, window, settings, true).await?);
        }

        let events: Vec<NativeEvent> =
            appointments.into_iter().filter_map(|a| Self::tag(a, settings)).collect();
        debug!(count = events.len(), "acuity appointments fetched");
        Ok(events)
    }

    fn to_canonical(
        &self,
        native: &NativeEvent,
        _settings: &ProviderSettings,
    ) -> DomainResult<CanonicalEvent> {
        let payload = &native.payload;
        let external_id = require_id(native, "/id")?;
        let start_time = timestamp_at(payload, "/datetime")?;
        let minutes = i64_at(payload, "/duration").ok_or_else(|| {
            StudioSyncError::Validation(format!("appointment {external_id} has no duration"))
        })?;

        let mut event = CanonicalEvent {
            external_id,
            title: str_at(payload, "/type").unwrap_or_else(|| "Acuity Appointment".into()),
            description: str_at(payload, "/notes"),
            start_time,
            end_time: start_time + Duration::minutes(minutes),
            instructor_name: str_at(payload, "/calendar"),
            location: str_at(payload, "/location"),
            category: str_at(payload, "/category"),
            current_participants: Some(1),
            price: str_at(payload, "/price").and_then(|raw| parse_minor_units(&raw)),
            cancelled: bool_at(payload, "/canceled"),
            raw_data: payload.clone(),
            ..CanonicalEvent::default()
        };
        fill_workshop_details(&mut event);
        Ok(event)
    }

    fn from_canonical(&self, event: &CanonicalEvent, _settings: &ProviderSettings) -> DomainResult<Value> {
        Ok(json!({ "datetime": event.start_time.to_rfc3339() }))
    }

    fn supports_export(&self) -> bool {
        true
    }

    async fn create_event(
        &self,
        _token: &AccessToken,
        event: &CanonicalEvent,
        _settings: &ProviderSettings,
    ) -> DomainResult<NativeEvent> {
        Err(StudioSyncError::Config(format!(
            "acuity appointments are booked by clients; cannot create {:?}",
            event.title
        )))
    }

    async fn update_event(
        &self,
        token: &AccessToken,
        external_id: &str,
        event: &CanonicalEvent,
        settings: &ProviderSettings,
    ) -> DomainResult<NativeEvent> {
        let body = self.from_canonical(event, settings)?;
        let path = Self::appointment_path(external_id, "reschedule");
        let updated = self.api.send(Method::PUT, token, &path, &body).await?;
        Ok(Self::tag(updated.clone(), self.settings(settings)?)
            .unwrap_or_else(|| NativeEvent::with_id(external_id, updated)))
    }

    async fn delete_event(
        &self,
        token: &AccessToken,
        external_id: &str,
        _settings: &ProviderSettings,
    ) -> DomainResult<()> {
        let path = Self::appointment_path(external_id, "cancel");
        self.api.send(Method::PUT, token, &path, &json!({})).await.map(|_| ())
    }

    async fn get_account_info(&self, token: &AccessToken) -> DomainResult<ProviderAccount> {
        let me = self.api.get(token, "me", &[]).await?;
        let account_id = i64_at(&me, "/id")
            .map(|id| id.to_string())
            .ok_or_else(|| StudioSyncError::Validation("acuity account has no id".into()))?;
        Ok(ProviderAccount {
            account_id,
            display_name: str_at(&me, "/name"),
            email: str_at(&me, "/email"),
            timezone: str_at(&me, "/timezone"),
            default_target: None,
            parent_id: None,
        })
    }

    fn default_settings(&self, account: &ProviderAccount) -> ProviderSettings {
        ProviderSettings::Acuity(AcuitySettings {
            calendar_id: account.default_target.clone(),
            ..AcuitySettings::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn adapter() -> AcuityAdapter {
        AcuityAdapter::new(HttpClient::new().unwrap(), Some("http://localhost:1"))
    }

    fn appointment() -> Value {
        json!({
            "id": 5501,
            "type": "Wheel Throwing Intro",
            "appointmentTypeID": 12,
            "datetime": "2024-06-01T10:00:00-0700",
            "duration": "90",
            "calendar": "Mia",
            "price": "65.00",
            "canceled": false
        })
    }

    #[test]
    fn appointment_maps_duration_and_price() {
        let mut settings = AcuitySettings::default();
        settings.appointment_type_mapping.insert("12".into(), "class-wheel".into());
        let native = AcuityAdapter::tag(appointment(), &settings).unwrap();
        assert_eq!(native.id.as_deref(), Some("5501"));
        assert_eq!(native.payload["local_class_id"], "class-wheel");

        let event = adapter().to_canonical(&native, &ProviderSettings::Acuity(settings)).unwrap();
        assert_eq!(event.start_time, Utc.with_ymd_and_hms(2024, 6, 1, 17, 0, 0).unwrap());
        assert_eq!(event.end_time, Utc.with_ymd_and_hms(2024, 6, 1, 18, 30, 0).unwrap());
        assert_eq!(event.price, Some(6500));
        assert_eq!(event.instructor_name.as_deref(), Some("Mia"));
        assert_eq!(event.category.as_deref(), Some("pottery"));
        assert_eq!(event.skill_level.as_deref(), Some("beginner"));
    }

    #[tokio::test]
    async fn create_is_refused() {
        let event = CanonicalEvent { title: "Raku".into(), ..CanonicalEvent::default() };
        let err = adapter()
            .create_event(
                &AccessToken::new("t"),
                &event,
                &ProviderSettings::default_for(CalendarProvider::Acuity),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StudioSyncError::Config(_)));
    }
}
