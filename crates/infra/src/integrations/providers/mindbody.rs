//! Mindbody Public API v6 adapter (read-only)
//!
//! Mindbody authenticates with a site API key plus a staff user token, sent
//! raw in `Authorization`. Times come back as site wall-clock without an
//! offset, so they are localized with the configured site zone.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use studiosync_core::{AccessToken, NativeEvent, ProviderAdapter};
use studiosync_domain::{
    CalendarProvider, CanonicalEvent, MindbodySettings, ProviderAccount, ProviderSettings,
    Result as DomainResult, StudioSyncError, SyncWindow,
};
use tracing::{debug, instrument};

use super::{
    bool_at, export_unsupported, fill_workshop_details, i64_at, parse_local, settings_mismatch,
    str_at, u32_at, ProviderApi, TokenScheme,
};
use crate::http::HttpClient;

pub const MINDBODY_API_BASE: &str = "https://api.mindbodyonline.com/public/v6";
const PAGE_LIMIT: usize = 200;
const CLASS_PREFIX: &str = "class-";
const APPOINTMENT_PREFIX: &str = "appt-";

pub struct MindbodyAdapter {
    api: ProviderApi,
}

impl MindbodyAdapter {
    pub fn new(http: HttpClient, base_url: Option<&str>, api_key: Option<&str>) -> DomainResult<Self> {
        let mut api = ProviderApi::new(http, base_url.unwrap_or(MINDBODY_API_BASE))
            .with_scheme(TokenScheme::Raw);
        if let Some(key) = api_key {
            api = api.with_header("api-key", key)?;
        }
        Ok(Self { api })
    }

    fn settings<'a>(&self, settings: &'a ProviderSettings) -> DomainResult<&'a MindbodySettings> {
        match settings {
            ProviderSettings::Mindbody(mindbody) => Ok(mindbody),
            other => Err(settings_mismatch(CalendarProvider::Mindbody, other)),
        }
    }

    /// Offset/limit pagination; stops once `TotalResults` is reached.
    async fn collect(
        &self,
        token: &AccessToken,
        settings: &MindbodySettings,
        path: &str,
        key: &str,
        base_query: &[(&str, String)],
    ) -> DomainResult<Vec<Value>> {
        let mut items = Vec::new();
        loop {
            let mut query = base_query.to_vec();
            query.push(("Limit", PAGE_LIMIT.to_string()));
            query.push(("Offset", items.len().to_string()));

            let mut page = self
                .api
                .get_with_header(token, path, &query, ("siteid", &settings.site_id))
                .await?;
            let batch = match page.get_mut(key).map(Value::take) {
                Some(Value::Array(batch)) => batch,
                _ => Vec::new(),
            };
            let fetched = batch.len();
            items.extend(batch);

            let total = i64_at(&page, "/PaginationResponse/TotalResults")
                .and_then(|total| usize::try_from(total).ok())
                .unwrap_or(items.len());
            if fetched == 0 || items.len() >= total {
                break;
            }
        }
        Ok(items)
    }

    fn window_query(window: &SyncWindow, settings: &MindbodySettings) -> Vec<(&'static str, String)> {
        let mut query = vec![
            ("StartDateTime", window.start.to_rfc3339()),
            ("EndDateTime", window.end.to_rfc3339()),
        ];
        if let Some(location) = settings.location_id.as_deref().filter(|id| !id.is_empty()) {
            query.push(("LocationIds", location.to_string()));
        }
        query
    }

    /// Prefix ids by kind and attach the local instructor id, if mapped.
    fn tag(mut item: Value, prefix: &str, settings: &MindbodySettings) -> Option<NativeEvent> {
        let id = i64_at(&item, "/Id").map(|id| id.to_string()).or_else(|| str_at(&item, "/Id"))?;
        let staff_id = i64_at(&item, "/Staff/Id")
            .map(|id| id.to_string())
            .or_else(|| i64_at(&item, "/StaffId").map(|id| id.to_string()));
        if let (Some(staff_id), Value::Object(map)) = (staff_id, &mut item) {
            if let Some(local) = settings.staff_mapping.get(&staff_id) {
                map.insert("local_instructor_id".into(), Value::String(local.clone()));
            }
        }
        Some(NativeEvent::with_id(format!("{prefix}{id}"), item))
    }
}

fn site_time(payload: &Value, key: &str, zone: &str) -> DomainResult<DateTime<Utc>> {
    let raw = str_at(payload, &format!("/{key}"))
        .ok_or_else(|| StudioSyncError::Validation(format!("mindbody record has no {key}")))?;
    parse_local(&raw, zone)
        .ok_or_else(|| StudioSyncError::Validation(format!("unparseable {key} {raw:?}")))
}

fn staff_name(payload: &Value) -> Option<String> {
    if let Some(display) = str_at(payload, "/Staff/DisplayName") {
        return Some(display);
    }
    match (str_at(payload, "/Staff/FirstName"), str_at(payload, "/Staff/LastName")) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        (first, last) => first.or(last),
    }
}

#[async_trait]
impl ProviderAdapter for MindbodyAdapter {
    fn provider(&self) -> CalendarProvider {
        CalendarProvider::Mindbody
    }

    #[instrument(skip(self, token, settings), fields(provider = "mindbody"))]
    async fn list_events(
        &self,
        token: &AccessToken,
        window: &SyncWindow,
        settings: &ProviderSettings,
    ) -> DomainResult<Vec<NativeEvent>> {
        let settings = self.settings(settings)?;
        if settings.site_id.is_empty() {
            return Err(StudioSyncError::Config("mindbody integration has no site_id".into()));
        }
        let query = Self::window_query(window, settings);
        let mut events = Vec::new();

        if settings.sync_class_schedules {
            let classes = self.collect(token, settings, "class/classes", "Classes", &query).await?;
            events.extend(classes.into_iter().filter_map(|c| Self::tag(c, CLASS_PREFIX, settings)));
        }
        if settings.sync_appointments {
            let appointments = self
                .collect(token, settings, "appointment/staffappointments", "Appointments", &query)
                .await?;
            events.extend(
                appointments.into_iter().filter_map(|a| Self::tag(a, APPOINTMENT_PREFIX, settings)),
            );
        }

        debug!(count = events.len(), "mindbody records fetched");
        Ok(events)
    }

    fn to_canonical(
        &self,
        native: &NativeEvent,
        settings: &ProviderSettings,
    ) -> DomainResult<CanonicalEvent> {
        let settings = self.settings(settings)?;
        let payload = &native.payload;
        let external_id = native
            .id
            .clone()
            .ok_or_else(|| StudioSyncError::Validation("mindbody record has no id".into()))?;
        let is_class = external_id.starts_with(CLASS_PREFIX);

        let title = if is_class {
            str_at(payload, "/ClassDescription/Name").or_else(|| str_at(payload, "/Name"))
        } else {
            str_at(payload, "/SessionType/Name").or_else(|| str_at(payload, "/Name"))
        }
        .unwrap_or_else(|| "Mindbody Session".into());

        let mut event = CanonicalEvent {
            external_id,
            title,
            description: str_at(payload, "/ClassDescription/Description")
                .or_else(|| str_at(payload, "/Description"))
                .or_else(|| str_at(payload, "/Notes")),
            start_time: site_time(payload, "StartDateTime", &settings.timezone)?,
            end_time: site_time(payload, "EndDateTime", &settings.timezone)?,
            instructor_name: staff_name(payload),
            instructor_email: str_at(payload, "/Staff/Email"),
            location: str_at(payload, "/Location/Name"),
            room: str_at(payload, "/Resource/Name"),
            category: str_at(payload, "/ClassDescription/Program/Name")
                .or_else(|| str_at(payload, "/Program/Name")),
            skill_level: str_at(payload, "/ClassDescription/Level/Name")
                .map(|level| level.to_lowercase()),
            max_participants: u32_at(payload, "/MaxCapacity"),
            current_participants: u32_at(payload, "/TotalBooked")
                .or_else(|| u32_at(payload, "/BookedCount")),
            cancelled: bool_at(payload, "/IsCanceled")
                || str_at(payload, "/Status").is_some_and(|s| s.eq_ignore_ascii_case("cancelled")),
            raw_data: payload.clone(),
            ..CanonicalEvent::default()
        };
        fill_workshop_details(&mut event);
        Ok(event)
    }

    fn from_canonical(&self, _event: &CanonicalEvent, _settings: &ProviderSettings) -> DomainResult<Value> {
        Err(export_unsupported(CalendarProvider::Mindbody))
    }

    async fn create_event(
        &self,
        _token: &AccessToken,
        _event: &CanonicalEvent,
        _settings: &ProviderSettings,
    ) -> DomainResult<NativeEvent> {
        Err(export_unsupported(CalendarProvider::Mindbody))
    }

    async fn update_event(
        &self,
        _token: &AccessToken,
        _external_id: &str,
        _event: &CanonicalEvent,
        _settings: &ProviderSettings,
    ) -> DomainResult<NativeEvent> {
        Err(export_unsupported(CalendarProvider::Mindbody))
    }

    async fn delete_event(
        &self,
        _token: &AccessToken,
        _external_id: &str,
        _settings: &ProviderSettings,
    ) -> DomainResult<()> {
        Err(export_unsupported(CalendarProvider::Mindbody))
    }

    async fn get_account_info(&self, token: &AccessToken) -> DomainResult<ProviderAccount> {
        let sites = self.api.get(token, "site/sites", &[]).await?;
        let site = sites
            .pointer("/Sites/0")
            .ok_or_else(|| StudioSyncError::Validation("mindbody token has no site".into()))?;
        let site_id = i64_at(site, "/Id")
            .map(|id| id.to_string())
            .ok_or_else(|| StudioSyncError::Validation("mindbody site has no id".into()))?;
        Ok(ProviderAccount {
            account_id: site_id.clone(),
            display_name: str_at(site, "/Name"),
            email: str_at(site, "/ContactEmail"),
            timezone: str_at(site, "/TimeZone"),
            default_target: None,
            parent_id: Some(site_id),
        })
    }

    fn default_settings(&self, account: &ProviderAccount) -> ProviderSettings {
        ProviderSettings::Mindbody(MindbodySettings {
            site_id: account.parent_id.clone().unwrap_or_else(|| account.account_id.clone()),
            location_id: account.default_target.clone(),
            sync_class_schedules: true,
            sync_appointments: false,
            staff_mapping: Default::default(),
            timezone: account.timezone.clone().unwrap_or_else(|| "UTC".into()),
        })
    }
}
