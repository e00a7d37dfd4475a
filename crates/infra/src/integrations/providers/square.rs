//! Square Appointments adapter
//!
//! Bookings only carry ids. Before conversion each booking is enriched
//! with its service variation (name, description, price, duration) from the
//! catalog and its team member from the team directory, under the
//! `service` and `team_member` keys.
//!
//! Exported schedules become bookings of the service variation and team
//! member named in the settings. Updates and cancellations send the
//! booking's current version, which Square uses for optimistic locking.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Duration;
use reqwest::Method;
use serde_json::{json, Value};
use studiosync_core::{AccessToken, NativeEvent, ProviderAdapter};
use studiosync_domain::{
    CalendarProvider, CanonicalEvent, ProviderAccount, ProviderSettings, Result as DomainResult,
    SquareSettings, StudioSyncError, SyncWindow,
};
use tracing::{debug, instrument, warn};

use super::{
    fill_workshop_details, i64_at, opt_timestamp_at, require_id, settings_mismatch, str_at,
    timestamp_at, ProviderApi,
};
use crate::http::HttpClient;

pub const SQUARE_API_BASE: &str = "https://connect.squareup.com";
pub const SQUARE_API_VERSION: &str = "2023-10-18";
const PAGE_LIMIT: u32 = 100;

/// Lookups used to enrich bookings.
#[derive(Debug, Default)]
struct Directory {
    /// Variation id to a flattened service description.
    services: HashMap<String, Value>,
    /// Team member id to the Square team member object.
    team_members: HashMap<String, Value>,
}

pub struct SquareAdapter {
    api: ProviderApi,
}

impl SquareAdapter {
    pub fn new(http: HttpClient, base_url: Option<&str>) -> DomainResult<Self> {
        let api = ProviderApi::new(http, base_url.unwrap_or(SQUARE_API_BASE))
            .with_header("square-version", SQUARE_API_VERSION)?;
        Ok(Self { api })
    }

    fn settings<'a>(&self, settings: &'a ProviderSettings) -> DomainResult<&'a SquareSettings> {
        match settings {
            ProviderSettings::Square(square) => Ok(square),
            other => Err(settings_mismatch(CalendarProvider::Square, other)),
        }
    }

    async fn search_bookings(
        &self,
        token: &AccessToken,
        window: &SyncWindow,
        settings: &SquareSettings,
    ) -> DomainResult<Vec<Value>> {
        let mut bookings = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut filter = json!({
                "start_at_range": {
                    "start_at": window.start.to_rfc3339(),
                    "end_at": window.end.to_rfc3339(),
                },
            });
            if !settings.location_id.is_empty() {
                filter["location_id"] = json!(settings.location_id);
            }
            let mut body = json!({ "query": { "filter": filter }, "limit": PAGE_LIMIT });
            if let Some(cursor) = cursor.take() {
                body["cursor"] = json!(cursor);
            }

            let mut page = self.api.send(Method::POST, token, "v2/bookings/search", &body).await?;
            if let Some(Value::Array(batch)) = page.get_mut("bookings").map(Value::take) {
                bookings.extend(batch);
            }
            match str_at(&page, "/cursor") {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(bookings)
    }

    /// Drain a cursor-paginated GET endpoint, collecting `key`.
    async fn list_all(
        &self,
        token: &AccessToken,
        path: &str,
        key: &str,
        base_query: &[(&str, String)],
    ) -> DomainResult<Vec<Value>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = base_query.to_vec();
            if let Some(cursor) = cursor.take() {
                query.push(("cursor", cursor));
            }
            let mut page = self.api.get(token, path, &query).await?;
            if let Some(Value::Array(batch)) = page.get_mut(key).map(Value::take) {
                items.extend(batch);
            }
            match str_at(&page, "/cursor") {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(items)
    }

    async fn services(&self, token: &AccessToken) -> DomainResult<HashMap<String, Value>> {
        let objects = self.list_all(token, "v2/catalog/list", "objects", &[("types", "ITEM".into())]).await?;
        let mut services = HashMap::new();
        for item in objects.iter().filter(|o| str_at(o, "/type").as_deref() == Some("ITEM")) {
            let name = str_at(item, "/item_data/name");
            let description = str_at(item, "/item_data/description");
            let variations = item
                .pointer("/item_data/variations")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for variation in variations {
                let Some(id) = str_at(variation, "/id") else { continue };
                services.insert(
                    id,
                    json!({
                        "name": name,
                        "description": description,
                        "duration_ms": i64_at(variation, "/item_variation_data/service_duration"),
                        "price_amount": i64_at(variation, "/item_variation_data/price_money/amount"),
                        "currency": str_at(variation, "/item_variation_data/price_money/currency"),
                    }),
                );
            }
        }
        Ok(services)
    }

    async fn team_members(&self, token: &AccessToken) -> DomainResult<HashMap<String, Value>> {
        let members = self.list_all(token, "v2/team-members", "team_members", &[]).await?;
        Ok(members
            .into_iter()
            .filter_map(|member| str_at(&member, "/id").map(|id| (id, member)))
            .collect())
    }

    /// Lookups the settings ask for. A failed lookup degrades to plain
    /// bookings unless it is an auth or transient failure.
    async fn directory(&self, token: &AccessToken, settings: &SquareSettings) -> DomainResult<Directory> {
        let mut directory = Directory::default();
        if settings.sync_services {
            match self.services(token).await {
                Ok(services) => directory.services = services,
                Err(err) if err.is_unauthorized() || err.is_transient() => return Err(err),
                Err(err) => warn!(error = %err, "catalog lookup failed; bookings keep generic titles"),
            }
        }
        if settings.sync_team_members {
            match self.team_members(token).await {
                Ok(members) => directory.team_members = members,
                Err(err) if err.is_unauthorized() || err.is_transient() => return Err(err),
                Err(err) => warn!(error = %err, "team member lookup failed; bookings keep no instructor"),
            }
        }
        Ok(directory)
    }

    fn enrich(mut booking: Value, directory: &Directory) -> NativeEvent {
        let service = str_at(&booking, "/appointment_segments/0/service_variation_id")
            .and_then(|id| directory.services.get(&id).cloned());
        let member = str_at(&booking, "/appointment_segments/0/team_member_id")
            .and_then(|id| directory.team_members.get(&id).cloned());
        if let Value::Object(map) = &mut booking {
            if let Some(service) = service {
                map.insert("service".into(), service);
            }
            if let Some(member) = member {
                map.insert("team_member".into(), member);
            }
        }
        NativeEvent::new(booking)
    }
}

impl SquareAdapter {
    async fn booking(&self, token: &AccessToken, booking_id: &str) -> DomainResult<Value> {
        let path = format!("v2/bookings/{}", urlencoding::encode(booking_id));
        let mut body = self.api.get(token, &path, &[]).await?;
        body.get_mut("booking")
            .map(Value::take)
            .ok_or_else(|| StudioSyncError::Validation(format!("square booking {booking_id} missing from response")))
    }

    async fn variation_version(&self, token: &AccessToken, variation_id: &str) -> DomainResult<Option<i64>> {
        let path = format!("v2/catalog/object/{}", urlencoding::encode(variation_id));
        let object = self.api.get(token, &path, &[]).await?;
        Ok(i64_at(&object, "/object/version"))
    }

    /// The booking in a write response, enriched like a fetched one so the
    /// stored copy matches the next fetch.
    async fn written(
        &self,
        token: &AccessToken,
        settings: &SquareSettings,
        mut response: Value,
    ) -> DomainResult<NativeEvent> {
        let booking = response
            .get_mut("booking")
            .map(Value::take)
            .ok_or_else(|| StudioSyncError::Validation("square write response has no booking".into()))?;
        let directory = self.directory(token, settings).await?;
        Ok(Self::enrich(booking, &directory))
    }
}

fn duration_minutes(event: &CanonicalEvent) -> i64 {
    (event.end_time - event.start_time).num_minutes().max(1)
}

fn is_cancelled(status: Option<&str>) -> bool {
    matches!(
        status,
        Some("CANCELLED_BY_CUSTOMER" | "CANCELLED_BY_SELLER" | "DECLINED" | "NO_SHOW")
    )
}

#[async_trait]
impl ProviderAdapter for SquareAdapter {
    fn provider(&self) -> CalendarProvider {
        CalendarProvider::Square
    }

    #[instrument(skip(self, token, settings), fields(provider = "square"))]
    async fn list_events(
        &self,
        token: &AccessToken,
        window: &SyncWindow,
        settings: &ProviderSettings,
    ) -> DomainResult<Vec<NativeEvent>> {
        let settings = self.settings(settings)?;
        let bookings = self.search_bookings(token, window, settings).await?;
        if bookings.is_empty() {
            return Ok(Vec::new());
        }

        let directory = self.directory(token, settings).await?;
        debug!(
            bookings = bookings.len(),
            services = directory.services.len(),
            team_members = directory.team_members.len(),
            "square bookings fetched"
        );
        Ok(bookings.into_iter().map(|booking| Self::enrich(booking, &directory)).collect())
    }

    fn to_canonical(
        &self,
        native: &NativeEvent,
        settings: &ProviderSettings,
    ) -> DomainResult<CanonicalEvent> {
        let settings = self.settings(settings)?;
        let payload = &native.payload;
        let external_id = require_id(native, "/id")?;
        let start_time = timestamp_at(payload, "/start_at")
            .or_else(|_| timestamp_at(payload, "/appointment_segments/0/start_at"))?;

        // Segments carry minutes; the catalog carries milliseconds.
        let end_time = match opt_timestamp_at(payload, "/appointment_segments/0/end_at") {
            Some(end) => end,
            None => {
                let segment_minutes: i64 = payload
                    .get("appointment_segments")
                    .and_then(Value::as_array)
                    .map(|segments| {
                        segments.iter().filter_map(|s| i64_at(s, "/duration_minutes")).sum()
                    })
                    .unwrap_or(0);
                let duration = if segment_minutes > 0 {
                    Duration::minutes(segment_minutes)
                } else {
                    i64_at(payload, "/service/duration_ms").map(Duration::milliseconds).ok_or_else(|| {
                        StudioSyncError::Validation(format!("booking {external_id} has no duration"))
                    })?
                };
                start_time + duration
            }
        };

        let variation_id = str_at(payload, "/appointment_segments/0/service_variation_id");
        let instructor_name = match (
            str_at(payload, "/team_member/given_name"),
            str_at(payload, "/team_member/family_name"),
        ) {
            (Some(given), Some(family)) => Some(format!("{given} {family}")),
            (given, family) => given.or(family),
        };

        let mut event = CanonicalEvent {
            external_id,
            title: str_at(payload, "/service/name").unwrap_or_else(|| "Square Appointment".into()),
            description: str_at(payload, "/service/description"),
            start_time,
            end_time,
            instructor_name,
            instructor_email: str_at(payload, "/team_member/email_address"),
            location: str_at(payload, "/location_id"),
            category: variation_id.and_then(|id| settings.service_categories.get(&id).cloned()),
            price: i64_at(payload, "/service/price_amount"),
            cancelled: is_cancelled(str_at(payload, "/status").as_deref()),
            remote_updated_at: opt_timestamp_at(payload, "/updated_at"),
            raw_data: payload.clone(),
            ..CanonicalEvent::default()
        };
        fill_workshop_details(&mut event);
        Ok(event)
    }

    /// Create-booking body; needs a service variation and team member in
    /// the settings.
    fn from_canonical(&self, event: &CanonicalEvent, settings: &ProviderSettings) -> DomainResult<Value> {
        let settings = self.settings(settings)?;
        let (Some(variation_id), Some(team_member_id)) =
            (settings.service_variation_id.as_deref(), settings.team_member_id.as_deref())
        else {
            return Err(StudioSyncError::Config(
                "square export needs service_variation_id and team_member_id in the integration settings".into(),
            ));
        };

        let mut booking = json!({
            "start_at": event.start_time.to_rfc3339(),
            "appointment_segments": [{
                "duration_minutes": duration_minutes(event),
                "service_variation_id": variation_id,
                "team_member_id": team_member_id,
            }],
            "seller_note": event.title,
        });
        if !settings.location_id.is_empty() {
            booking["location_id"] = json!(settings.location_id);
        }
        Ok(json!({ "booking": booking }))
    }

    fn supports_export(&self) -> bool {
        true
    }

    #[instrument(skip(self, token, event, settings), fields(provider = "square"))]
    async fn create_event(
        &self,
        token: &AccessToken,
        event: &CanonicalEvent,
        settings: &ProviderSettings,
    ) -> DomainResult<NativeEvent> {
        let mut body = self.from_canonical(event, settings)?;
        let settings = self.settings(settings)?;
        if let Some(variation_id) = settings.service_variation_id.as_deref() {
            if let Some(version) = self.variation_version(token, variation_id).await? {
                body["booking"]["appointment_segments"][0]["service_variation_version"] = json!(version);
            }
        }

        let created = self.api.send(Method::POST, token, "v2/bookings", &body).await?;
        self.written(token, settings, created).await
    }

    /// Moves the booking; service and team member stay as booked.
    #[instrument(skip(self, token, event, settings), fields(provider = "square"))]
    async fn update_event(
        &self,
        token: &AccessToken,
        external_id: &str,
        event: &CanonicalEvent,
        settings: &ProviderSettings,
    ) -> DomainResult<NativeEvent> {
        let settings = self.settings(settings)?;
        let current = self.booking(token, external_id).await?;

        let mut segments = current
            .get("appointment_segments")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        match segments.first_mut() {
            Some(first) => first["duration_minutes"] = json!(duration_minutes(event)),
            None => segments.push(json!({ "duration_minutes": duration_minutes(event) })),
        }
        let mut booking = json!({
            "start_at": event.start_time.to_rfc3339(),
            "appointment_segments": segments,
        });
        if let Some(version) = i64_at(&current, "/version") {
            booking["version"] = json!(version);
        }

        let path = format!("v2/bookings/{}", urlencoding::encode(external_id));
        let updated = self.api.send(Method::PUT, token, &path, &json!({ "booking": booking })).await?;
        self.written(token, settings, updated).await
    }

    #[instrument(skip(self, token, _settings), fields(provider = "square"))]
    async fn delete_event(
        &self,
        token: &AccessToken,
        external_id: &str,
        _settings: &ProviderSettings,
    ) -> DomainResult<()> {
        let current = self.booking(token, external_id).await?;
        let mut body = json!({});
        if let Some(version) = i64_at(&current, "/version") {
            body["booking_version"] = json!(version);
        }
        let path = format!("v2/bookings/{}/cancel", urlencoding::encode(external_id));
        self.api.send(Method::POST, token, &path, &body).await.map(|_| ())
    }

    async fn get_account_info(&self, token: &AccessToken) -> DomainResult<ProviderAccount> {
        let merchant = self.api.get(token, "v2/merchants/me", &[]).await?;
        let merchant_id = str_at(&merchant, "/merchant/id")
            .ok_or_else(|| StudioSyncError::Validation("square merchant has no id".into()))?;
        let locations = self.api.get(token, "v2/locations", &[]).await?;

        let main = str_at(&merchant, "/merchant/main_location_id");
        let location = locations
            .get("locations")
            .and_then(Value::as_array)
            .and_then(|all| {
                all.iter()
                    .find(|l| main.is_some() && str_at(l, "/id") == main)
                    .or_else(|| all.first())
            })
            .cloned()
            .unwrap_or(Value::Null);

        Ok(ProviderAccount {
            account_id: merchant_id.clone(),
            display_name: str_at(&merchant, "/merchant/business_name"),
            email: None,
            timezone: str_at(&location, "/timezone"),
            default_target: str_at(&location, "/id").or(main),
            parent_id: Some(merchant_id),
        })
    }

    fn default_settings(&self, account: &ProviderAccount) -> ProviderSettings {
        ProviderSettings::Square(SquareSettings {
            location_id: account.default_target.clone().unwrap_or_default(),
            merchant_id: account.parent_id.clone(),
            sync_services: true,
            sync_team_members: true,
            ..SquareSettings::default()
        })
    }

    /// `booking.created` / `booking.updated` notifications.
    #[instrument(skip_all, fields(provider = "square"))]
    async fn normalize_webhook(
        &self,
        token: &AccessToken,
        settings: &ProviderSettings,
        payload: &Value,
    ) -> DomainResult<Option<NativeEvent>> {
        let kind = str_at(payload, "/type").unwrap_or_default();
        if !matches!(kind.as_str(), "booking.created" | "booking.updated") {
            debug!(event = %kind, "ignoring square webhook");
            return Ok(None);
        }
        let booking = payload
            .pointer("/data/object/booking")
            .cloned()
            .ok_or_else(|| StudioSyncError::Validation("square webhook has no booking".into()))?;

        let directory = self.directory(token, self.settings(settings)?).await?;
        Ok(Some(Self::enrich(booking, &directory)))
    }
}
