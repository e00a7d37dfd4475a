//! reqwest-backed provider adapters
//!
//! Each adapter speaks one provider's REST API and converts its payloads to
//! [`CanonicalEvent`]s. The helpers here cover what they share: base URL
//! handling, authenticated JSON requests and lenient field extraction.

pub mod acuity;
pub mod calendly;
pub mod google;
pub mod mindbody;
pub mod outlook;
pub mod square;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder};
use serde_json::Value;
use studiosync_core::{AccessToken, NativeEvent};
use studiosync_domain::{
    extract_workshop_details, CalendarProvider, CanonicalEvent, ProviderSettings,
    Result as DomainResult, StudioSyncError,
};

pub use acuity::AcuityAdapter;
pub use calendly::CalendlyAdapter;
pub use google::GoogleCalendarAdapter;
pub use mindbody::MindbodyAdapter;
pub use outlook::OutlookCalendarAdapter;
pub use square::SquareAdapter;

use crate::http::HttpClient;

/// How the access token is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenScheme {
    Bearer,
    /// Bare token in `Authorization` (Mindbody staff tokens).
    Raw,
}

/// Authenticated JSON access to one provider API.
#[derive(Clone)]
pub(crate) struct ProviderApi {
    http: HttpClient,
    base_url: String,
    headers: HeaderMap,
    scheme: TokenScheme,
}

impl ProviderApi {
    pub(crate) fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            headers: HeaderMap::new(),
            scheme: TokenScheme::Bearer,
        }
    }

    /// Add a header sent with every request.
    pub(crate) fn with_header(mut self, name: &'static str, value: &str) -> DomainResult<Self> {
        let value = HeaderValue::from_str(value).map_err(|err| {
            StudioSyncError::Config(format!("invalid value for header {name}: {err}"))
        })?;
        self.headers.insert(HeaderName::from_static(name), value);
        Ok(self)
    }

    pub(crate) fn with_scheme(mut self, scheme: TokenScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Absolute URLs (pagination links) pass through unchanged.
    pub(crate) fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base_url, path.trim_start_matches('/'))
        }
    }

    pub(crate) fn request(&self, method: Method, token: &AccessToken, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, self.url(path)).headers(self.headers.clone());
        match self.scheme {
            TokenScheme::Bearer => builder.bearer_auth(token.secret()),
            TokenScheme::Raw => builder.header(AUTHORIZATION, token.secret()),
        }
    }

    pub(crate) async fn get(
        &self,
        token: &AccessToken,
        path: &str,
        query: &[(&str, String)],
    ) -> DomainResult<Value> {
        self.http.send_json(self.request(Method::GET, token, path).query(query)).await
    }

    pub(crate) async fn send(
        &self,
        method: Method,
        token: &AccessToken,
        path: &str,
        body: &Value,
    ) -> DomainResult<Value> {
        self.http.send_json(self.request(method, token, path).json(body)).await
    }

    pub(crate) async fn delete(&self, token: &AccessToken, path: &str) -> DomainResult<()> {
        self.http.send_empty(self.request(Method::DELETE, token, path)).await
    }

    /// Send with an extra per-request header.
    pub(crate) async fn get_with_header(
        &self,
        token: &AccessToken,
        path: &str,
        query: &[(&str, String)],
        header: (&'static str, &str),
    ) -> DomainResult<Value> {
        let value = HeaderValue::from_str(header.1).map_err(|err| {
            StudioSyncError::Config(format!("invalid value for header {}: {err}", header.0))
        })?;
        self.http
            .send_json(self.request(Method::GET, token, path).query(query).header(header.0, value))
            .await
    }
}

/// String at a JSON pointer, ignoring empty strings.
pub(crate) fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Integer at a JSON pointer; numeric strings are accepted.
pub(crate) fn i64_at(value: &Value, pointer: &str) -> Option<i64> {
    match value.pointer(pointer)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn u32_at(value: &Value, pointer: &str) -> Option<u32> {
    i64_at(value, pointer).and_then(|n| u32::try_from(n).ok())
}

pub(crate) fn bool_at(value: &Value, pointer: &str) -> bool {
    value.pointer(pointer).and_then(Value::as_bool).unwrap_or(false)
}

/// Id of the native event, from the adapter's own id or `pointer`.
///
/// Numeric ids (Acuity, Mindbody) are stringified.
pub(crate) fn require_id(native: &NativeEvent, pointer: &str) -> DomainResult<String> {
    if let Some(id) = &native.id {
        return Ok(id.clone());
    }
    match native.payload.pointer(pointer) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(StudioSyncError::Validation(format!("event payload has no id at {pointer}"))),
    }
}

/// RFC 3339 timestamp at `pointer`.
pub(crate) fn timestamp_at(value: &Value, pointer: &str) -> DomainResult<DateTime<Utc>> {
    let raw = value
        .pointer(pointer)
        .and_then(Value::as_str)
        .ok_or_else(|| StudioSyncError::Validation(format!("missing timestamp at {pointer}")))?;
    parse_timestamp(raw)
        .ok_or_else(|| StudioSyncError::Validation(format!("unparseable timestamp {raw:?} at {pointer}")))
}

pub(crate) fn opt_timestamp_at(value: &Value, pointer: &str) -> Option<DateTime<Utc>> {
    value.pointer(pointer).and_then(Value::as_str).and_then(parse_timestamp)
}

/// RFC 3339, or ISO 8601 with a compact `+hhmm` offset.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z"))
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Offset-less wall-clock time interpreted in `zone` (UTC when unknown).
pub(crate) fn parse_local(raw: &str, zone: &str) -> Option<DateTime<Utc>> {
    if let Some(at) = parse_timestamp(raw) {
        return Some(at);
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()?;
    localize(naive, zone)
}

/// Midnight of an all-day date in `zone`.
pub(crate) fn parse_date(raw: &str, zone: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    localize(date.and_hms_opt(0, 0, 0)?, zone)
}

fn localize(naive: NaiveDateTime, zone: &str) -> Option<DateTime<Utc>> {
    match zone.parse::<Tz>() {
        Ok(tz) => tz.from_local_datetime(&naive).earliest().map(|at| at.with_timezone(&Utc)),
        Err(_) => Some(Utc.from_utc_datetime(&naive)),
    }
}

/// Fill category, skill level and capacity the provider left empty from
/// the event's text.
pub(crate) fn fill_workshop_details(event: &mut CanonicalEvent) {
    let details = extract_workshop_details(&event.title, event.description.as_deref());
    if event.category.is_none() {
        event.category = details.category;
    }
    if event.skill_level.is_none() {
        event.skill_level = details.skill_level;
    }
    if event.max_participants.is_none() {
        event.max_participants = details.max_participants;
    }
}

/// Money string ("45.00") to minor units.
pub(crate) fn parse_minor_units(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let (sign, digits) = match raw.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, raw),
    };
    let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
    let whole: i64 = whole.parse().ok()?;
    let cents: i64 = match frac.len() {
        0 => 0,
        1 => frac.parse::<i64>().ok()? * 10,
        _ => frac.get(..2)?.parse().ok()?,
    };
    Some(sign * (whole * 100 + cents))
}

/// Error for a settings blob of another provider's shape.
pub(crate) fn settings_mismatch(provider: CalendarProvider, settings: &ProviderSettings) -> StudioSyncError {
    StudioSyncError::Config(format!(
        "{provider} adapter received {} settings",
        settings.provider()
    ))
}

/// Error for an export call on a read-only provider.
pub(crate) fn export_unsupported(provider: CalendarProvider) -> StudioSyncError {
    StudioSyncError::Config(format!("{provider} does not accept event writes"))
}

/// Last path segment of a resource URI (Calendly ids).
pub(crate) fn uri_id(uri: &str) -> &str {
    uri.trim_end_matches('/').rsplit('/').next().unwrap_or(uri)
}
