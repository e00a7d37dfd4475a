//! Column codecs shared by the SQLite repositories
//!
//! Timestamps are stored as epoch milliseconds, booleans as 0/1 and status
//! enums as their `as_str` form.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use serde::de::DeserializeOwned;
use serde::Serialize;
use studiosync_domain::{Result as DomainResult, StudioSyncError};
use tracing::warn;

pub(crate) fn to_millis(value: DateTime<Utc>) -> i64 {
    value.timestamp_millis()
}

pub(crate) fn opt_millis(value: Option<DateTime<Utc>>) -> Option<i64> {
    value.map(to_millis)
}

pub(crate) fn from_millis(index: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            index,
            Type::Integer,
            format!("timestamp out of range: {millis}").into(),
        )
    })
}

pub(crate) fn from_opt_millis(index: usize, millis: Option<i64>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    millis.map(|ms| from_millis(index, ms)).transpose()
}

pub(crate) const fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) const fn int_to_bool(value: i64) -> bool {
    value != 0
}

/// Parse a required enum column; unknown values are a conversion error.
pub(crate) fn parse_enum<T: FromStr<Err = String>>(index: usize, raw: &str) -> rusqlite::Result<T> {
    raw.parse::<T>()
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, err.into()))
}

/// Parse a status column, falling back to the default for unknown values.
pub(crate) fn parse_status<T: FromStr<Err = String> + Default>(column: &str, raw: &str) -> T {
    raw.parse::<T>().unwrap_or_else(|err| {
        warn!(column, value = raw, error = %err, "unknown status in database; using default");
        T::default()
    })
}

pub(crate) fn parse_json<T: DeserializeOwned>(index: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err)))
}

pub(crate) fn parse_opt_json<T: DeserializeOwned>(index: usize, raw: Option<String>) -> rusqlite::Result<Option<T>> {
    raw.map(|raw| parse_json(index, &raw)).transpose()
}

pub(crate) fn to_json<T: Serialize>(value: &T) -> DomainResult<String> {
    serde_json::to_string(value)
        .map_err(|err| StudioSyncError::Internal(format!("failed to serialize column: {err}")))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use studiosync_domain::SyncStatus;

    use super::*;

    #[test]
    fn millis_round_trip_keeps_millisecond_precision() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap() + chrono::Duration::milliseconds(250);
        assert_eq!(from_millis(0, to_millis(at)).unwrap(), at);
        assert_eq!(from_opt_millis(0, None).unwrap(), None);
    }

    #[test]
    fn unknown_status_falls_back_to_default() {
        assert_eq!(parse_status::<SyncStatus>("sync_status", "paused"), SyncStatus::Paused);
        assert_eq!(parse_status::<SyncStatus>("sync_status", "bogus"), SyncStatus::Active);
    }

    #[test]
    fn unknown_enum_is_a_conversion_error() {
        let err = parse_enum::<studiosync_domain::CalendarProvider>(2, "myspace").unwrap_err();
        assert!(matches!(err, rusqlite::Error::FromSqlConversionFailure(2, Type::Text, _)));
    }
}
