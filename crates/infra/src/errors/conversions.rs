//! Conversions from external infrastructure errors into domain errors.

use r2d2::Error as PoolError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;
use studiosync_domain::{ProviderErrorKind, StudioSyncError};
use tokio::task::JoinError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub StudioSyncError);

impl From<InfraError> for StudioSyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<StudioSyncError> for InfraError {
    fn from(value: StudioSyncError) -> Self {
        Self(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoStudioSyncError {
    fn into_studiosync(self) -> StudioSyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → StudioSyncError */
/* -------------------------------------------------------------------------- */

impl IntoStudioSyncError for SqlError {
    fn into_studiosync(self) -> StudioSyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        StudioSyncError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        StudioSyncError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => StudioSyncError::Database(
                        format!("unique constraint violation: {message}"),
                    ),
                    (ErrorCode::ConstraintViolation, 787) => {
                        StudioSyncError::Database("foreign key constraint violation".into())
                    }
                    _ => StudioSyncError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => StudioSyncError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                StudioSyncError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, name, ty) => {
                StudioSyncError::Database(format!("invalid column type for {name}: {ty}"))
            }
            RE::Utf8Error(_) => {
                StudioSyncError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidPath(path) => StudioSyncError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => StudioSyncError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        Self(value.into_studiosync())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → StudioSyncError */
/* -------------------------------------------------------------------------- */

impl IntoStudioSyncError for PoolError {
    fn into_studiosync(self) -> StudioSyncError {
        StudioSyncError::Database(format!("connection pool: {self}"))
    }
}

impl From<PoolError> for InfraError {
    fn from(value: PoolError) -> Self {
        Self(value.into_studiosync())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → StudioSyncError */
/* -------------------------------------------------------------------------- */

impl IntoStudioSyncError for HttpError {
    fn into_studiosync(self) -> StudioSyncError {
        if self.is_timeout() {
            return StudioSyncError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return StudioSyncError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));
            return StudioSyncError::provider(classify_status(code), message);
        }

        if self.is_decode() {
            return StudioSyncError::Validation(format!("malformed response body: {self}"));
        }

        StudioSyncError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        Self(value.into_studiosync())
    }
}

/// Provider error kind for an HTTP status code.
pub(crate) const fn classify_status(code: u16) -> ProviderErrorKind {
    match code {
        401 | 403 => ProviderErrorKind::Unauthorized,
        404 | 410 => ProviderErrorKind::NotFound,
        429 => ProviderErrorKind::RateLimited,
        500..=599 => ProviderErrorKind::Transient,
        _ => ProviderErrorKind::Unknown,
    }
}

/// Map a failed `spawn_blocking` join into the domain error.
pub fn map_join_error(err: JoinError) -> StudioSyncError {
    if err.is_cancelled() {
        StudioSyncError::Internal("blocking database task cancelled".into())
    } else {
        StudioSyncError::Internal(format!("blocking database task panicked: {err}"))
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use reqwest::{Client, StatusCode};
    use rusqlite::ffi::{Error as FfiError, ErrorCode};
    use rusqlite::Error as SqlError;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn sqlite_busy_maps_to_database_error() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::DatabaseBusy, extended_code: 5 },
            Some("database is locked".into()),
        );

        let mapped: StudioSyncError = InfraError::from(err).into();
        match mapped {
            StudioSyncError::Database(msg) => assert!(msg.contains("busy")),
            other => panic!("expected database error, got {other:?}"),
        }
    }

    #[test]
    fn unique_violation_is_named() {
        let err = SqlError::SqliteFailure(
            FfiError { code: ErrorCode::ConstraintViolation, extended_code: 2067 },
            Some("UNIQUE constraint failed: imported_events.external_id".into()),
        );

        let mapped: StudioSyncError = InfraError::from(err).into();
        assert!(matches!(mapped, StudioSyncError::Database(ref m) if m.contains("unique")));
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        let mapped: StudioSyncError = InfraError::from(SqlError::QueryReturnedNoRows).into();
        assert!(matches!(mapped, StudioSyncError::NotFound(_)));
    }

    #[test]
    fn status_codes_follow_provider_taxonomy() {
        assert_eq!(classify_status(401), ProviderErrorKind::Unauthorized);
        assert_eq!(classify_status(403), ProviderErrorKind::Unauthorized);
        assert_eq!(classify_status(404), ProviderErrorKind::NotFound);
        assert_eq!(classify_status(429), ProviderErrorKind::RateLimited);
        assert_eq!(classify_status(503), ProviderErrorKind::Transient);
        assert_eq!(classify_status(422), ProviderErrorKind::Unknown);
    }

    #[tokio::test]
    async fn http_status_401_maps_to_unauthorized_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(StatusCode::UNAUTHORIZED))
            .mount(&server)
            .await;

        let client = Client::builder().no_proxy().build().unwrap();
        let error = client.get(server.uri()).send().await.unwrap().error_for_status().unwrap_err();

        let mapped: StudioSyncError = InfraError::from(error).into();
        assert!(mapped.is_unauthorized(), "expected unauthorized, got {mapped:?}");
        assert!(mapped.to_string().contains("401"));
    }
}
