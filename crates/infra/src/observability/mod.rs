//! Tracing initialisation
//!
//! `RUST_LOG` controls the filter (default `info`). JSON output is meant for
//! log shippers; the plain formatter is for terminals.

use studiosync_domain::{Result, StudioSyncError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber.
///
/// # Errors
/// `Internal` when a global subscriber is already installed.
pub fn init_tracing(json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let installed = if json {
        registry.with(tracing_subscriber::fmt::layer().json().with_current_span(true)).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).try_init()
    };
    installed.map_err(|err| StudioSyncError::Internal(format!("tracing already initialised: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_initialisation_is_an_error() {
        // The first call may race other tests that installed a subscriber.
        let _ = init_tracing(false);
        assert!(matches!(init_tracing(true), Err(StudioSyncError::Internal(_))));
    }
}
