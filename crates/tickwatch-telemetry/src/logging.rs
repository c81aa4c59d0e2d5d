//! Structured logging initialization.

use crate::error::{TelemetryError, TelemetryResult};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default for the `telemetry.log_filter` setting.
pub const DEFAULT_FILTER: &str = "info,tickwatch=debug";

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` overrides `default_filter`. JSON lines when
/// `RUST_ENV=production`, pretty output otherwise. Fails if a subscriber is
/// already installed.
pub fn init_logging(default_filter: &str) -> TelemetryResult<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|e| TelemetryError::LoggingInit(format!("{default_filter}: {e}")))?,
    };

    let is_production = std::env::var("RUST_ENV")
        .map(|v| v == "production")
        .unwrap_or(false);

    let result = if is_production {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(true))
            .try_init()
    };

    result.map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}
