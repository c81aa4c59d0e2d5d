//! Prometheus metrics and structured logging for tickwatch.
//!
//! - `init_logging`: tracing subscriber, JSON in production, pretty otherwise
//! - `Metrics`: facade over the process-wide Prometheus registry
//! - `encode_metrics`: text exposition for the `/metrics` endpoint

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, DEFAULT_FILTER};
pub use metrics::{encode_metrics, Metrics};
