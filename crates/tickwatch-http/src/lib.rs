//! HTTP adapter for the monitor service.
//!
//! ```text
//! GET    /monitor/alerts          list alert monitors
//! POST   /monitor/alerts          create an alert monitor (201)
//! DELETE /monitor/alerts/{id}     cancel (204 / 404)
//! GET    /monitor/orders          list order monitors
//! POST   /monitor/orders          create an order monitor (201)
//! DELETE /monitor/orders/{id}     cancel (204 / 404)
//! GET    /health                  liveness and subscription counts
//! GET    /metrics                 Prometheus text format
//! ```
//!
//! `/monitor/*` requires `Authorization: Bearer <token>` when a token is
//! configured.

mod config;
mod error;
mod server;
mod types;

pub use config::HttpConfig;
pub use error::ApiError;
pub use server::{create_router, run_server, AppState};
pub use types::{CreateAlertRequest, CreateOrderRequest, MonitorView};
