//! tickwatch application.
//!
//! Wires the quote feed, monitor store, dispatcher, matching engine and HTTP
//! API together:
//!
//! ```text
//!   Fugle WS ──> FugleQuoteFeed ──> FeedManager lanes ──> MatchingEngine
//!                                                          │        │
//!   HTTP API ──> MonitorService ──> MonitorStore <─────────┘        v
//!                     │                                   ActionDispatcher
//!                     └──> PriceIndex                     (LINE / trader)
//! ```

pub mod app;
pub mod config;
pub mod error;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
