//! Threshold matching and dispatch for tickwatch.
//!
//! - [`PriceIndex`]: ordered thresholds per (symbol, direction)
//! - [`MatchingEngine`]: per-tick crossing detection, claim and dispatch
//! - [`MonitorService`]: create/list/get/remove and startup restore

pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod service;

pub use config::EngineConfig;
pub use engine::MatchingEngine;
pub use error::{EngineError, EngineResult};
pub use index::{IndexKey, PriceIndex};
pub use service::{MonitorService, RestoreReport};
