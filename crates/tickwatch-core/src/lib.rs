//! Core domain types for the tickwatch price monitor.
//!
//! This crate provides the types shared by every other tickwatch crate:
//! - `Price`, `Volume`: precision-safe numeric types
//! - `Symbol`: validated instrument identifier
//! - `Monitor`, `MonitorSpec`, `Action`, `Direction`: the watch condition model
//! - `Quote`: one inbound tick from the live feed

pub mod decimal;
pub mod error;
pub mod monitor;
pub mod quote;
pub mod symbol;

pub use decimal::{Price, Volume};
pub use error::{CoreError, Result};
pub use monitor::{
    Action, ActionKind, AlertAction, Direction, Monitor, MonitorId, MonitorSpec, OrderPayload,
};
pub use quote::Quote;
pub use symbol::Symbol;

use std::pin::Pin;

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;
