//! Action dispatch for triggered monitors.
//!
//! - [`Notifier`]: delivers alert text (LINE Notify in production)
//! - [`Broker`]: fire-and-forget order submission (HTTP trader service)
//! - [`ActionDispatcher`]: routes a triggered monitor to one of the two
//! - [`format_alert_message`]: the alert text template

pub mod broker;
pub mod dispatcher;
pub mod error;
pub mod notifier;
pub mod template;

pub use broker::{Broker, DynBroker, HttpBroker, HttpBrokerConfig, MockBroker};
pub use dispatcher::{ActionDispatcher, DispatchOutcome};
pub use error::{DispatchError, DispatchResult};
pub use notifier::{DynNotifier, LineNotifier, LineNotifyConfig, MockNotifier, Notifier};
pub use template::{format_alert_message, parse_display_offset, DEFAULT_DISPLAY_OFFSET};
