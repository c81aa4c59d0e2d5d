//! Routes a triggered monitor to its collaborator.

use crate::broker::DynBroker;
use crate::notifier::DynNotifier;
use crate::template::format_alert_message;
use chrono::{FixedOffset, Utc};
use tickwatch_core::{Action, Monitor, Quote};
use tickwatch_telemetry::Metrics;
use tracing::{info, warn};

/// What happened to one dispatched action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Notified,
    NotifyFailed,
    /// Handed to the broker; the result is not observed.
    OrderSubmitted,
}

pub struct ActionDispatcher {
    notifier: DynNotifier,
    broker: DynBroker,
    display_offset: FixedOffset,
}

impl ActionDispatcher {
    pub fn new(notifier: DynNotifier, broker: DynBroker, display_offset: FixedOffset) -> Self {
        Self {
            notifier,
            broker,
            display_offset,
        }
    }

    /// Fire the monitor's action for the crossing `quote`.
    ///
    /// Never fails: notifier errors are logged and counted, and nothing is
    /// retried.
    pub async fn dispatch(&self, monitor: &Monitor, quote: &Quote) -> DispatchOutcome {
        let kind = monitor.kind();
        let outcome = match &monitor.action {
            Action::Alert(alert) => {
                let text = format_alert_message(alert, quote, self.display_offset);
                match self.notifier.send(text).await {
                    Ok(()) => {
                        info!(id = %monitor.id, symbol = %monitor.symbol, "Alert sent");
                        Metrics::dispatch_succeeded(kind.as_str());
                        DispatchOutcome::Notified
                    }
                    Err(e) => {
                        warn!(id = %monitor.id, symbol = %monitor.symbol, error = %e, "Alert delivery failed");
                        Metrics::dispatch_failed(kind.as_str());
                        DispatchOutcome::NotifyFailed
                    }
                }
            }
            Action::Order { payload } => {
                self.broker.submit(payload.clone());
                info!(id = %monitor.id, symbol = %monitor.symbol, "Order submitted");
                Metrics::dispatch_succeeded(kind.as_str());
                DispatchOutcome::OrderSubmitted
            }
        };

        let latency_ms = (Utc::now() - quote.timestamp).num_milliseconds().max(0) as f64;
        Metrics::dispatch_latency(kind.as_str(), latency_ms);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBroker;
    use crate::notifier::MockNotifier;
    use crate::template::{parse_display_offset, DEFAULT_DISPLAY_OFFSET};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tickwatch_core::{
        AlertAction, Direction, MonitorSpec, OrderPayload, Price, Symbol, Volume,
    };

    fn monitor(action: Action) -> Monitor {
        Monitor::from_spec(MonitorSpec {
            symbol: Symbol::new("2330").unwrap(),
            direction: Direction::Above,
            threshold: Price::new(dec!(500)),
            action,
        })
    }

    fn quote() -> Quote {
        Quote::new(
            Symbol::new("2330").unwrap(),
            Some(Price::new(dec!(501))),
            Volume::new(dec!(10)),
            Utc::now(),
        )
    }

    fn dispatcher() -> (ActionDispatcher, Arc<MockNotifier>, Arc<MockBroker>) {
        let notifier = Arc::new(MockNotifier::new());
        let broker = Arc::new(MockBroker::new());
        let d = ActionDispatcher::new(
            notifier.clone(),
            broker.clone(),
            parse_display_offset(DEFAULT_DISPLAY_OFFSET).unwrap(),
        );
        (d, notifier, broker)
    }

    #[tokio::test]
    async fn test_alert_goes_to_notifier() {
        let (d, notifier, broker) = dispatcher();
        let m = monitor(Action::Alert(AlertAction {
            title: "TSMC".to_string(),
            body: "above 500".to_string(),
        }));

        assert_eq!(d.dispatch(&m, &quote()).await, DispatchOutcome::Notified);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("\n<<TSMC>>\nabove 500\n成交價: 501\n"));
        assert_eq!(broker.submitted_count(), 0);
    }

    #[tokio::test]
    async fn test_notifier_failure_is_swallowed() {
        let (d, notifier, _broker) = dispatcher();
        notifier.set_failing(true);
        let m = monitor(Action::Alert(AlertAction {
            title: "TSMC".to_string(),
            body: String::new(),
        }));

        assert_eq!(d.dispatch(&m, &quote()).await, DispatchOutcome::NotifyFailed);
        assert_eq!(notifier.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_order_goes_to_broker_verbatim() {
        let (d, notifier, broker) = dispatcher();
        let payload = OrderPayload(serde_json::json!({"side": "sell", "qty": 2000, "price": 501}));
        let m = monitor(Action::Order {
            payload: payload.clone(),
        });

        assert_eq!(d.dispatch(&m, &quote()).await, DispatchOutcome::OrderSubmitted);
        assert_eq!(broker.submitted(), vec![payload]);
        assert_eq!(notifier.sent_count(), 0);
    }
}
