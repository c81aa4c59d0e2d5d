//! Shared wiring for engine integration tests.

#![allow(dead_code)]

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tickwatch_core::{Action, AlertAction, Direction, MonitorSpec, OrderPayload, Price, Quote, Symbol, Volume};
use tickwatch_dispatch::{
    parse_display_offset, ActionDispatcher, DynNotifier, MockBroker, MockNotifier,
    DEFAULT_DISPLAY_OFFSET,
};
use tickwatch_engine::{EngineConfig, MatchingEngine, MonitorService, PriceIndex};
use tickwatch_feed::{FeedFatal, FeedManager, FeedManagerConfig, MockQuoteFeed};
use tickwatch_store::{DynMonitorStore, MemoryMonitorStore};
use tokio::sync::mpsc;

pub struct TestBed {
    pub service: Arc<MonitorService>,
    pub engine: Arc<MatchingEngine>,
    pub index: Arc<PriceIndex>,
    pub feeds: Arc<FeedManager>,
    pub feed: Arc<MockQuoteFeed>,
    pub store: Arc<MemoryMonitorStore>,
    pub notifier: Arc<MockNotifier>,
    pub broker: Arc<MockBroker>,
    pub fatal_rx: mpsc::Receiver<FeedFatal>,
}

pub struct TestBedBuilder {
    engine: EngineConfig,
    max_subscriptions: usize,
    store: Arc<MemoryMonitorStore>,
    store_layer: Option<DynMonitorStore>,
    notifier: Option<DynNotifier>,
}

impl Default for TestBedBuilder {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            max_subscriptions: 5,
            store: Arc::new(MemoryMonitorStore::new()),
            store_layer: None,
            notifier: None,
        }
    }
}

impl TestBedBuilder {
    pub fn retain_triggered(mut self) -> Self {
        self.engine.retain_triggered = true;
        self
    }

    pub fn max_subscriptions(mut self, max: usize) -> Self {
        self.max_subscriptions = max;
        self
    }

    pub fn store(mut self, store: Arc<MemoryMonitorStore>) -> Self {
        self.store = store;
        self
    }

    /// Route engine and service through `layer`, which should wrap the
    /// memory store set with [`TestBedBuilder::store`].
    pub fn store_layer(mut self, layer: DynMonitorStore) -> Self {
        self.store_layer = Some(layer);
        self
    }

    /// Replace the recording notifier used for dispatch.
    pub fn notifier(mut self, notifier: DynNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> TestBed {
        let feed = Arc::new(MockQuoteFeed::new());
        let (feeds, fatal_rx) = FeedManager::new(
            feed.clone(),
            FeedManagerConfig {
                max_subscriptions: self.max_subscriptions,
                resubscribe_window_ms: 200,
                resubscribe_base_delay_ms: 10,
                resubscribe_max_delay_ms: 40,
            },
        );
        let feeds = Arc::new(feeds);
        let notifier = Arc::new(MockNotifier::new());
        let broker = Arc::new(MockBroker::new());
        let dispatch_notifier: DynNotifier = match self.notifier {
            Some(custom) => custom,
            None => notifier.clone(),
        };
        let dispatcher = ActionDispatcher::new(
            dispatch_notifier,
            broker.clone(),
            parse_display_offset(DEFAULT_DISPLAY_OFFSET).unwrap(),
        );
        let store: DynMonitorStore = match self.store_layer {
            Some(layer) => layer,
            None => self.store.clone(),
        };
        let index = Arc::new(PriceIndex::new());
        let engine = Arc::new(MatchingEngine::new(
            index.clone(),
            store.clone(),
            dispatcher,
            feeds.clone(),
            self.engine,
        ));
        let service = Arc::new(MonitorService::new(
            store,
            index.clone(),
            feeds.clone(),
            engine.clone(),
        ));
        TestBed {
            service,
            engine,
            index,
            feeds,
            feed,
            store: self.store,
            notifier,
            broker,
            fatal_rx,
        }
    }
}

pub fn sym(s: &str) -> Symbol {
    Symbol::new(s).unwrap()
}

pub fn price(v: rust_decimal::Decimal) -> Price {
    Price::new(v)
}

pub fn alert(symbol: &str, direction: Direction, threshold: Price, title: &str, body: &str) -> MonitorSpec {
    MonitorSpec {
        symbol: sym(symbol),
        direction,
        threshold,
        action: Action::Alert(AlertAction {
            title: title.to_string(),
            body: body.to_string(),
        }),
    }
}

pub fn order(symbol: &str, direction: Direction, threshold: Price, payload: serde_json::Value) -> MonitorSpec {
    MonitorSpec {
        symbol: sym(symbol),
        direction,
        threshold,
        action: Action::Order {
            payload: OrderPayload(payload),
        },
    }
}

pub fn tick(symbol: &str, p: Price) -> Quote {
    Quote::new(sym(symbol), Some(p), Volume::new(rust_decimal::Decimal::ONE), Utc::now())
}

pub async fn eventually<F: Fn() -> bool>(cond: F) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
