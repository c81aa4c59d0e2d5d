//! Per-tick crossing detection.
//!
//! Each match is claimed out of the [`PriceIndex`] and marked triggered in
//! the store before its action is dispatched, so a monitor fires at most
//! once. A failure between claim and dispatch loses the action; nothing is
//! replayed.

use crate::config::EngineConfig;
use crate::index::PriceIndex;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tickwatch_core::{BoxFuture, Direction, Monitor, MonitorId, Quote};
use tickwatch_dispatch::ActionDispatcher;
use tickwatch_feed::{FeedManager, TickSink};
use tickwatch_store::DynMonitorStore;
use tickwatch_telemetry::Metrics;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

type InFlightMap = Mutex<HashMap<MonitorId, watch::Receiver<()>>>;

pub struct MatchingEngine {
    index: Arc<PriceIndex>,
    store: DynMonitorStore,
    dispatcher: ActionDispatcher,
    feeds: Arc<FeedManager>,
    config: EngineConfig,
    /// Monitors claimed by a tick and not yet settled. Each receiver closes
    /// when its dispatch finishes.
    in_flight: InFlightMap,
}

/// Marker for one claim in progress; removed (and its channel closed) on drop.
struct InFlight<'a> {
    map: &'a InFlightMap,
    id: MonitorId,
    _done: watch::Sender<()>,
}

impl<'a> InFlight<'a> {
    fn register(map: &'a InFlightMap, id: MonitorId) -> Self {
        let (done, rx) = watch::channel(());
        map.lock().insert(id, rx);
        Self {
            map,
            id,
            _done: done,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.map.lock().remove(&self.id);
    }
}

impl MatchingEngine {
    pub fn new(
        index: Arc<PriceIndex>,
        store: DynMonitorStore,
        dispatcher: ActionDispatcher,
        feeds: Arc<FeedManager>,
        config: EngineConfig,
    ) -> Self {
        Self {
            index,
            store,
            dispatcher,
            feeds,
            config,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn index(&self) -> &Arc<PriceIndex> {
        &self.index
    }

    /// Evaluate one tick. Returns the ids whose action was dispatched.
    pub async fn process_tick(&self, quote: Quote) -> Vec<MonitorId> {
        let Some(price) = quote.tradable_price() else {
            Metrics::tick_discarded("no_price");
            return Vec::new();
        };

        let mut matches = self.index.match_crossing(&quote.symbol, Direction::Above, price);
        matches.extend(self.index.match_crossing(&quote.symbol, Direction::Below, price));
        if matches.is_empty() {
            return Vec::new();
        }

        let mut fired = Vec::with_capacity(matches.len());
        for (id, monitor) in matches {
            if self.settle(id, &monitor, &quote).await {
                fired.push(id);
            }
        }
        fired
    }

    /// Claim, mark, dispatch and retire one matched monitor.
    async fn settle(&self, id: MonitorId, monitor: &Monitor, quote: &Quote) -> bool {
        let _marker = InFlight::register(&self.in_flight, id);
        if self.index.remove_many(&[id]).is_empty() {
            debug!(%id, "Monitor already claimed");
            return false;
        }

        Metrics::monitor_triggered(monitor.direction.as_condition());
        let triggered_at = Utc::now();
        let dispatched = match self.store.mark_triggered(id, triggered_at).await {
            Ok(true) => {
                info!(
                    %id,
                    symbol = %monitor.symbol,
                    direction = %monitor.direction,
                    threshold = %monitor.threshold,
                    price = ?quote.price,
                    "Monitor triggered"
                );
                let mut record = monitor.clone();
                record.mark_triggered(triggered_at);
                self.dispatcher.dispatch(&record, quote).await;
                true
            }
            Ok(false) => {
                warn!(%id, "Monitor already terminal in store, action skipped");
                false
            }
            Err(e) => {
                error!(%id, error = %e, "Failed to mark monitor triggered, action dropped");
                false
            }
        };

        self.feeds.unsubscribe(&monitor.symbol).await;

        if !self.config.retain_triggered {
            match self.store.remove(id).await {
                Ok(_) => debug!(%id, "Triggered monitor deleted"),
                Err(e) => warn!(%id, error = %e, "Failed to delete triggered monitor"),
            }
        }
        dispatched
    }

    /// Wait until any in-flight dispatch for `id` has finished.
    pub async fn wait_settled(&self, id: MonitorId) {
        let rx = self.in_flight.lock().get(&id).cloned();
        if let Some(mut rx) = rx {
            while rx.changed().await.is_ok() {}
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }
}

impl TickSink for MatchingEngine {
    fn on_tick(&self, quote: Quote) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.process_tick(quote).await;
        })
    }
}
