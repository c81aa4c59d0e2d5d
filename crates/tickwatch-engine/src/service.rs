//! Monitor lifecycle API: create, list, get, remove and startup restore.

use crate::engine::MatchingEngine;
use crate::error::{EngineError, EngineResult};
use crate::index::PriceIndex;
use std::sync::Arc;
use tickwatch_core::{ActionKind, Monitor, MonitorId, MonitorSpec};
use tickwatch_feed::{FeedError, FeedManager};
use tickwatch_store::DynMonitorStore;
use tracing::{error, info, warn};

/// Outcome of [`MonitorService::restore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    /// Monitors removed because their symbol could not be admitted.
    pub dropped: Vec<MonitorId>,
}

pub struct MonitorService {
    store: DynMonitorStore,
    index: Arc<PriceIndex>,
    feeds: Arc<FeedManager>,
    engine: Arc<MatchingEngine>,
}

impl MonitorService {
    pub fn new(
        store: DynMonitorStore,
        index: Arc<PriceIndex>,
        feeds: Arc<FeedManager>,
        engine: Arc<MatchingEngine>,
    ) -> Self {
        Self {
            store,
            index,
            feeds,
            engine,
        }
    }

    pub fn feeds(&self) -> &Arc<FeedManager> {
        &self.feeds
    }

    /// Monitors currently armed in the index.
    pub fn active_monitors(&self) -> usize {
        self.index.len()
    }

    /// Persist, subscribe and index a new monitor as one unit.
    ///
    /// If the subscription cannot be obtained the record is removed again
    /// before the error is returned.
    pub async fn create_monitor(&self, spec: MonitorSpec) -> EngineResult<Monitor> {
        spec.validate()?;
        let monitor = self.store.create(spec).await?;

        if let Err(e) = self.feeds.subscribe(&monitor.symbol, self.engine.clone()).await {
            warn!(id = %monitor.id, symbol = %monitor.symbol, error = %e, "Subscribe failed, rolling back monitor");
            if let Err(rollback) = self.store.remove(monitor.id).await {
                error!(id = %monitor.id, error = %rollback, "Rollback of monitor record failed");
            }
            return Err(e.into());
        }

        self.index.upsert(Arc::new(monitor.clone()));
        info!(
            id = %monitor.id,
            symbol = %monitor.symbol,
            direction = %monitor.direction,
            threshold = %monitor.threshold,
            kind = %monitor.kind(),
            "Monitor created"
        );
        Ok(monitor)
    }

    pub async fn list_by_action_kind(&self, kind: ActionKind) -> EngineResult<Vec<Monitor>> {
        let monitors = self.store.list().await?;
        Ok(monitors.into_iter().filter(|m| m.kind() == kind).collect())
    }

    pub async fn get_monitor(&self, id: MonitorId) -> EngineResult<Monitor> {
        self.store.get(id).await?.ok_or(EngineError::NotFound(id))
    }

    /// Cancel a monitor. With `kind` set, a monitor of another kind is
    /// reported as not found.
    ///
    /// The record is deleted before the index entry is claimed, so a store
    /// failure leaves the monitor fully armed. A tick that claims it in
    /// between finds no record to mark and skips dispatch. When a tick has
    /// already claimed the monitor this waits for that dispatch to finish,
    /// so no action fires after it returns.
    pub async fn remove_monitor(&self, id: MonitorId, kind: Option<ActionKind>) -> EngineResult<()> {
        let monitor = self.get_monitor(id).await?;
        if kind.is_some_and(|k| k != monitor.kind()) {
            return Err(EngineError::NotFound(id));
        }

        self.store.remove(id).await?;

        if self.index.remove_many(&[id]).is_empty() {
            self.engine.wait_settled(id).await;
        } else {
            self.feeds.unsubscribe(&monitor.symbol).await;
        }

        info!(%id, symbol = %monitor.symbol, "Monitor removed");
        Ok(())
    }

    /// Rebuild the index and subscriptions from the store's active records.
    ///
    /// Records whose symbol exceeds the subscription limit are deleted.
    /// Any other subscribe failure aborts the restore.
    pub async fn restore(&self) -> EngineResult<RestoreReport> {
        let active = self.store.list_active().await?;
        let mut report = RestoreReport::default();

        for monitor in active {
            match self.feeds.subscribe(&monitor.symbol, self.engine.clone()).await {
                Ok(()) => {
                    self.index.upsert(Arc::new(monitor));
                    report.restored += 1;
                }
                Err(FeedError::SubscriptionLimitExceeded { limit }) => {
                    warn!(
                        id = %monitor.id,
                        symbol = %monitor.symbol,
                        limit,
                        "Subscription limit reached on restore, removing monitor"
                    );
                    self.store.remove(monitor.id).await?;
                    report.dropped.push(monitor.id);
                }
                Err(e) => return Err(e.into()),
            }
        }

        info!(restored = report.restored, dropped = report.dropped.len(), "Monitors restored");
        Ok(report)
    }

    /// Restore, then open the delivery gate.
    pub async fn start(&self) -> EngineResult<RestoreReport> {
        let report = self.restore().await?;
        self.feeds.start_delivery();
        Ok(report)
    }

    pub async fn shutdown(&self) {
        self.feeds.shutdown().await;
    }
}
