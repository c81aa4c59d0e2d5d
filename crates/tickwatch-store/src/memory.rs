//! In-process monitor store.

use crate::error::{StoreError, StoreResult};
use crate::store::{sort_by_age, MonitorStore};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tickwatch_core::{BoxFuture, Monitor, MonitorId, MonitorSpec};

#[derive(Debug)]
pub struct MemoryMonitorStore {
    records: RwLock<HashMap<MonitorId, Monitor>>,
    available: AtomicBool,
}

impl Default for MemoryMonitorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMonitorStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate the backing store going away (or coming back).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Insert a record as-is, e.g. to seed restore tests.
    pub fn insert(&self, monitor: Monitor) {
        self.records.write().insert(monitor.id, monitor);
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn check(&self) -> StoreResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store switched off".to_string()))
        }
    }

    fn collect(&self, active_only: bool) -> Vec<Monitor> {
        let mut out: Vec<Monitor> = self
            .records
            .read()
            .values()
            .filter(|m| !active_only || m.is_active())
            .cloned()
            .collect();
        sort_by_age(&mut out);
        out
    }
}

impl MonitorStore for MemoryMonitorStore {
    fn create(&self, spec: MonitorSpec) -> BoxFuture<'_, StoreResult<Monitor>> {
        Box::pin(async move {
            self.check()?;
            let monitor = Monitor::from_spec(spec);
            self.records.write().insert(monitor.id, monitor.clone());
            Ok(monitor)
        })
    }

    fn get(&self, id: MonitorId) -> BoxFuture<'_, StoreResult<Option<Monitor>>> {
        Box::pin(async move {
            self.check()?;
            Ok(self.records.read().get(&id).cloned())
        })
    }

    fn list(&self) -> BoxFuture<'_, StoreResult<Vec<Monitor>>> {
        Box::pin(async move {
            self.check()?;
            Ok(self.collect(false))
        })
    }

    fn list_active(&self) -> BoxFuture<'_, StoreResult<Vec<Monitor>>> {
        Box::pin(async move {
            self.check()?;
            Ok(self.collect(true))
        })
    }

    fn mark_triggered(
        &self,
        id: MonitorId,
        at: DateTime<Utc>,
    ) -> BoxFuture<'_, StoreResult<bool>> {
        Box::pin(async move {
            self.check()?;
            Ok(self
                .records
                .write()
                .get_mut(&id)
                .is_some_and(|m| m.mark_triggered(at)))
        })
    }

    fn remove(&self, id: MonitorId) -> BoxFuture<'_, StoreResult<bool>> {
        Box::pin(async move {
            self.check()?;
            Ok(self.records.write().remove(&id).is_some())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tickwatch_core::{Action, AlertAction, Direction, Price, Symbol};
    use tokio_test::assert_ok;

    fn spec(threshold: Price) -> MonitorSpec {
        MonitorSpec {
            symbol: Symbol::new("2330").unwrap(),
            direction: Direction::Above,
            threshold,
            action: Action::Alert(AlertAction {
                title: "t".to_string(),
                body: "b".to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_create_get_remove() {
        let store = MemoryMonitorStore::new();
        let m = store.create(spec(Price::new(dec!(500)))).await.unwrap();
        assert!(!m.triggered);
        assert_eq!(store.get(m.id).await.unwrap(), Some(m.clone()));
        assert!(store.remove(m.id).await.unwrap());
        assert!(!store.remove(m.id).await.unwrap());
        assert_eq!(store.get(m.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mark_triggered_idempotent_and_filters_active() {
        let store = MemoryMonitorStore::new();
        let a = store.create(spec(Price::new(dec!(500)))).await.unwrap();
        let b = store.create(spec(Price::new(dec!(600)))).await.unwrap();

        assert!(store.mark_triggered(a.id, Utc::now()).await.unwrap());
        assert!(!store.mark_triggered(a.id, Utc::now()).await.unwrap());
        assert!(!store.mark_triggered(MonitorId::new(), Utc::now()).await.unwrap());

        let active = store.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, b.id);
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_operation() {
        let store = MemoryMonitorStore::new();
        let m = store.create(spec(Price::new(dec!(500)))).await.unwrap();
        store.set_available(false);

        assert!(matches!(
            store.create(spec(Price::new(dec!(1)))).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.get(m.id).await.is_err());
        assert!(store.list().await.is_err());
        assert!(store.list_active().await.is_err());
        assert!(store.mark_triggered(m.id, Utc::now()).await.is_err());
        assert!(store.remove(m.id).await.is_err());
        assert_eq!(store.len(), 1);

        store.set_available(true);
        assert_ok!(store.remove(m.id).await);
        assert!(store.is_empty());
    }
}
