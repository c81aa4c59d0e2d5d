//! Monitor store trait.

use crate::error::StoreResult;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tickwatch_core::{BoxFuture, Monitor, MonitorId, MonitorSpec};

/// Durable CRUD for monitor records.
///
/// Every operation either fully succeeds or returns an error; callers never
/// have to reason about partial writes.
pub trait MonitorStore: Send + Sync {
    /// Persist a new untriggered monitor with a fresh id.
    fn create(&self, spec: MonitorSpec) -> BoxFuture<'_, StoreResult<Monitor>>;

    fn get(&self, id: MonitorId) -> BoxFuture<'_, StoreResult<Option<Monitor>>>;

    /// Every record, oldest first.
    fn list(&self) -> BoxFuture<'_, StoreResult<Vec<Monitor>>>;

    /// Untriggered records, oldest first. Used to rebuild state on startup.
    fn list_active(&self) -> BoxFuture<'_, StoreResult<Vec<Monitor>>>;

    /// Idempotent. Returns true only for the call that performed the
    /// transition; absent or already triggered records yield false.
    fn mark_triggered(&self, id: MonitorId, at: DateTime<Utc>)
        -> BoxFuture<'_, StoreResult<bool>>;

    /// Hard delete. Returns whether a record existed.
    fn remove(&self, id: MonitorId) -> BoxFuture<'_, StoreResult<bool>>;
}

/// Arc wrapper for MonitorStore trait objects.
pub type DynMonitorStore = Arc<dyn MonitorStore>;

/// Oldest first, ties broken by id so listings are stable.
pub(crate) fn sort_by_age(monitors: &mut [Monitor]) {
    monitors.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
}
