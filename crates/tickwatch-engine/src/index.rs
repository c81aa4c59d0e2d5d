//! Range-queryable index of active thresholds.
//!
//! One entry per (symbol, direction), each behind its own mutex and holding
//! the thresholds in a `BTreeMap` plus a payload cache, so a crossing query
//! is O(log n + k) and hydrates matches without touching the store.
//!
//! Lock order: when several entries are locked at once they are locked in
//! ascending [`IndexKey`] order. Locator updates happen while the owning
//! entry is locked.

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tickwatch_core::{Direction, Monitor, MonitorId, Price, Symbol};
use tickwatch_telemetry::Metrics;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexKey {
    pub symbol: Symbol,
    pub direction: Direction,
}

impl IndexKey {
    pub fn new(symbol: Symbol, direction: Direction) -> Self {
        Self { symbol, direction }
    }

    fn of(monitor: &Monitor) -> Self {
        Self::new(monitor.symbol.clone(), monitor.direction)
    }
}

#[derive(Default)]
struct IndexEntry {
    by_threshold: BTreeMap<Price, BTreeSet<MonitorId>>,
    payloads: HashMap<MonitorId, (Price, Arc<Monitor>)>,
}

impl IndexEntry {
    fn insert(&mut self, monitor: Arc<Monitor>) {
        let id = monitor.id;
        let threshold = monitor.threshold;
        self.by_threshold.entry(threshold).or_default().insert(id);
        self.payloads.insert(id, (threshold, monitor));
    }

    fn remove(&mut self, id: &MonitorId) -> bool {
        let Some((threshold, _)) = self.payloads.remove(id) else {
            return false;
        };
        if let Some(ids) = self.by_threshold.get_mut(&threshold) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_threshold.remove(&threshold);
            }
        }
        true
    }

    fn crossing(&self, direction: Direction, price: Price) -> Vec<(MonitorId, Arc<Monitor>)> {
        let hydrate = |ids: &BTreeSet<MonitorId>| {
            ids.iter()
                .filter_map(|id| self.payloads.get(id).map(|(_, m)| (*id, m.clone())))
                .collect::<Vec<_>>()
        };
        match direction {
            Direction::Above => self
                .by_threshold
                .range(..=price)
                .flat_map(|(_, ids)| hydrate(ids))
                .collect(),
            Direction::Below => self
                .by_threshold
                .range(price..)
                .flat_map(|(_, ids)| hydrate(ids))
                .collect(),
        }
    }
}

#[derive(Default)]
pub struct PriceIndex {
    entries: DashMap<IndexKey, Arc<Mutex<IndexEntry>>>,
    locator: DashMap<MonitorId, IndexKey>,
}

impl PriceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry handle for `key`, created on first use. The DashMap shard guard
    /// is released before the caller locks the entry.
    fn entry(&self, key: &IndexKey) -> Arc<Mutex<IndexEntry>> {
        if let Some(entry) = self.entries.get(key) {
            return entry.clone();
        }
        self.entries.entry(key.clone()).or_default().clone()
    }

    /// Index `monitor`, replacing any previous placement of its id.
    pub fn upsert(&self, monitor: Arc<Monitor>) {
        let id = monitor.id;
        let key = IndexKey::of(&monitor);
        let target = self.entry(&key);
        let previous = self.locator.get(&id).map(|k| k.clone());

        match previous {
            Some(old_key) if old_key != key => {
                let source = self.entry(&old_key);
                let (mut old, mut new) = if old_key < key {
                    let old = source.lock();
                    (old, target.lock())
                } else {
                    let new = target.lock();
                    (source.lock(), new)
                };
                old.remove(&id);
                new.insert(monitor);
                self.locator.insert(id, key);
            }
            _ => {
                let mut entry = target.lock();
                entry.remove(&id);
                entry.insert(monitor);
                self.locator.insert(id, key);
            }
        }
        Metrics::active_monitors(self.len());
    }

    /// Remove every listed id, returning those that were actually present.
    ///
    /// All affected entries are locked for the whole batch, so a concurrent
    /// `match_crossing` sees either none or all of the removals on its key.
    /// Ids that are absent are ignored.
    pub fn remove_many(&self, ids: &[MonitorId]) -> Vec<MonitorId> {
        let mut groups: BTreeMap<IndexKey, Vec<MonitorId>> = BTreeMap::new();
        for id in ids {
            if let Some(key) = self.locator.get(id).map(|k| k.clone()) {
                groups.entry(key).or_default().push(*id);
            }
        }
        if groups.is_empty() {
            return Vec::new();
        }

        let handles: Vec<(IndexKey, Arc<Mutex<IndexEntry>>)> = groups
            .keys()
            .map(|key| (key.clone(), self.entry(key)))
            .collect();
        let mut guards: Vec<MutexGuard<'_, IndexEntry>> =
            handles.iter().map(|(_, entry)| entry.lock()).collect();

        let mut removed = Vec::new();
        for ((key, group), guard) in groups.iter().zip(guards.iter_mut()) {
            for id in group {
                if guard.remove(id) {
                    self.locator.remove_if(id, |_, k| k == key);
                    removed.push(*id);
                }
            }
        }
        drop(guards);

        if !removed.is_empty() {
            Metrics::active_monitors(self.len());
        }
        removed
    }

    /// Monitors on (symbol, direction) crossed by `price`, lowest threshold
    /// first. `Above` matches `threshold <= price`, `Below` matches
    /// `threshold >= price`.
    pub fn match_crossing(
        &self,
        symbol: &Symbol,
        direction: Direction,
        price: Price,
    ) -> Vec<(MonitorId, Arc<Monitor>)> {
        let key = IndexKey::new(symbol.clone(), direction);
        let Some(entry) = self.entries.get(&key).map(|e| e.clone()) else {
            return Vec::new();
        };
        let guard = entry.lock();
        guard.crossing(direction, price)
    }

    pub fn len(&self) -> usize {
        self.locator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locator.is_empty()
    }

    pub fn count_for_symbol(&self, symbol: &Symbol) -> usize {
        Direction::ALL
            .iter()
            .filter_map(|d| self.entries.get(&IndexKey::new(symbol.clone(), *d)).map(|e| e.clone()))
            .map(|entry| entry.lock().payloads.len())
            .sum()
    }

    pub fn contains(&self, id: &MonitorId) -> bool {
        self.locator.contains_key(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tickwatch_core::{Action, AlertAction, MonitorSpec};

    fn monitor(symbol: &str, direction: Direction, threshold: Price) -> Arc<Monitor> {
        Arc::new(Monitor::from_spec(MonitorSpec {
            symbol: Symbol::new(symbol).unwrap(),
            direction,
            threshold,
            action: Action::Alert(AlertAction {
                title: "t".to_string(),
                body: String::new(),
            }),
        }))
    }

    fn ids(matches: &[(MonitorId, Arc<Monitor>)]) -> Vec<MonitorId> {
        matches.iter().map(|(id, _)| *id).collect()
    }

    fn p(v: rust_decimal::Decimal) -> Price {
        Price::new(v)
    }

    #[test]
    fn test_above_matches_thresholds_at_or_below_price() {
        let index = PriceIndex::new();
        let low = monitor("2330", Direction::Above, p(dec!(490)));
        let exact = monitor("2330", Direction::Above, p(dec!(500)));
        let high = monitor("2330", Direction::Above, p(dec!(510)));
        for m in [&low, &exact, &high] {
            index.upsert(m.clone());
        }

        let sym = Symbol::new("2330").unwrap();
        assert!(index.match_crossing(&sym, Direction::Above, p(dec!(489.99))).is_empty());
        assert_eq!(
            ids(&index.match_crossing(&sym, Direction::Above, p(dec!(500.0)))),
            vec![low.id, exact.id]
        );
        assert!(index.match_crossing(&sym, Direction::Below, p(dec!(1))).is_empty());
    }

    #[test]
    fn test_below_matches_thresholds_at_or_above_price() {
        let index = PriceIndex::new();
        let a = monitor("2330", Direction::Below, p(dec!(400)));
        let b = monitor("2330", Direction::Below, p(dec!(380)));
        index.upsert(a.clone());
        index.upsert(b.clone());

        let sym = Symbol::new("2330").unwrap();
        assert!(index.match_crossing(&sym, Direction::Below, p(dec!(400.01))).is_empty());
        assert_eq!(ids(&index.match_crossing(&sym, Direction::Below, p(dec!(400)))), vec![a.id]);
        assert_eq!(
            ids(&index.match_crossing(&sym, Direction::Below, p(dec!(10)))),
            vec![b.id, a.id]
        );
    }

    #[test]
    fn test_same_threshold_many_monitors() {
        let index = PriceIndex::new();
        let a = monitor("0050", Direction::Above, p(dec!(100)));
        let b = monitor("0050", Direction::Above, p(dec!(100)));
        index.upsert(a.clone());
        index.upsert(b.clone());

        let sym = Symbol::new("0050").unwrap();
        assert_eq!(index.match_crossing(&sym, Direction::Above, p(dec!(100))).len(), 2);
        assert_eq!(index.remove_many(&[a.id]), vec![a.id]);
        assert_eq!(ids(&index.match_crossing(&sym, Direction::Above, p(dec!(100)))), vec![b.id]);
    }

    #[test]
    fn test_remove_many_is_idempotent() {
        let index = PriceIndex::new();
        let a = monitor("2330", Direction::Above, p(dec!(500)));
        let b = monitor("2317", Direction::Below, p(dec!(100)));
        index.upsert(a.clone());
        index.upsert(b.clone());
        let ghost = MonitorId::new();

        let mut first = index.remove_many(&[a.id, b.id, ghost]);
        first.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(first, expected);

        assert!(index.remove_many(&[a.id, b.id, ghost]).is_empty());
        assert!(index.is_empty());
        assert!(!index.contains(&a.id));
    }

    #[test]
    fn test_upsert_replaces_previous_placement() {
        let index = PriceIndex::new();
        let original = monitor("2330", Direction::Above, p(dec!(500)));
        index.upsert(original.clone());

        let mut moved = (*original).clone();
        moved.direction = Direction::Below;
        moved.threshold = p(dec!(450));
        index.upsert(Arc::new(moved));

        let sym = Symbol::new("2330").unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.match_crossing(&sym, Direction::Above, p(dec!(1000))).is_empty());
        assert_eq!(
            ids(&index.match_crossing(&sym, Direction::Below, p(dec!(440)))),
            vec![original.id]
        );

        let mut repriced = (*original).clone();
        repriced.direction = Direction::Below;
        repriced.threshold = p(dec!(300));
        index.upsert(Arc::new(repriced));
        assert!(index.match_crossing(&sym, Direction::Below, p(dec!(440))).is_empty());
        assert_eq!(index.count_for_symbol(&sym), 1);
    }

    #[test]
    fn test_count_for_symbol_spans_directions() {
        let index = PriceIndex::new();
        index.upsert(monitor("2330", Direction::Above, p(dec!(500))));
        index.upsert(monitor("2330", Direction::Below, p(dec!(400))));
        index.upsert(monitor("2317", Direction::Below, p(dec!(100))));

        assert_eq!(index.count_for_symbol(&Symbol::new("2330").unwrap()), 2);
        assert_eq!(index.count_for_symbol(&Symbol::new("9999").unwrap()), 0);
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_concurrent_claims_remove_each_id_once() {
        let index = Arc::new(PriceIndex::new());
        let monitors: Vec<_> = (0..50)
            .map(|i| monitor("2330", Direction::Above, p(rust_decimal::Decimal::from(100 + i))))
            .collect();
        for m in &monitors {
            index.upsert(m.clone());
        }
        let all: Vec<MonitorId> = monitors.iter().map(|m| m.id).collect();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let index = index.clone();
                let all = all.clone();
                std::thread::spawn(move || {
                    all.iter()
                        .flat_map(|id| index.remove_many(&[*id]))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut claimed: Vec<MonitorId> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        claimed.sort();
        let mut expected = all.clone();
        expected.sort();
        assert_eq!(claimed, expected);
    }
}
