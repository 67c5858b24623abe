//! Fork delta ledger.
//!
//! Every fork-window block gets one [`LedgerEntry`] describing exactly what
//! its apply wrote, so the block can later be reversed out of the Fork store:
//!
//! - `writes`: every physical key written, with the value it replaced. A key
//!   also written by a newer live entry belongs to that entry.
//! - `counters`: the ordinal range each counter allocated
//! - `baselines`: each touched counter's state before the block
//! - `home`: the block's contribution to the home summary
//!
//! Counters carry two numbers. `index` counts ordinals already retired from
//! the low end, `total` counts live ordinals, so the next ordinal is always
//! `index + total + 1` and retiring the oldest block never reuses an ordinal
//! still referenced by a newer one.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::counter::Counter;
use crate::home::HomeContribution;
use crate::keys::CounterKey;
use crate::kv::Table;

/// Persisted state of one counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterState {
    /// Ordinals retired from the low end.
    pub index: Counter,
    /// Live ordinals.
    pub total: Counter,
}

impl CounterState {
    pub fn is_zero(&self) -> bool {
        self.index.is_zero() && self.total.is_zero()
    }

    /// Ordinal the next record will get.
    pub fn next_ordinal(&self) -> Counter {
        let mut next = &self.index + &self.total;
        next.incr();
        next
    }

    /// Highest live ordinal, if any.
    pub fn last_ordinal(&self) -> Option<Counter> {
        if self.total.is_zero() {
            None
        } else {
            Some(&self.index + &self.total)
        }
    }
}

/// Ordinals a block allocated on one counter: `start ..= start + count - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub start: Counter,
    pub count: Counter,
}

impl CounterDelta {
    pub fn end(&self) -> Counter {
        (&self.start + &self.count).saturating_sub(&Counter::one())
    }
}

/// One physical write, recorded on first touch within the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerWrite {
    pub table: Table,
    pub key: Vec<u8>,
    /// Value before the block; `None` if the block created the key.
    pub prior: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub height: u64,
    pub writes: Vec<LedgerWrite>,
    pub counters: Vec<(CounterKey, CounterDelta)>,
    pub baselines: Vec<(CounterKey, CounterState)>,
    pub home: Option<HomeContribution>,
}

impl LedgerEntry {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            ..Default::default()
        }
    }

    /// Number of keys the block created (deleted again on reversal).
    pub fn created(&self) -> usize {
        self.writes.iter().filter(|w| w.prior.is_none()).count()
    }

    pub fn baseline(&self, key: &CounterKey) -> Option<&CounterState> {
        self.baselines.iter().find(|(k, _)| k == key).map(|(_, s)| s)
    }
}

/// Ledger entries of the live fork window, keyed by height.
#[derive(Debug, Default)]
pub struct ForkLedger {
    entries: BTreeMap<u64, LedgerEntry>,
}

impl ForkLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: LedgerEntry) {
        self.entries.insert(entry.height, entry);
    }

    pub fn get(&self, height: u64) -> Option<&LedgerEntry> {
        self.entries.get(&height)
    }

    pub fn remove(&mut self, height: u64) -> Option<LedgerEntry> {
        self.entries.remove(&height)
    }

    /// Entries above `height`, ascending.
    pub fn after(&self, height: u64) -> impl Iterator<Item = &LedgerEntry> {
        self.entries.range(height.saturating_add(1)..).map(|(_, e)| e)
    }

    pub fn heights(&self) -> Vec<u64> {
        self.entries.keys().copied().collect()
    }

    pub fn lowest(&self) -> Option<u64> {
        self.entries.keys().next().copied()
    }

    pub fn highest(&self) -> Option<u64> {
        self.entries.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Counter states known to match the store, read before falling back to a
/// store lookup.
///
/// Only committed states are inserted. When the cache grows past its
/// capacity it is cleared and refills from the store.
#[derive(Debug)]
pub struct BaselineCache {
    states: HashMap<CounterKey, CounterState>,
    capacity: usize,
}

impl BaselineCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            states: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, key: &CounterKey) -> Option<&CounterState> {
        self.states.get(key)
    }

    /// Record committed states.
    pub fn absorb(&mut self, states: impl IntoIterator<Item = (CounterKey, CounterState)>) {
        for (k, v) in states {
            if self.states.len() >= self.capacity && !self.states.contains_key(&k) {
                tracing::debug!(capacity = self.capacity, "baseline cache full, clearing");
                self.states.clear();
            }
            self.states.insert(k, v);
        }
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;

    fn state(index: u64, total: u64) -> CounterState {
        CounterState {
            index: index.into(),
            total: total.into(),
        }
    }

    #[test]
    fn next_ordinal_skips_retired() {
        assert_eq!(state(0, 0).next_ordinal(), Counter::from(1));
        assert_eq!(state(4, 2).next_ordinal(), Counter::from(7));
        assert_eq!(state(4, 2).last_ordinal(), Some(Counter::from(6)));
        assert_eq!(state(4, 0).last_ordinal(), None);
    }

    #[test]
    fn delta_end_is_inclusive() {
        let d = CounterDelta {
            start: 5.into(),
            count: 3.into(),
        };
        assert_eq!(d.end(), Counter::from(7));
    }

    #[test]
    fn created_counts_keys_without_prior() {
        let mut entry = LedgerEntry::new(7);
        entry.writes.push(LedgerWrite {
            table: Table::Accounts,
            key: vec![1],
            prior: None,
        });
        entry.writes.push(LedgerWrite {
            table: Table::Home,
            key: vec![2],
            prior: Some(b"{}".to_vec()),
        });
        assert_eq!(entry.created(), 1);
    }

    #[test]
    fn ledger_orders_by_height() {
        let mut ledger = ForkLedger::new();
        for h in [105, 103, 104] {
            ledger.insert(LedgerEntry::new(h));
        }
        assert_eq!(ledger.heights(), vec![103, 104, 105]);
        assert_eq!(ledger.lowest(), Some(103));
        assert_eq!(ledger.highest(), Some(105));
        assert_eq!(ledger.after(103).map(|e| e.height).collect::<Vec<_>>(), vec![104, 105]);
        assert!(ledger.remove(103).is_some());
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn cache_clears_when_full() {
        let mut cache = BaselineCache::new(2);
        let k = |b| CounterKey::AccountTx(Address::repeat_byte(b));
        cache.absorb([(k(1), state(0, 1)), (k(2), state(0, 2))]);
        assert_eq!(cache.len(), 2);
        cache.absorb([(k(2), state(0, 3))]);
        assert_eq!(cache.len(), 2);
        cache.absorb([(k(3), state(0, 1))]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&k(3)), Some(&state(0, 1)));
    }
}
