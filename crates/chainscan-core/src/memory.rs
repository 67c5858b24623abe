//! In-memory key-value store.
//!
//! Writes are buffered in a per-transaction overlay and applied to the shared
//! map on commit. The apply path is the only writer, so last-commit-wins is
//! sufficient isolation.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::IndexerError;
use crate::kv::{prefix_end, KvPair, KvStore, KvTx, Table};

type Map = BTreeMap<(Table, Vec<u8>), Vec<u8>>;

/// Shared in-memory store. Clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryKv {
    data: Arc<Mutex<Map>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry, for whole-state comparisons.
    pub fn dump(&self) -> Map {
        self.data.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn begin(&self) -> Result<Box<dyn KvTx>, IndexerError> {
        Ok(Box::new(MemoryTx {
            data: Arc::clone(&self.data),
            overlay: BTreeMap::new(),
        }))
    }
}

struct MemoryTx {
    data: Arc<Mutex<Map>>,
    /// `None` marks a pending delete.
    overlay: BTreeMap<(Table, Vec<u8>), Option<Vec<u8>>>,
}

#[async_trait]
impl KvTx for MemoryTx {
    async fn get(&mut self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, IndexerError> {
        let k = (table, key.to_vec());
        if let Some(pending) = self.overlay.get(&k) {
            return Ok(pending.clone());
        }
        Ok(self.data.lock().get(&k).cloned())
    }

    async fn put(&mut self, table: Table, key: &[u8], value: &[u8]) -> Result<(), IndexerError> {
        self.overlay.insert((table, key.to_vec()), Some(value.to_vec()));
        Ok(())
    }

    async fn delete(&mut self, table: Table, key: &[u8]) -> Result<(), IndexerError> {
        self.overlay.insert((table, key.to_vec()), None);
        Ok(())
    }

    async fn scan_prefix(
        &mut self,
        table: Table,
        prefix: &[u8],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<KvPair>, IndexerError> {
        let start = Bound::Included((table, prefix.to_vec()));
        let end = match prefix_end(prefix) {
            Some(e) => Bound::Excluded((table, e)),
            None => Bound::Unbounded,
        };

        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .data
            .lock()
            .range((start.clone(), end.clone()))
            .filter(|((t, _), _)| *t == table)
            .map(|((_, k), v)| (k.clone(), v.clone()))
            .collect();
        for ((t, k), v) in self.overlay.range((start, end)) {
            if *t != table {
                continue;
            }
            match v {
                Some(v) => merged.insert(k.clone(), v.clone()),
                None => merged.remove(k),
            };
        }

        Ok(merged.into_iter().skip(offset).take(limit).collect())
    }

    async fn commit(self: Box<Self>) -> Result<(), IndexerError> {
        let MemoryTx { data, overlay } = *self;
        let mut data = data.lock();
        for (k, v) in overlay {
            match v {
                Some(v) => data.insert(k, v),
                None => data.remove(&k),
            };
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), IndexerError> {
        Ok(())
    }
}
