//! Block apply engine.
//!
//! [`ApplyEngine`] is the only writer of both stores. One block is applied
//! inside one store transaction; fork-window blocks additionally produce a
//! [`LedgerEntry`] that is persisted next to the data it describes and used
//! to reverse the block once it leaves the window.
//!
//! ```text
//!   BlockBundle ──► BlockWriter (tx) ──► commit ──► BaselineCache
//!                        │                              ▲
//!                        └──► LedgerEntry (fork) ───────┘
//!                                  │
//!   retire(h) ──► reverse_entry (tx) ──► commit ──► ForkLedger::remove
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::account::merge_account;
use crate::counter::Counter;
use crate::error::IndexerError;
use crate::home::{day_key, HomeContribution};
use crate::keys::{self, CounterKey};
use crate::kv::{KvStore, KvTx, Table};
use crate::ledger::{BaselineCache, CounterDelta, CounterState, ForkLedger, LedgerEntry, LedgerWrite};
use crate::transfer::decode_transfers;
use crate::types::{Account, BlockBundle, Home, InternalTxRef, TokenTransfer, TransferValue};

/// Which store a block is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Full,
    Fork,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Fork => write!(f, "fork"),
        }
    }
}

/// Summary of one applied block, for logging.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyStats {
    pub height: u64,
    pub txs: usize,
    pub transfers: usize,
    pub internal_txs: usize,
    pub new_addresses: u64,
}

type CounterStates = BTreeMap<CounterKey, CounterState>;

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct ApplyEngine {
    full: Arc<dyn KvStore>,
    fork: Arc<dyn KvStore>,
    full_baselines: BaselineCache,
    fork_baselines: BaselineCache,
    ledger: ForkLedger,
}

impl ApplyEngine {
    /// Open the engine over both stores, reloading persisted ledger entries.
    pub async fn open(
        full: Arc<dyn KvStore>,
        fork: Arc<dyn KvStore>,
        cache_capacity: usize,
    ) -> Result<Self, IndexerError> {
        let mut ledger = ForkLedger::new();
        let mut tx = fork.begin().await?;
        let rows = tx.scan_prefix(Table::ForkLedger, &[], 0, usize::MAX).await;
        tx.rollback().await?;
        for (_, bytes) in rows? {
            let entry: LedgerEntry = serde_json::from_slice(&bytes)?;
            ledger.insert(entry);
        }
        if !ledger.is_empty() {
            info!(
                entries = ledger.len(),
                lowest = ledger.lowest(),
                highest = ledger.highest(),
                "Fork ledger recovered"
            );
        }

        Ok(Self {
            full,
            fork,
            full_baselines: BaselineCache::new(cache_capacity),
            fork_baselines: BaselineCache::new(cache_capacity),
            ledger,
        })
    }

    pub fn ledger(&self) -> &ForkLedger {
        &self.ledger
    }

    pub fn store(&self, target: Target) -> &Arc<dyn KvStore> {
        match target {
            Target::Full => &self.full,
            Target::Fork => &self.fork,
        }
    }

    /// Last height applied to `target`, if any.
    pub async fn synced(&self, target: Target) -> Result<Option<u64>, IndexerError> {
        let mut tx = self.store(target).begin().await?;
        let raw = tx.get(Table::Meta, keys::SYNCED_KEY).await;
        tx.rollback().await?;
        Ok(raw?.and_then(|b| Counter::from_bytes(&b).to_u64()))
    }

    /// Apply one block to `target` in a single transaction.
    pub async fn apply(
        &mut self,
        bundle: &BlockBundle,
        target: Target,
    ) -> Result<ApplyStats, IndexerError> {
        match target {
            Target::Full => self.apply_full(bundle).await,
            Target::Fork => self.apply_fork(bundle, None).await,
        }
    }

    /// Apply a finalized block to the Full store.
    pub async fn apply_full(&mut self, bundle: &BlockBundle) -> Result<ApplyStats, IndexerError> {
        let mut tx = self.full.begin().await?;
        let result = BlockWriter::new(&mut tx, &self.full_baselines, false)
            .write(bundle)
            .await;
        let outcome = match result {
            Ok(o) => o,
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };
        tx.commit().await?;
        self.full_baselines.absorb(outcome.counters);
        debug!(height = bundle.height(), target = %Target::Full, "block committed");
        Ok(outcome.stats)
    }

    /// Apply a fork-window block and, in the same transaction, reverse the
    /// ledger entry at `retire` (the height leaving the window).
    pub async fn apply_fork(
        &mut self,
        bundle: &BlockBundle,
        retire: Option<u64>,
    ) -> Result<ApplyStats, IndexerError> {
        let mut tx = self.fork.begin().await?;
        let result = self.write_fork(&mut tx, bundle, retire).await;
        let (outcome, settled) = match result {
            Ok(r) => r,
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };
        tx.commit().await?;

        if let Some(h) = settled.retired {
            self.ledger.remove(h);
            debug!(height = h, "ledger entry retired");
        }
        for entry in settled.updated {
            self.ledger.insert(entry);
        }
        self.fork_baselines.absorb(outcome.counters);
        Ok(outcome.stats)
    }

    /// Reverse the ledger entry at `height` on its own. Returns `false` if
    /// no entry exists.
    pub async fn reverse(&mut self, height: u64) -> Result<bool, IndexerError> {
        let Some(entry) = self.ledger.get(height) else {
            return Ok(false);
        };
        let mut later: Vec<LedgerEntry> = self.ledger.after(height).cloned().collect();
        let mut tx = self.fork.begin().await?;
        let result = async {
            let (states, dirty) =
                retire_entry(&mut tx, &self.fork_baselines, &CounterStates::new(), entry, &mut later)
                    .await?;
            let updated: Vec<LedgerEntry> =
                later.into_iter().filter(|e| dirty.contains(&e.height)).collect();
            for e in &updated {
                persist_entry(&mut tx, e).await?;
            }
            Ok::<_, IndexerError>((states, updated))
        }
        .await;
        let (states, updated) = match result {
            Ok(r) => r,
            Err(e) => {
                tx.rollback().await?;
                return Err(e);
            }
        };
        tx.commit().await?;

        self.ledger.remove(height);
        for entry in updated {
            self.ledger.insert(entry);
        }
        self.fork_baselines.absorb(states);
        Ok(true)
    }

    async fn write_fork(
        &self,
        tx: &mut Box<dyn KvTx>,
        bundle: &BlockBundle,
        retire: Option<u64>,
    ) -> Result<(BlockOutcome, Settled), IndexerError> {
        let mut outcome = BlockWriter::new(tx, &self.fork_baselines, true)
            .write(bundle)
            .await?;
        let height = bundle.height();

        let old = retire.and_then(|h| self.ledger.get(h));
        let mut later: Vec<LedgerEntry> = match old {
            Some(old) => self.ledger.after(old.height).cloned().collect(),
            None => Vec::new(),
        };
        later.extend(outcome.entry.take());

        let mut dirty = BTreeSet::new();
        if let Some(old) = old {
            let (states, d) =
                retire_entry(tx, &self.fork_baselines, &outcome.counters, old, &mut later).await?;
            outcome.counters.extend(states);
            dirty = d;
        }

        let updated: Vec<LedgerEntry> = later
            .into_iter()
            .filter(|e| e.height == height || dirty.contains(&e.height))
            .collect();
        for e in &updated {
            persist_entry(tx, e).await?;
        }
        Ok((
            outcome,
            Settled {
                retired: old.map(|e| e.height),
                updated,
            },
        ))
    }
}

/// Ledger changes to publish once a fork transaction commits.
struct Settled {
    retired: Option<u64>,
    updated: Vec<LedgerEntry>,
}

async fn persist_entry(tx: &mut Box<dyn KvTx>, entry: &LedgerEntry) -> Result<(), IndexerError> {
    tx.put(Table::ForkLedger, &keys::height(entry.height), &encode(entry)?)
        .await
}

// ─── Block writer ────────────────────────────────────────────────────────────

struct BlockOutcome {
    stats: ApplyStats,
    counters: CounterStates,
    entry: Option<LedgerEntry>,
}

/// Per-block write context over one open transaction.
struct BlockWriter<'a> {
    tx: &'a mut Box<dyn KvTx>,
    cache: &'a BaselineCache,
    counters: CounterStates,
    baselines: CounterStates,
    deltas: BTreeMap<CounterKey, CounterDelta>,
    /// Present when writing a fork block.
    writes: Option<BTreeMap<(Table, Vec<u8>), LedgerWrite>>,
}

impl<'a> BlockWriter<'a> {
    fn new(tx: &'a mut Box<dyn KvTx>, cache: &'a BaselineCache, record: bool) -> Self {
        Self {
            tx,
            cache,
            counters: BTreeMap::new(),
            baselines: BTreeMap::new(),
            deltas: BTreeMap::new(),
            writes: record.then(BTreeMap::new),
        }
    }

    async fn write(mut self, bundle: &BlockBundle) -> Result<BlockOutcome, IndexerError> {
        let block = &bundle.block;
        let h = block.number;
        let mut stats = ApplyStats {
            height: h,
            txs: bundle.transactions.len(),
            ..Default::default()
        };

        // 1. block record + height index
        self.put(Table::Blocks, block.hash.to_vec(), encode(block)?).await?;
        self.put(Table::BlockIndex, keys::height(h), block.hash.to_vec()).await?;

        // 2. touched accounts
        let mut contribution = HomeContribution {
            height: h,
            txs: bundle.transactions.len() as u64,
            day: day_key(block.timestamp),
            tx_hashes: bundle.transactions.iter().map(|t| t.hash).collect(),
            ..Default::default()
        };
        for (addr, incoming) in &bundle.accounts {
            let stored: Option<Account> = self.get_json(Table::Accounts, addr.as_slice()).await?;
            let base = stored.unwrap_or_else(|| {
                contribution.new_addresses += 1;
                Account::empty(*addr)
            });
            let (merged, flags) = merge_account(&base, incoming);
            contribution.erc20 += u64::from(flags.erc20);
            contribution.erc721 += u64::from(flags.erc721);
            contribution.erc1155 += u64::from(flags.erc1155);
            self.put(Table::Accounts, addr.to_vec(), encode(&merged)?).await?;
        }
        stats.new_addresses = contribution.new_addresses;

        // 3. transactions + receipts
        for (i, (tx, receipt)) in bundle.tx_receipts().enumerate() {
            let hash = tx.hash.to_vec();
            self.put(Table::Transactions, hash.clone(), encode(tx)?).await?;
            if let Some(r) = receipt {
                self.put(Table::Receipts, hash.clone(), encode(r)?).await?;
            }
            let pos = Counter::from(i as u64 + 1);
            self.put(Table::BlockTxs, keys::block_tx(h, &pos), hash.clone()).await?;

            let ord = self.allocate(CounterKey::GlobalTx).await?;
            self.put(Table::TxIndex, keys::tx_index(&ord), hash.clone()).await?;

            let created = receipt.and_then(|r| r.contract_address);
            for addr in endpoints(&[Some(tx.from), tx.to, created]) {
                let ord = self.allocate(CounterKey::AccountTx(addr)).await?;
                self.put(Table::AccountTxs, keys::account_tx(&addr, &ord), hash.clone())
                    .await?;
            }
        }

        // 4. token transfers
        for (tx, receipt) in bundle.tx_receipts() {
            let Some(receipt) = receipt else { continue };
            for transfer in decode_transfers(tx, &receipt.logs) {
                self.write_transfer(&transfer).await?;
                stats.transfers += 1;
            }
        }

        // 5. internal transactions
        for (parent, itxs) in &bundle.internal_txs {
            for itx in itxs {
                let ord = self.allocate(CounterKey::InternalTx(*parent)).await?;
                self.put(Table::InternalTxs, keys::internal_tx(parent, &ord), encode(itx)?)
                    .await?;
                let pointer = encode(&InternalTxRef {
                    parent_hash: *parent,
                    ordinal: ord,
                })?;
                for addr in endpoints(&[Some(itx.from), Some(itx.to)]) {
                    let a = self.allocate(CounterKey::AccountInternalTx(addr)).await?;
                    self.put(
                        Table::AccountInternalTxs,
                        keys::account_internal_tx(&addr, &a),
                        pointer.clone(),
                    )
                    .await?;
                }
                stats.internal_txs += 1;
            }
        }

        // 6. call traces
        for (hash, payload) in &bundle.traces {
            self.put(Table::Traces, hash.to_vec(), payload.to_vec()).await?;
        }

        // 7. home summary
        let mut home: Home = self.get_json(Table::Home, keys::HOME_KEY).await?.unwrap_or_default();
        home.record_block(block, &bundle.transactions, &contribution);
        self.put(Table::Home, keys::HOME_KEY.to_vec(), encode(&home)?).await?;

        // 8. synced marker
        self.put(Table::Meta, keys::SYNCED_KEY.to_vec(), Counter::from(h).to_bytes())
            .await?;

        self.flush_counters().await?;

        let entry = self.writes.take().map(|writes| LedgerEntry {
            height: h,
            writes: writes.into_values().collect(),
            counters: std::mem::take(&mut self.deltas).into_iter().collect(),
            baselines: std::mem::take(&mut self.baselines).into_iter().collect(),
            home: Some(contribution),
        });

        Ok(BlockOutcome {
            stats,
            counters: self.counters,
            entry,
        })
    }

    async fn write_transfer(&mut self, t: &TokenTransfer) -> Result<(), IndexerError> {
        let std = t.standard;
        let ord = self.allocate(CounterKey::Transfer(std)).await?;
        self.put(Table::Transfers, keys::transfer(std, &ord), encode(t)?).await?;

        let c = self.allocate(CounterKey::ContractTransfer(std, t.contract)).await?;
        self.put(
            Table::ContractTransfers,
            keys::contract_transfer(std, &t.contract, &c),
            ord.to_bytes(),
        )
        .await?;

        for addr in endpoints(&[Some(t.from), Some(t.to)]) {
            let a = self.allocate(CounterKey::AccountTransfer(std, addr)).await?;
            self.put(
                Table::AccountTransfers,
                keys::account_transfer(std, &addr, &a),
                ord.to_bytes(),
            )
            .await?;
            self.allocate(CounterKey::AccountTransferAll(addr)).await?;
        }

        let moved = match &t.value {
            TransferValue::Amount { amount } => *amount,
            TransferValue::Token { .. } => U256::from(1),
            TransferValue::Batch { quantity, .. } => *quantity,
        };
        self.move_balance(Table::Holders, t.from, t.to, moved, |a| {
            keys::holder(std, &t.contract, a)
        })
        .await?;

        match &t.value {
            TransferValue::Token { token_id } => {
                let key = keys::inventory(std, &t.contract, token_id, None);
                if t.to.is_zero() {
                    self.delete(Table::Inventory, key).await?;
                } else {
                    self.put(Table::Inventory, key, t.to.to_vec()).await?;
                }
            }
            TransferValue::Batch { token_id, quantity } => {
                self.move_balance(Table::Inventory, t.from, t.to, *quantity, |a| {
                    keys::inventory(std, &t.contract, token_id, Some(a))
                })
                .await?;
            }
            TransferValue::Amount { .. } => {}
        }
        Ok(())
    }

    /// Debit `from`, credit `to`; the zero address is mint/burn and skipped.
    async fn move_balance(
        &mut self,
        table: Table,
        from: Address,
        to: Address,
        amount: U256,
        key: impl Fn(&Address) -> Vec<u8>,
    ) -> Result<(), IndexerError> {
        if !from.is_zero() {
            self.adjust(table, key(&from), amount, false).await?;
        }
        if !to.is_zero() {
            self.adjust(table, key(&to), amount, true).await?;
        }
        Ok(())
    }

    async fn adjust(
        &mut self,
        table: Table,
        key: Vec<u8>,
        amount: U256,
        credit: bool,
    ) -> Result<(), IndexerError> {
        let current = self
            .tx
            .get(table, &key)
            .await?
            .map(|b| U256::from_be_slice(&b[..b.len().min(32)]))
            .unwrap_or(U256::ZERO);
        let next = if credit {
            current.saturating_add(amount)
        } else {
            current.saturating_sub(amount)
        };
        if next.is_zero() {
            self.delete(table, key).await
        } else {
            self.put(table, key, next.to_be_bytes::<32>().to_vec()).await
        }
    }

    // ── counters ──

    async fn load_counter(&mut self, key: &CounterKey) -> Result<CounterState, IndexerError> {
        if let Some(s) = self.counters.get(key) {
            return Ok(s.clone());
        }
        let state = match self.cache.get(key) {
            Some(s) => s.clone(),
            None => read_counter(&mut *self.tx, key).await?,
        };
        self.baselines.insert(key.clone(), state.clone());
        self.counters.insert(key.clone(), state.clone());
        Ok(state)
    }

    /// Take the next ordinal of `key`.
    async fn allocate(&mut self, key: CounterKey) -> Result<Counter, IndexerError> {
        let mut state = self.load_counter(&key).await?;
        let ordinal = state.next_ordinal();
        state.total.incr();
        self.counters.insert(key.clone(), state);
        self.deltas
            .entry(key)
            .and_modify(|d| d.count.incr())
            .or_insert_with(|| CounterDelta {
                start: ordinal.clone(),
                count: Counter::one(),
            });
        Ok(ordinal)
    }

    async fn flush_counters(&mut self) -> Result<(), IndexerError> {
        for (key, state) in &self.counters {
            write_counter(&mut *self.tx, key, state).await?;
        }
        Ok(())
    }

    // ── raw writes ──

    async fn get_json<T: DeserializeOwned>(
        &mut self,
        table: Table,
        key: &[u8],
    ) -> Result<Option<T>, IndexerError> {
        match self.tx.get(table, key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn put(&mut self, table: Table, key: Vec<u8>, value: Vec<u8>) -> Result<(), IndexerError> {
        self.record(table, &key).await?;
        self.tx.put(table, &key, &value).await
    }

    async fn delete(&mut self, table: Table, key: Vec<u8>) -> Result<(), IndexerError> {
        self.record(table, &key).await?;
        self.tx.delete(table, &key).await
    }

    /// Note a write in the ledger; the prior image is captured on first touch.
    async fn record(&mut self, table: Table, key: &[u8]) -> Result<(), IndexerError> {
        let slot = (table, key.to_vec());
        match self.writes.as_ref() {
            Some(writes) if !writes.contains_key(&slot) => {}
            _ => return Ok(()),
        }
        let prior = self.tx.get(table, key).await?;
        if let Some(writes) = self.writes.as_mut() {
            writes.insert(
                slot,
                LedgerWrite {
                    table,
                    key: key.to_vec(),
                    prior,
                },
            );
        }
        Ok(())
    }
}

// ─── Reversal ────────────────────────────────────────────────────────────────

/// A key a reversed block no longer owns, with the image to hand down.
type Handoff = Vec<(Table, Vec<u8>, Option<Vec<u8>>)>;

/// Writes of the `later` entries per key, as `(entry, write)` positions in
/// height order.
type Writers = HashMap<(Table, Vec<u8>), Vec<(usize, usize)>>;

fn writers(later: &[LedgerEntry]) -> Writers {
    let mut out = Writers::new();
    for (ei, e) in later.iter().enumerate() {
        for (wi, w) in e.writes.iter().enumerate() {
            out.entry((w.table, w.key.clone())).or_default().push((ei, wi));
        }
    }
    out
}

/// Reverse `entry` and re-point the prior images of `later` entries (in
/// height order) that also wrote its keys. Returns the new counter states and
/// the heights of the `later` entries that changed.
async fn retire_entry(
    tx: &mut Box<dyn KvTx>,
    cache: &BaselineCache,
    staged: &CounterStates,
    entry: &LedgerEntry,
    later: &mut [LedgerEntry],
) -> Result<(CounterStates, BTreeSet<u64>), IndexerError> {
    let owners = writers(later);
    let (states, handoff) = reverse_entry(tx, cache, staged, entry, &owners).await?;
    let dirty = hand_down(handoff, entry.home.as_ref(), later, &owners)?;
    Ok((states, dirty))
}

/// Undo `entry` inside `tx`. Keys in `owners` were also written by a newer
/// live block and keep their current value.
///
/// `staged` holds counter states written earlier in the same transaction;
/// they take precedence over the cache.
async fn reverse_entry(
    tx: &mut Box<dyn KvTx>,
    cache: &BaselineCache,
    staged: &CounterStates,
    entry: &LedgerEntry,
    owners: &Writers,
) -> Result<(CounterStates, Handoff), IndexerError> {
    let mut handoff = Handoff::new();
    for w in &entry.writes {
        if !owners.contains_key(&(w.table, w.key.clone())) {
            match &w.prior {
                Some(prior) => tx.put(w.table, &w.key, prior).await?,
                None => {
                    if tx.get(w.table, &w.key).await?.is_some() {
                        tx.delete(w.table, &w.key).await?;
                    }
                }
            }
            continue;
        }
        // the newer value stands; the home summary still loses our share
        if w.table == Table::Home {
            if let (Some(c), Some(bytes)) = (&entry.home, tx.get(w.table, &w.key).await?) {
                let mut home: Home = serde_json::from_slice(&bytes)?;
                home.retract(c);
                tx.put(Table::Home, &w.key, &encode(&home)?).await?;
            }
        }
        handoff.push((w.table, w.key.clone(), w.prior.clone()));
    }

    let mut states = CounterStates::new();
    for (key, delta) in &entry.counters {
        let current = match staged.get(key).or_else(|| cache.get(key)) {
            Some(s) => s.clone(),
            None => read_counter(tx, key).await?,
        };
        let next = reverse_counter(&current, delta, entry.baseline(key)).map_err(|reason| {
            IndexerError::Ledger {
                height: entry.height,
                reason: format!("counter {key}: {reason}"),
            }
        })?;
        write_counter(tx, key, &next).await?;
        states.insert(key.clone(), next);
    }

    tx.delete(Table::ForkLedger, &keys::height(entry.height)).await?;
    debug!(
        height = entry.height,
        keys = entry.writes.len(),
        created = entry.created(),
        handed_down = handoff.len(),
        counters = entry.counters.len(),
        "reversed fork block"
    );
    Ok((states, handoff))
}

/// Give each handed-down image to the first later entry that wrote the key.
/// Home images held by the other later writers still include the reversed
/// contribution and are retracted as well.
fn hand_down(
    handoff: Handoff,
    home: Option<&HomeContribution>,
    later: &mut [LedgerEntry],
    owners: &Writers,
) -> Result<BTreeSet<u64>, IndexerError> {
    let mut dirty = BTreeSet::new();
    for (table, key, prior) in handoff {
        let Some(slots) = owners.get(&(table, key)) else {
            continue;
        };
        let mut slots = slots.iter();
        if let Some(&(ei, wi)) = slots.next() {
            later[ei].writes[wi].prior = prior;
            dirty.insert(later[ei].height);
        }
        let Some(c) = home.filter(|_| table == Table::Home) else {
            continue;
        };
        for &(ei, wi) in slots {
            let w = &mut later[ei].writes[wi];
            if let Some(bytes) = &w.prior {
                let mut image: Home = serde_json::from_slice(bytes)?;
                image.retract(c);
                w.prior = Some(encode(&image)?);
                dirty.insert(later[ei].height);
            }
        }
    }
    Ok(dirty)
}

/// State of a counter after removing one block's ordinals.
///
/// Untouched since the block: back to the baseline. Otherwise the block's
/// ordinals must sit at the top (total shrinks) or at the bottom (retired
/// into the index) of the live range.
fn reverse_counter(
    current: &CounterState,
    delta: &CounterDelta,
    baseline: Option<&CounterState>,
) -> Result<CounterState, String> {
    if let Some(base) = baseline {
        let post = CounterState {
            index: base.index.clone(),
            total: &base.total + &delta.count,
        };
        if *current == post {
            return Ok(base.clone());
        }
    }

    let total = current
        .total
        .checked_sub(&delta.count)
        .ok_or_else(|| format!("total {} below delta {}", current.total, delta.count))?;

    if current.last_ordinal().as_ref() == Some(&delta.end()) {
        return Ok(CounterState {
            index: current.index.clone(),
            total,
        });
    }
    let mut lowest = current.index.clone();
    lowest.incr();
    if delta.start == lowest {
        return Ok(CounterState {
            index: &current.index + &delta.count,
            total,
        });
    }
    Err(format!(
        "ordinals {}..={} neither oldest nor newest of live range",
        delta.start,
        delta.end()
    ))
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

pub async fn read_counter(
    tx: &mut Box<dyn KvTx>,
    key: &CounterKey,
) -> Result<CounterState, IndexerError> {
    let index = tx.get(Table::Counters, &key.index_key()).await?;
    let total = tx.get(Table::Counters, &key.total_key()).await?;
    Ok(CounterState {
        index: index.map(|b| Counter::from_bytes(&b)).unwrap_or_default(),
        total: total.map(|b| Counter::from_bytes(&b)).unwrap_or_default(),
    })
}

async fn write_counter(
    tx: &mut Box<dyn KvTx>,
    key: &CounterKey,
    state: &CounterState,
) -> Result<(), IndexerError> {
    for (k, v) in [(key.index_key(), &state.index), (key.total_key(), &state.total)] {
        if v.is_zero() {
            tx.delete(Table::Counters, &k).await?;
        } else {
            tx.put(Table::Counters, &k, &v.to_bytes()).await?;
        }
    }
    Ok(())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, IndexerError> {
    Ok(serde_json::to_vec(value)?)
}

/// Distinct nonzero addresses, in order.
fn endpoints(candidates: &[Option<Address>]) -> Vec<Address> {
    let mut out = Vec::with_capacity(candidates.len());
    for addr in candidates.iter().flatten() {
        if !addr.is_zero() && !out.contains(addr) {
            out.push(*addr);
        }
    }
    out
}

/// Read one counter in a throwaway transaction.
pub async fn counter_state(
    store: &dyn KvStore,
    key: &CounterKey,
) -> Result<CounterState, IndexerError> {
    let mut tx = store.begin().await?;
    let state = read_counter(&mut tx, key).await;
    tx.rollback().await?;
    state
}
