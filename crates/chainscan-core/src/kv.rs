//! Transactional key-value store abstraction.
//!
//! Two independent logical instances are used: the *Full* store (finalized
//! chain) and the *Fork* store (provisional window). Every backend exposes
//! atomic multi-key transactions over the closed set of [`Table`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Named tables. Keys within a table are raw bytes built by [`crate::keys`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Table {
    /// block hash → `Block`
    Blocks,
    /// height → block hash
    BlockIndex,
    /// height ++ ordinal → tx hash
    BlockTxs,
    /// tx hash → `Transaction`
    Transactions,
    /// tx hash → `Receipt`
    Receipts,
    /// global tx ordinal → tx hash
    TxIndex,
    /// address ++ ordinal → tx hash
    AccountTxs,
    /// address → `Account`
    Accounts,
    /// parent hash ++ ordinal → `InternalTx`
    InternalTxs,
    /// address ++ ordinal → `InternalTxRef`
    AccountInternalTxs,
    /// standard ++ ordinal → `TokenTransfer`
    Transfers,
    /// standard ++ contract ++ ordinal → global transfer ordinal
    ContractTransfers,
    /// standard ++ address ++ ordinal → global transfer ordinal
    AccountTransfers,
    /// standard ++ contract ++ holder → balance
    Holders,
    /// standard ++ contract ++ token id (++ holder) → owner / quantity
    Inventory,
    /// tx hash → opaque trace payload
    Traces,
    /// counter name → `Counter` bytes
    Counters,
    /// singleton `Home`
    Home,
    /// sync markers
    Meta,
    /// height → serialized ledger entry (Fork store only)
    ForkLedger,
}

impl Table {
    pub const ALL: [Table; 20] = [
        Self::Blocks,
        Self::BlockIndex,
        Self::BlockTxs,
        Self::Transactions,
        Self::Receipts,
        Self::TxIndex,
        Self::AccountTxs,
        Self::Accounts,
        Self::InternalTxs,
        Self::AccountInternalTxs,
        Self::Transfers,
        Self::ContractTransfers,
        Self::AccountTransfers,
        Self::Holders,
        Self::Inventory,
        Self::Traces,
        Self::Counters,
        Self::Home,
        Self::Meta,
        Self::ForkLedger,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::BlockIndex => "block_index",
            Self::BlockTxs => "block_txs",
            Self::Transactions => "transactions",
            Self::Receipts => "receipts",
            Self::TxIndex => "tx_index",
            Self::AccountTxs => "account_txs",
            Self::Accounts => "accounts",
            Self::InternalTxs => "internal_txs",
            Self::AccountInternalTxs => "account_internal_txs",
            Self::Transfers => "transfers",
            Self::ContractTransfers => "contract_transfers",
            Self::AccountTransfers => "account_transfers",
            Self::Holders => "holders",
            Self::Inventory => "inventory",
            Self::Traces => "traces",
            Self::Counters => "counters",
            Self::Home => "home",
            Self::Meta => "meta",
            Self::ForkLedger => "fork_ledger",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A key/value pair returned by prefix scans.
pub type KvPair = (Vec<u8>, Vec<u8>);

/// A store that hands out read/write transactions.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn KvTx>, IndexerError>;
}

/// One open transaction. Dropping it without `commit` discards its writes.
#[async_trait]
pub trait KvTx: Send {
    async fn get(&mut self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, IndexerError>;

    async fn put(&mut self, table: Table, key: &[u8], value: &[u8]) -> Result<(), IndexerError>;

    async fn delete(&mut self, table: Table, key: &[u8]) -> Result<(), IndexerError>;

    /// Key-ordered scan of the entries under `prefix`.
    async fn scan_prefix(
        &mut self,
        table: Table,
        prefix: &[u8],
        offset: usize,
        limit: usize,
    ) -> Result<Vec<KvPair>, IndexerError>;

    async fn commit(self: Box<Self>) -> Result<(), IndexerError>;

    async fn rollback(self: Box<Self>) -> Result<(), IndexerError>;
}

/// Smallest key strictly greater than every key starting with `prefix`.
///
/// `None` when no such bound exists (empty or all-`0xff` prefix).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_end_carries() {
        assert_eq!(prefix_end(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_end(&[0x01, 0xff]), Some(vec![0x02]));
        assert_eq!(prefix_end(&[0xff, 0xff]), None);
        assert_eq!(prefix_end(&[]), None);
    }

    #[test]
    fn table_names_are_unique() {
        let mut names: Vec<_> = Table::ALL.iter().map(|t| t.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), Table::ALL.len());
    }
}
