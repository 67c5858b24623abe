//! Paginated read accessors over an indexed store.
//!
//! Every accessor opens a short read transaction and rolls it back. Lists
//! backed by a counter are returned newest first and report the counter's
//! live total.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use chainscan_core::account::overlay_fork;
use chainscan_core::apply::counter_state;
use chainscan_core::counter::Counter;
use chainscan_core::error::IndexerError;
use chainscan_core::keys::{self, CounterKey};
use chainscan_core::kv::{KvPair, KvStore, KvTx, Table};
use chainscan_core::types::{
    Account, Block, Home, InternalTx, InternalTxRef, Receipt, TokenStandard, TokenTransfer,
    Transaction,
};

/// Upper bound on one page.
pub const MAX_PAGE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pager {
    pub offset: usize,
    pub limit: usize,
}

impl Pager {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, MAX_PAGE),
        }
    }
}

impl Default for Pager {
    fn default() -> Self {
        Self::new(0, 25)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

/// One inventory row. ERC-721 rows always carry a quantity of one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub token_id: U256,
    pub owner: Address,
    pub quantity: U256,
}

/// Read side of the indexer.
///
/// Reads the Full store. With [`ChainReader::with_fork`], point lookups
/// also see fork-window blocks and accounts merge their fork version.
#[derive(Clone)]
pub struct ChainReader {
    full: Arc<dyn KvStore>,
    fork: Option<Arc<dyn KvStore>>,
}

impl ChainReader {
    pub fn new(full: Arc<dyn KvStore>) -> Self {
        Self { full, fork: None }
    }

    pub fn with_fork(mut self, fork: Arc<dyn KvStore>) -> Self {
        self.fork = Some(fork);
        self
    }

    // ─── Summary ─────────────────────────────────────────────────────────────

    pub async fn home(&self) -> Result<Option<Home>, IndexerError> {
        decode_opt(get_once(self.full.as_ref(), Table::Home, keys::HOME_KEY).await?)
    }

    /// Highest applied height; includes the fork window when attached.
    pub async fn last_synced(&self) -> Result<Option<u64>, IndexerError> {
        let full = synced(self.full.as_ref()).await?;
        let fork = match &self.fork {
            Some(fork) => synced(fork.as_ref()).await?,
            None => None,
        };
        Ok(full.max(fork))
    }

    // ─── Blocks ──────────────────────────────────────────────────────────────

    pub async fn block_by_height(&self, height: u64) -> Result<Option<Block>, IndexerError> {
        let Some(hash) = self.lookup(Table::BlockIndex, &keys::height(height)).await? else {
            return Ok(None);
        };
        decode_opt(self.lookup(Table::Blocks, &hash).await?)
    }

    pub async fn block_by_hash(&self, hash: B256) -> Result<Option<Block>, IndexerError> {
        decode_opt(self.lookup(Table::Blocks, hash.as_slice()).await?)
    }

    /// Finalized blocks, newest first.
    pub async fn list_blocks(&self, pager: Pager) -> Result<Page<Block>, IndexerError> {
        let Some(last) = synced(self.full.as_ref()).await? else {
            return Ok(Page::empty());
        };
        let mut tx = self.full.begin().await?;
        let result = async {
            let first = tx.scan_prefix(Table::BlockIndex, &[], 0, 1).await?;
            let lowest = match first.first() {
                Some((k, _)) => Counter::from_key(k)?.0.to_u64().unwrap_or(0),
                None => return Ok(Page::empty()),
            };
            let total = last.saturating_sub(lowest) + 1;
            let mut items = Vec::new();
            let top = last.saturating_sub(pager.offset as u64);
            if pager.offset as u64 >= total {
                return Ok(Page { items, total });
            }
            for h in (lowest..=top).rev().take(pager.limit) {
                let Some(hash) = tx.get(Table::BlockIndex, &keys::height(h)).await? else {
                    continue;
                };
                if let Some(block) = get_json::<Block>(&mut tx, Table::Blocks, &hash).await? {
                    items.push(block);
                }
            }
            Ok::<_, IndexerError>(Page { items, total })
        }
        .await;
        tx.rollback().await?;
        result
    }

    /// Transactions of one block in block order.
    pub async fn block_transactions(
        &self,
        height: u64,
        pager: Pager,
    ) -> Result<Page<Transaction>, IndexerError> {
        let Some(block) = self.block_by_height(height).await? else {
            return Ok(Page::empty());
        };
        let store = self.owner_of(Table::BlockIndex, &keys::height(height)).await?;
        let mut tx = store.begin().await?;
        let result = async {
            let rows = tx
                .scan_prefix(
                    Table::BlockTxs,
                    &keys::block_tx_prefix(height),
                    pager.offset,
                    pager.limit,
                )
                .await?;
            let mut items = Vec::with_capacity(rows.len());
            for (_, hash) in rows {
                if let Some(t) = get_json::<Transaction>(&mut tx, Table::Transactions, &hash).await? {
                    items.push(t);
                }
            }
            Ok::<_, IndexerError>(items)
        }
        .await;
        tx.rollback().await?;
        Ok(Page {
            items: result?,
            total: block.transactions.len() as u64,
        })
    }

    // ─── Transactions ────────────────────────────────────────────────────────

    pub async fn transaction(
        &self,
        hash: B256,
    ) -> Result<Option<(Transaction, Option<Receipt>)>, IndexerError> {
        let Some(tx) = decode_opt::<Transaction>(self.lookup(Table::Transactions, hash.as_slice()).await?)?
        else {
            return Ok(None);
        };
        let receipt = decode_opt(self.lookup(Table::Receipts, hash.as_slice()).await?)?;
        Ok(Some((tx, receipt)))
    }

    pub async fn list_transactions(&self, pager: Pager) -> Result<Page<Transaction>, IndexerError> {
        let page = self
            .indexed(&CounterKey::GlobalTx, pager, |ord| (Table::TxIndex, keys::tx_index(ord)))
            .await?;
        self.resolve_hashes(page).await
    }

    pub async fn account_transactions(
        &self,
        addr: Address,
        pager: Pager,
    ) -> Result<Page<Transaction>, IndexerError> {
        let page = self
            .indexed(&CounterKey::AccountTx(addr), pager, |ord| {
                (Table::AccountTxs, keys::account_tx(&addr, ord))
            })
            .await?;
        self.resolve_hashes(page).await
    }

    pub async fn trace(&self, hash: B256) -> Result<Option<Bytes>, IndexerError> {
        Ok(self.lookup(Table::Traces, hash.as_slice()).await?.map(Bytes::from))
    }

    // ─── Accounts ────────────────────────────────────────────────────────────

    pub async fn account(&self, addr: Address) -> Result<Option<Account>, IndexerError> {
        let full = decode_opt(get_once(self.full.as_ref(), Table::Accounts, addr.as_slice()).await?)?;
        let fork = match &self.fork {
            Some(fork) => decode_opt(get_once(fork.as_ref(), Table::Accounts, addr.as_slice()).await?)?,
            None => None,
        };
        Ok(overlay_fork(full, fork))
    }

    pub async fn account_internal_transactions(
        &self,
        addr: Address,
        pager: Pager,
    ) -> Result<Page<InternalTx>, IndexerError> {
        let refs = self
            .indexed(&CounterKey::AccountInternalTx(addr), pager, |ord| {
                (Table::AccountInternalTxs, keys::account_internal_tx(&addr, ord))
            })
            .await?;
        let mut tx = self.full.begin().await?;
        let result = async {
            let mut items = Vec::with_capacity(refs.items.len());
            for raw in &refs.items {
                let r: InternalTxRef = serde_json::from_slice(raw)?;
                let key = keys::internal_tx(&r.parent_hash, &r.ordinal);
                if let Some(itx) = get_json::<InternalTx>(&mut tx, Table::InternalTxs, &key).await? {
                    items.push(itx);
                }
            }
            Ok::<_, IndexerError>(items)
        }
        .await;
        tx.rollback().await?;
        Ok(Page {
            items: result?,
            total: refs.total,
        })
    }

    /// Internal calls of one transaction.
    pub async fn internal_transactions(
        &self,
        parent: B256,
        pager: Pager,
    ) -> Result<Page<InternalTx>, IndexerError> {
        let page = self
            .indexed(&CounterKey::InternalTx(parent), pager, |ord| {
                (Table::InternalTxs, keys::internal_tx(&parent, ord))
            })
            .await?;
        decode_page(page)
    }

    // ─── Transfers ───────────────────────────────────────────────────────────

    pub async fn list_transfers(
        &self,
        std: TokenStandard,
        pager: Pager,
    ) -> Result<Page<TokenTransfer>, IndexerError> {
        let page = self
            .indexed(&CounterKey::Transfer(std), pager, |ord| {
                (Table::Transfers, keys::transfer(std, ord))
            })
            .await?;
        decode_page(page)
    }

    pub async fn contract_transfers(
        &self,
        std: TokenStandard,
        contract: Address,
        pager: Pager,
    ) -> Result<Page<TokenTransfer>, IndexerError> {
        let page = self
            .indexed(&CounterKey::ContractTransfer(std, contract), pager, |ord| {
                (Table::ContractTransfers, keys::contract_transfer(std, &contract, ord))
            })
            .await?;
        self.resolve_transfers(std, page).await
    }

    pub async fn account_transfers(
        &self,
        std: TokenStandard,
        addr: Address,
        pager: Pager,
    ) -> Result<Page<TokenTransfer>, IndexerError> {
        let page = self
            .indexed(&CounterKey::AccountTransfer(std, addr), pager, |ord| {
                (Table::AccountTransfers, keys::account_transfer(std, &addr, ord))
            })
            .await?;
        self.resolve_transfers(std, page).await
    }

    /// Transfers of any standard that touched `addr`.
    pub async fn account_transfer_total(&self, addr: Address) -> Result<Counter, IndexerError> {
        Ok(counter_state(self.full.as_ref(), &CounterKey::AccountTransferAll(addr))
            .await?
            .total)
    }

    // ─── Holders / inventory ─────────────────────────────────────────────────

    /// Token holders with their balance, in address order.
    pub async fn holders(
        &self,
        std: TokenStandard,
        contract: Address,
        pager: Pager,
    ) -> Result<Page<(Address, U256)>, IndexerError> {
        let prefix = keys::token_prefix(std, &contract);
        let (rows, total) = self.scan_all(Table::Holders, &prefix, pager).await?;
        let mut items = Vec::with_capacity(rows.len());
        for (k, v) in rows {
            items.push((address_at(&k, prefix.len())?, amount(&v)?));
        }
        Ok(Page { items, total })
    }

    /// Token inventory of one contract, in token id order.
    pub async fn inventory(
        &self,
        std: TokenStandard,
        contract: Address,
        pager: Pager,
    ) -> Result<Page<InventoryItem>, IndexerError> {
        let prefix = keys::token_prefix(std, &contract);
        let (rows, total) = self.scan_all(Table::Inventory, &prefix, pager).await?;
        let mut items = Vec::with_capacity(rows.len());
        for (k, v) in rows {
            let id_at = prefix.len();
            let token_id = k
                .get(id_at..id_at + 32)
                .and_then(U256::try_from_be_slice)
                .ok_or_else(|| IndexerError::Codec("inventory key without token id".into()))?;
            let item = match std {
                TokenStandard::Erc1155 => InventoryItem {
                    token_id,
                    owner: address_at(&k, id_at + 32)?,
                    quantity: amount(&v)?,
                },
                _ => InventoryItem {
                    token_id,
                    owner: address_at(&v, 0)?,
                    quantity: U256::from(1),
                },
            };
            items.push(item);
        }
        Ok(Page { items, total })
    }

    // ─── Internals ───────────────────────────────────────────────────────────

    /// Fork first, then Full.
    async fn lookup(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, IndexerError> {
        if let Some(fork) = &self.fork {
            if let Some(v) = get_once(fork.as_ref(), table, key).await? {
                return Ok(Some(v));
            }
        }
        get_once(self.full.as_ref(), table, key).await
    }

    /// The store that answers `lookup(table, key)`.
    async fn owner_of(&self, table: Table, key: &[u8]) -> Result<&Arc<dyn KvStore>, IndexerError> {
        if let Some(fork) = &self.fork {
            if get_once(fork.as_ref(), table, key).await?.is_some() {
                return Ok(fork);
            }
        }
        Ok(&self.full)
    }

    /// Values stored under the newest live ordinals of `counter`.
    async fn indexed(
        &self,
        counter: &CounterKey,
        pager: Pager,
        key_of: impl Fn(&Counter) -> (Table, Vec<u8>),
    ) -> Result<Page<Vec<u8>>, IndexerError> {
        let state = counter_state(self.full.as_ref(), counter).await?;
        let total = state.total.to_u64().unwrap_or(u64::MAX);
        let Some(last) = state.last_ordinal() else {
            return Ok(Page { items: vec![], total });
        };
        let Some(mut ord) = last.checked_sub(&Counter::from(pager.offset as u64)) else {
            return Ok(Page { items: vec![], total });
        };

        let mut tx = self.full.begin().await?;
        let result = async {
            let mut items = Vec::new();
            while items.len() < pager.limit && ord > state.index {
                let (table, key) = key_of(&ord);
                if let Some(v) = tx.get(table, &key).await? {
                    items.push(v);
                }
                ord = ord.saturating_sub(&Counter::one());
            }
            Ok::<_, IndexerError>(items)
        }
        .await;
        tx.rollback().await?;
        Ok(Page {
            items: result?,
            total,
        })
    }

    async fn resolve_hashes(
        &self,
        page: Page<Vec<u8>>,
    ) -> Result<Page<Transaction>, IndexerError> {
        let mut tx = self.full.begin().await?;
        let result = async {
            let mut items = Vec::with_capacity(page.items.len());
            for hash in &page.items {
                if let Some(t) = get_json::<Transaction>(&mut tx, Table::Transactions, hash).await? {
                    items.push(t);
                }
            }
            Ok::<_, IndexerError>(items)
        }
        .await;
        tx.rollback().await?;
        Ok(Page {
            items: result?,
            total: page.total,
        })
    }

    /// Follow global transfer ordinals stored as values.
    async fn resolve_transfers(
        &self,
        std: TokenStandard,
        page: Page<Vec<u8>>,
    ) -> Result<Page<TokenTransfer>, IndexerError> {
        let mut tx = self.full.begin().await?;
        let result = async {
            let mut items = Vec::with_capacity(page.items.len());
            for raw in &page.items {
                let ord = Counter::from_bytes(raw);
                let key = keys::transfer(std, &ord);
                if let Some(t) = get_json::<TokenTransfer>(&mut tx, Table::Transfers, &key).await? {
                    items.push(t);
                }
            }
            Ok::<_, IndexerError>(items)
        }
        .await;
        tx.rollback().await?;
        Ok(Page {
            items: result?,
            total: page.total,
        })
    }

    /// One page of a prefix scan plus the number of entries under the prefix.
    async fn scan_all(
        &self,
        table: Table,
        prefix: &[u8],
        pager: Pager,
    ) -> Result<(Vec<KvPair>, u64), IndexerError> {
        let mut tx = self.full.begin().await?;
        let rows = tx.scan_prefix(table, prefix, 0, usize::MAX).await;
        tx.rollback().await?;
        let rows = rows?;
        let total = rows.len() as u64;
        Ok((
            rows.into_iter().skip(pager.offset).take(pager.limit).collect(),
            total,
        ))
    }
}

async fn get_once(
    store: &dyn KvStore,
    table: Table,
    key: &[u8],
) -> Result<Option<Vec<u8>>, IndexerError> {
    let mut tx = store.begin().await?;
    let value = tx.get(table, key).await;
    tx.rollback().await?;
    value
}

async fn synced(store: &dyn KvStore) -> Result<Option<u64>, IndexerError> {
    Ok(get_once(store, Table::Meta, keys::SYNCED_KEY)
        .await?
        .and_then(|b| Counter::from_bytes(&b).to_u64()))
}

async fn get_json<T: DeserializeOwned>(
    tx: &mut Box<dyn KvTx>,
    table: Table,
    key: &[u8],
) -> Result<Option<T>, IndexerError> {
    decode_opt(tx.get(table, key).await?)
}

fn decode_opt<T: DeserializeOwned>(raw: Option<Vec<u8>>) -> Result<Option<T>, IndexerError> {
    match raw {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn decode_page<T: DeserializeOwned>(page: Page<Vec<u8>>) -> Result<Page<T>, IndexerError> {
    let items = page
        .items
        .iter()
        .map(|raw| serde_json::from_slice(raw))
        .collect::<Result<Vec<T>, _>>()?;
    Ok(Page {
        items,
        total: page.total,
    })
}

fn address_at(bytes: &[u8], at: usize) -> Result<Address, IndexerError> {
    bytes
        .get(at..at + 20)
        .and_then(|s| <[u8; 20]>::try_from(s).ok())
        .map(Address::from)
        .ok_or_else(|| IndexerError::Codec(format!("no address at byte {at}")))
}

fn amount(bytes: &[u8]) -> Result<U256, IndexerError> {
    U256::try_from_be_slice(bytes)
        .ok_or_else(|| IndexerError::Codec(format!("{}-byte amount", bytes.len())))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use chainscan_core::apply::{ApplyEngine, Target};
    use chainscan_core::memory::MemoryKv;
    use chainscan_core::transfer::TRANSFER_TOPIC;
    use chainscan_core::types::{BlockBundle, Log};

    const ALICE: Address = Address::repeat_byte(0xa1);
    const BOB: Address = Address::repeat_byte(0xb0);
    const TOKEN: Address = Address::repeat_byte(0xee);
    const NFT: Address = Address::repeat_byte(0x77);

    fn erc20(from: Address, to: Address, amount: u64) -> Log {
        Log {
            address: TOKEN,
            topics: vec![TRANSFER_TOPIC, from.into_word(), to.into_word()],
            data: Bytes::from(U256::from(amount).to_be_bytes::<32>().to_vec()),
            log_index: 0,
        }
    }

    fn erc721(from: Address, to: Address, id: u64) -> Log {
        Log {
            address: NFT,
            topics: vec![
                TRANSFER_TOPIC,
                from.into_word(),
                to.into_word(),
                B256::from(U256::from(id)),
            ],
            data: Bytes::new(),
            log_index: 1,
        }
    }

    /// One ALICE → TOKEN call per block with the given logs and one
    /// internal TOKEN → BOB call.
    fn block(h: u64, logs: Vec<Log>) -> BlockBundle {
        let hash = B256::from(U256::from(h));
        let tx_hash = B256::from(U256::from(h * 10));
        let ts = 1_700_000_000 + h * 12;
        let tx = Transaction {
            hash: tx_hash,
            block_number: h,
            index: 0,
            from: ALICE,
            to: Some(TOKEN),
            value: U256::ZERO,
            gas: 60_000,
            gas_price: U256::from(1),
            nonce: h,
            input: Bytes::from_static(&[0xa9, 0x05, 0x9c, 0xbb]),
            timestamp: ts,
        };
        let receipt = Receipt {
            tx_hash,
            status: 1,
            gas_used: 50_000,
            cumulative_gas_used: 50_000,
            effective_gas_price: U256::from(1),
            contract_address: None,
            logs,
        };
        let itx = InternalTx {
            parent_hash: tx_hash,
            block_number: h,
            depth: 1,
            call_type: "CALL".into(),
            from: TOKEN,
            to: BOB,
            value: U256::from(h),
            gas_limit: 10_000,
            success: true,
            timestamp: ts,
        };
        let mut accounts = BTreeMap::new();
        for a in [ALICE, BOB, TOKEN] {
            accounts.insert(
                a,
                Account {
                    block_number: h,
                    balance: U256::from(h),
                    erc20: a == TOKEN,
                    ..Account::empty(a)
                },
            );
        }
        BlockBundle {
            block: Block {
                number: h,
                hash,
                parent_hash: B256::from(U256::from(h - 1)),
                timestamp: ts,
                miner: Address::ZERO,
                gas_used: 50_000,
                gas_limit: 30_000_000,
                base_fee: None,
                size: 0,
                transactions: vec![tx_hash],
            },
            transactions: vec![tx],
            receipts: vec![receipt],
            accounts,
            internal_txs: BTreeMap::from([(tx_hash, vec![itx])]),
            traces: BTreeMap::from([(tx_hash, Bytes::from_static(b"{}"))]),
        }
    }

    async fn reader_over(blocks: impl IntoIterator<Item = BlockBundle>) -> (ChainReader, MemoryKv, MemoryKv) {
        let full = MemoryKv::new();
        let fork = MemoryKv::new();
        let mut engine = ApplyEngine::open(Arc::new(full.clone()), Arc::new(fork.clone()), 64)
            .await
            .unwrap();
        for b in blocks {
            engine.apply(&b, Target::Full).await.unwrap();
        }
        (ChainReader::new(Arc::new(full.clone())), full, fork)
    }

    #[tokio::test]
    async fn transactions_newest_first() {
        let (reader, _, _) = reader_over((1..=5).map(|h| block(h, vec![]))).await;

        let page = reader.list_transactions(Pager::new(0, 2)).await.unwrap();
        assert_eq!(page.total, 5);
        let heights: Vec<_> = page.items.iter().map(|t| t.block_number).collect();
        assert_eq!(heights, vec![5, 4]);

        let page = reader.list_transactions(Pager::new(4, 10)).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].block_number, 1);

        let page = reader.list_transactions(Pager::new(9, 10)).await.unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 5);

        let alice = reader.account_transactions(ALICE, Pager::default()).await.unwrap();
        assert_eq!(alice.total, 5);
        assert_eq!(alice.items[0].block_number, 5);
    }

    #[tokio::test]
    async fn blocks_and_block_transactions() {
        let (reader, _, _) = reader_over((10..=13).map(|h| block(h, vec![]))).await;

        assert_eq!(reader.last_synced().await.unwrap(), Some(13));
        let b = reader.block_by_height(12).await.unwrap().unwrap();
        assert_eq!(reader.block_by_hash(b.hash).await.unwrap(), Some(b.clone()));
        assert!(reader.block_by_height(99).await.unwrap().is_none());

        let page = reader.list_blocks(Pager::new(1, 2)).await.unwrap();
        assert_eq!(page.total, 4);
        let numbers: Vec<_> = page.items.iter().map(|b| b.number).collect();
        assert_eq!(numbers, vec![12, 11]);

        let txs = reader.block_transactions(12, Pager::default()).await.unwrap();
        assert_eq!(txs.total, 1);
        assert_eq!(txs.items[0].hash, b.transactions[0]);

        let (tx, receipt) = reader.transaction(b.transactions[0]).await.unwrap().unwrap();
        assert_eq!(tx.block_number, 12);
        assert!(receipt.unwrap().succeeded());
        assert!(reader.trace(b.transactions[0]).await.unwrap().is_some());

        let home = reader.home().await.unwrap().unwrap();
        assert_eq!(home.block_number, 13);
        assert_eq!(home.tx_total, 4);
    }

    #[tokio::test]
    async fn transfers_holders_and_inventory() {
        let (reader, _, _) = reader_over([
            block(1, vec![erc20(Address::ZERO, ALICE, 100), erc721(Address::ZERO, ALICE, 7)]),
            block(2, vec![erc20(ALICE, BOB, 40), erc721(ALICE, BOB, 7)]),
            block(3, vec![erc721(Address::ZERO, ALICE, 8)]),
        ])
        .await;

        let all = reader.list_transfers(TokenStandard::Erc20, Pager::default()).await.unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(all.items[0].block_number, 2);

        let by_contract = reader
            .contract_transfers(TokenStandard::Erc721, NFT, Pager::default())
            .await
            .unwrap();
        assert_eq!(by_contract.total, 3);
        assert!(by_contract.items.iter().all(|t| t.contract == NFT));

        let bob = reader
            .account_transfers(TokenStandard::Erc20, BOB, Pager::default())
            .await
            .unwrap();
        assert_eq!(bob.total, 1);
        assert_eq!(bob.items[0].from, ALICE);
        assert_eq!(reader.account_transfer_total(ALICE).await.unwrap(), Counter::from(5));

        let holders = reader.holders(TokenStandard::Erc20, TOKEN, Pager::default()).await.unwrap();
        assert_eq!(holders.total, 2);
        assert!(holders.items.contains(&(ALICE, U256::from(60))));
        assert!(holders.items.contains(&(BOB, U256::from(40))));

        let inventory = reader.inventory(TokenStandard::Erc721, NFT, Pager::default()).await.unwrap();
        assert_eq!(inventory.total, 2);
        assert_eq!(
            inventory.items,
            vec![
                InventoryItem { token_id: U256::from(7), owner: BOB, quantity: U256::from(1) },
                InventoryItem { token_id: U256::from(8), owner: ALICE, quantity: U256::from(1) },
            ]
        );
    }

    #[tokio::test]
    async fn internal_transactions_by_parent_and_account() {
        let (reader, _, _) = reader_over((1..=3).map(|h| block(h, vec![]))).await;

        let parent = B256::from(U256::from(20));
        let calls = reader.internal_transactions(parent, Pager::default()).await.unwrap();
        assert_eq!(calls.total, 1);
        assert_eq!(calls.items[0].to, BOB);

        let bob = reader.account_internal_transactions(BOB, Pager::new(0, 2)).await.unwrap();
        assert_eq!(bob.total, 3);
        let values: Vec<_> = bob.items.iter().map(|i| i.value).collect();
        assert_eq!(values, vec![U256::from(3), U256::from(2)]);
    }

    #[tokio::test]
    async fn fork_overlay_sees_window() {
        let full = MemoryKv::new();
        let fork = MemoryKv::new();
        let mut engine = ApplyEngine::open(Arc::new(full.clone()), Arc::new(fork.clone()), 64)
            .await
            .unwrap();
        engine.apply(&block(1, vec![]), Target::Full).await.unwrap();
        let mut tip = block(2, vec![]);
        if let Some(token) = tip.accounts.get_mut(&TOKEN) {
            token.symbol = Some("TKN".into());
        }
        engine.apply(&tip, Target::Fork).await.unwrap();

        let plain = ChainReader::new(Arc::new(full.clone()));
        assert_eq!(plain.last_synced().await.unwrap(), Some(1));
        assert!(plain.block_by_height(2).await.unwrap().is_none());
        assert_eq!(plain.account(TOKEN).await.unwrap().unwrap().symbol, None);

        let reader = plain.with_fork(Arc::new(fork));
        assert_eq!(reader.last_synced().await.unwrap(), Some(2));
        assert_eq!(reader.block_by_height(2).await.unwrap().unwrap().number, 2);
        let txs = reader.block_transactions(2, Pager::default()).await.unwrap();
        assert_eq!(txs.items.len(), 1);

        let token = reader.account(TOKEN).await.unwrap().unwrap();
        assert_eq!(token.symbol.as_deref(), Some("TKN"));
        assert_eq!(token.block_number, 1);
        assert_eq!(token.balance, U256::from(2));
    }
}
