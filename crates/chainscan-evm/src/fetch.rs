//! Block fetch job: everything the apply engine needs for one height.
//!
//! A job pulls, from the node:
//! - the block with transaction bodies and all receipts (retried until the
//!   node serves them)
//! - a `callTracer` trace for every transaction with input data (bounded
//!   retries, then dropped)
//! - token-contract metadata through `eth_call`, cached across jobs
//! - balances for every touched address
//!
//! and assembles a [`BlockBundle`]. Jobs share nothing mutable except the
//! [`ContractInfoCache`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy_dyn_abi::DynSolType;
use alloy_primitives::{Address, Bytes, B256, U256};
use futures::stream::{self, StreamExt, TryStreamExt};
use parking_lot::RwLock;
use tracing::{debug, warn};

use chainscan_core::config::SyncConfig;
use chainscan_core::error::IndexerError;
use chainscan_core::transfer::decode_transfers;
use chainscan_core::types::{
    Account, BlockBundle, InternalTx, Receipt, TokenStandard, TokenTransfer, Transaction,
};

use crate::node::{CallFrame, NodeClient};

const NAME: [u8; 4] = [0x06, 0xfd, 0xde, 0x03];
const SYMBOL: [u8; 4] = [0x95, 0xd8, 0x9b, 0x41];
const DECIMALS: [u8; 4] = [0x31, 0x3c, 0xe5, 0x67];
const TOTAL_SUPPLY: [u8; 4] = [0x18, 0x16, 0x0d, 0xdd];

/// Per-job knobs, derived from [`SyncConfig`].
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub retry_delay: Duration,
    pub trace_retries: u32,
    pub fetch_balances: bool,
    /// Concurrent node calls inside one job (traces, balances).
    pub concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for FetchConfig {
    fn from(cfg: &SyncConfig) -> Self {
        Self {
            retry_delay: cfg.retry_delay(),
            trace_retries: cfg.trace_retries,
            fetch_balances: cfg.fetch_balances,
            concurrency: 8,
        }
    }
}

// ─── Contract metadata ───────────────────────────────────────────────────────

/// Immutable token metadata read once per contract.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractInfo {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
}

/// Process-wide cache of [`ContractInfo`], shared by all fetch jobs.
#[derive(Debug, Default)]
pub struct ContractInfoCache {
    entries: RwLock<HashMap<Address, ContractInfo>>,
}

impl ContractInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &Address) -> Option<ContractInfo> {
        self.entries.read().get(address).cloned()
    }

    pub fn insert(&self, address: Address, info: ContractInfo) {
        self.entries.write().insert(address, info);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

// ─── Job ─────────────────────────────────────────────────────────────────────

pub struct FetchJob {
    height: u64,
    node: Arc<dyn NodeClient>,
    info: Arc<ContractInfoCache>,
    config: FetchConfig,
}

impl FetchJob {
    pub fn new(
        height: u64,
        node: Arc<dyn NodeClient>,
        info: Arc<ContractInfoCache>,
        config: FetchConfig,
    ) -> Self {
        Self {
            height,
            node,
            info,
            config,
        }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub async fn run(self) -> Result<BlockBundle, IndexerError> {
        let h = self.height;
        let delay = self.config.retry_delay;

        let node = &self.node;

        let node_block = loop {
            match with_retry("block", h, delay, || node.block(h)).await? {
                Some(b) => break b,
                None => {
                    warn!(height = h, "block not yet served, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        };
        let block = node_block.block;
        let transactions = node_block.transactions;

        let txs = &transactions;
        let receipts = with_retry("receipts", h, delay, || async move {
            let receipts = node.receipts(h).await?;
            order_receipts(txs, receipts)
        })
        .await?;

        let traced = self.traces(&transactions).await;

        let mut internal_txs = BTreeMap::new();
        let mut traces = BTreeMap::new();
        for (tx, frame) in transactions.iter().zip(&traced) {
            let Some(frame) = frame else { continue };
            let mut calls = Vec::new();
            flatten(frame, tx, 1, &mut calls);
            if !calls.is_empty() {
                internal_txs.insert(tx.hash, calls);
            }
            traces.insert(tx.hash, Bytes::from(serde_json::to_vec(frame)?));
        }

        let mut touched = TouchSet::new(h);
        let mut supply_changed = BTreeSet::new();
        for (tx, receipt) in transactions.iter().zip(&receipts) {
            touched.touch(tx.from);
            if let Some(to) = tx.to {
                touched.touch(to);
            }
            if let Some(created) = receipt.contract_address {
                let acc = touched.touch(created);
                acc.creator = Some(tx.from);
                acc.tx_hash = Some(tx.hash);
            }
            for t in decode_transfers(tx, &receipt.logs) {
                if t.from.is_zero() || t.to.is_zero() {
                    supply_changed.insert(t.contract);
                }
                touched.transfer(&t);
            }
        }
        for itx in internal_txs.values().flatten() {
            touched.touch(itx.from);
            touched.touch(itx.to);
        }

        let mut accounts = touched.into_accounts();
        self.contract_metadata(&mut accounts, &supply_changed).await?;
        if self.config.fetch_balances {
            self.balances(&mut accounts).await?;
        }

        debug!(
            height = h,
            txs = transactions.len(),
            traces = traces.len(),
            accounts = accounts.len(),
            "block fetched"
        );

        Ok(BlockBundle {
            block,
            transactions,
            receipts,
            accounts,
            internal_txs,
            traces,
        })
    }

    /// One trace slot per transaction; `None` for transactions without
    /// input and for traces that could not be fetched.
    async fn traces(&self, txs: &[Transaction]) -> Vec<Option<CallFrame>> {
        let mut out: Vec<Option<CallFrame>> = vec![None; txs.len()];
        // owned hashes keep the spawned job future `Send`
        let wanted: Vec<(usize, B256)> = txs
            .iter()
            .enumerate()
            .filter(|(_, tx)| tx.has_input())
            .map(|(i, tx)| (i, tx.hash))
            .collect();
        let fetched: Vec<(usize, Option<CallFrame>)> = stream::iter(
            wanted
                .into_iter()
                .map(|(i, hash)| async move { (i, self.trace(hash).await) }),
        )
        .buffer_unordered(self.config.concurrency.max(1))
        .collect()
        .await;
        for (i, frame) in fetched {
            out[i] = frame;
        }
        out
    }

    async fn trace(&self, tx_hash: B256) -> Option<CallFrame> {
        let attempts = self.config.trace_retries.max(1);
        for attempt in 1..=attempts {
            match self.node.trace(tx_hash).await {
                Ok(frame) => return frame,
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(tx = %tx_hash, attempt, error = %e, "trace failed, retrying");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => {
                    warn!(tx = %tx_hash, attempt, error = %e, "trace dropped");
                    return None;
                }
            }
        }
        None
    }

    async fn contract_metadata(
        &self,
        accounts: &mut BTreeMap<Address, Account>,
        supply_changed: &BTreeSet<Address>,
    ) -> Result<(), IndexerError> {
        for acc in accounts.values_mut() {
            if !(acc.erc20 || acc.erc721 || acc.erc1155) {
                continue;
            }
            let addr = acc.address;
            let (info, first_seen) = match self.info.get(&addr) {
                Some(info) => (info, false),
                None => {
                    let info = self.read_info(addr, acc.erc20).await?;
                    self.info.insert(addr, info.clone());
                    (info, true)
                }
            };
            acc.name = info.name;
            acc.symbol = info.symbol;
            acc.decimals = info.decimals;

            if (acc.erc20 || acc.erc721) && (first_seen || supply_changed.contains(&addr)) {
                if let Some(supply) = self.read_u256(addr, TOTAL_SUPPLY).await? {
                    if acc.erc20 {
                        acc.token_total_supply = supply;
                    } else {
                        acc.nft_total_supply = supply;
                    }
                }
            }
        }
        Ok(())
    }

    async fn read_info(&self, addr: Address, fungible: bool) -> Result<ContractInfo, IndexerError> {
        let name = self.read_string(addr, NAME).await?;
        let symbol = self.read_string(addr, SYMBOL).await?;
        let decimals = if fungible {
            self.read_u256(addr, DECIMALS)
                .await?
                .and_then(|d| u8::try_from(d).ok())
        } else {
            None
        };
        Ok(ContractInfo {
            name,
            symbol,
            decimals,
        })
    }

    /// `eth_call` with a bare selector. A revert yields `None`.
    async fn call(&self, to: Address, selector: [u8; 4]) -> Result<Option<Bytes>, IndexerError> {
        let h = self.height;
        let data = Bytes::copy_from_slice(&selector);
        let res = with_retry("eth_call", h, self.config.retry_delay, || {
            self.node.call(to, data.clone(), h)
        })
        .await;
        match res {
            Ok(out) if out.is_empty() => Ok(None),
            Ok(out) => Ok(Some(out)),
            Err(IndexerError::RpcExecution { message, .. }) => {
                debug!(contract = %to, selector = %hex::encode(selector), %message, "call reverted");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn read_string(&self, to: Address, selector: [u8; 4]) -> Result<Option<String>, IndexerError> {
        Ok(self.call(to, selector).await?.and_then(|out| decode_string(&out)))
    }

    async fn read_u256(&self, to: Address, selector: [u8; 4]) -> Result<Option<U256>, IndexerError> {
        Ok(self
            .call(to, selector)
            .await?
            .and_then(|out| out.get(..32).and_then(U256::try_from_be_slice)))
    }

    async fn balances(&self, accounts: &mut BTreeMap<Address, Account>) -> Result<(), IndexerError> {
        let h = self.height;
        let delay = self.config.retry_delay;
        let node = &self.node;
        let fetched: Vec<(Address, U256)> = stream::iter(accounts.keys().copied().map(|addr| async move {
            let balance = with_retry("balance", h, delay, || node.balance(addr, h)).await?;
            Ok::<_, IndexerError>((addr, balance))
        }))
        .buffer_unordered(self.config.concurrency.max(1))
        .try_collect()
        .await?;
        for (addr, balance) in fetched {
            if let Some(acc) = accounts.get_mut(&addr) {
                acc.balance = balance;
            }
        }
        Ok(())
    }
}

/// Run `call` until it succeeds or fails with a non-transient error,
/// sleeping `delay` between attempts.
pub(crate) async fn with_retry<T, F, Fut>(
    what: &str,
    height: u64,
    delay: Duration,
    mut call: F,
) -> Result<T, IndexerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, IndexerError>>,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match call().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_transient() => {
                warn!(height, what, attempt, delay_ms = delay.as_millis() as u64, error = %e, "node call failed, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Put receipts in transaction order. Missing receipts mean the node has
/// not finished indexing the block; reported as transient.
fn order_receipts(txs: &[Transaction], receipts: Vec<Receipt>) -> Result<Vec<Receipt>, IndexerError> {
    let mut by_hash: HashMap<B256, Receipt> =
        receipts.into_iter().map(|r| (r.tx_hash, r)).collect();
    txs.iter()
        .map(|tx| {
            by_hash
                .remove(&tx.hash)
                .ok_or_else(|| IndexerError::Rpc(format!("receipt for {} not available", tx.hash)))
        })
        .collect()
}

/// Depth-first flattening of nested frames; the root frame is the
/// transaction itself and is not emitted.
fn flatten(frame: &CallFrame, tx: &Transaction, depth: u32, out: &mut Vec<InternalTx>) {
    for call in &frame.calls {
        out.push(InternalTx {
            parent_hash: tx.hash,
            block_number: tx.block_number,
            depth,
            call_type: call.call_type.clone(),
            from: call.from,
            to: call.to.unwrap_or_default(),
            value: call.value.unwrap_or_default(),
            gas_limit: call.gas.and_then(|g| u64::try_from(g).ok()).unwrap_or_default(),
            success: call.error.is_none(),
            timestamp: tx.timestamp,
        });
        flatten(call, tx, depth + 1, out);
    }
}

/// ABI `string`, or a zero-padded `bytes32` as some early tokens return.
fn decode_string(out: &[u8]) -> Option<String> {
    if out.len() >= 64 {
        if let Ok(value) = DynSolType::String.abi_decode(out) {
            if let Some(s) = value.as_str().filter(|s| !s.is_empty()) {
                return Some(s.to_string());
            }
        }
    }
    if out.len() == 32 {
        let end = out.iter().position(|b| *b == 0).unwrap_or(32);
        let s = std::str::from_utf8(&out[..end]).ok()?;
        return (!s.is_empty()).then(|| s.to_string());
    }
    None
}

/// Addresses seen while fetching one block.
struct TouchSet {
    height: u64,
    accounts: BTreeMap<Address, Account>,
}

impl TouchSet {
    fn new(height: u64) -> Self {
        Self {
            height,
            accounts: BTreeMap::new(),
        }
    }

    fn touch(&mut self, address: Address) -> &mut Account {
        let height = self.height;
        self.accounts.entry(address).or_insert_with(|| Account {
            block_number: height,
            ..Account::empty(address)
        })
    }

    fn transfer(&mut self, t: &TokenTransfer) {
        let contract = self.touch(t.contract);
        match t.standard {
            TokenStandard::Erc20 => contract.erc20 = true,
            TokenStandard::Erc721 => contract.erc721 = true,
            TokenStandard::Erc1155 => contract.erc1155 = true,
        }
        self.touch(t.from);
        self.touch(t.to);
    }

    /// The zero address is a mint/burn endpoint, not an account.
    fn into_accounts(mut self) -> BTreeMap<Address, Account> {
        self.accounts.remove(&Address::ZERO);
        self.accounts
    }
}
