//! Scripted in-process node, for tests and local dry runs.
//!
//! Blocks, traces, balances and contract call results are registered up
//! front; transient failures can be injected per method.

use std::collections::{BTreeMap, HashMap, HashSet};

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use async_trait::async_trait;
use parking_lot::RwLock;

use chainscan_core::error::IndexerError;
use chainscan_core::transfer::{TRANSFER_BATCH_TOPIC, TRANSFER_SINGLE_TOPIC, TRANSFER_TOPIC};
use chainscan_core::types::{Block, Log, Receipt, Transaction};

use crate::node::{CallFrame, NodeBlock, NodeClient};

/// 2024-01-15 00:00:00 UTC
pub const GENESIS_TS: u64 = 1_705_276_800;

#[derive(Default)]
struct MockState {
    chain_id: u64,
    head: u64,
    blocks: BTreeMap<u64, NodeBlock>,
    receipts: BTreeMap<u64, Vec<Receipt>>,
    traces: HashMap<B256, CallFrame>,
    balances: HashMap<Address, U256>,
    calls: HashMap<(Address, [u8; 4]), Bytes>,
    failures: HashMap<&'static str, u32>,
    rejected: HashSet<&'static str>,
    made: HashMap<&'static str, u64>,
}

pub struct MockNode {
    state: RwLock<MockState>,
}

impl MockNode {
    pub fn new(chain_id: u64) -> Self {
        Self {
            state: RwLock::new(MockState {
                chain_id,
                ..Default::default()
            }),
        }
    }

    pub fn set_head(&self, height: u64) {
        self.state.write().head = height;
    }

    pub fn head(&self) -> u64 {
        self.state.read().head
    }

    /// Register block `height` with `txs`; `logs[i]` are the logs of `txs[i]`.
    /// Returns the block hash.
    pub fn push_block(&self, height: u64, txs: Vec<Transaction>, logs: Vec<Vec<Log>>) -> B256 {
        let timestamp = timestamp(height);
        let transactions: Vec<Transaction> = txs
            .into_iter()
            .enumerate()
            .map(|(i, mut tx)| {
                tx.block_number = height;
                tx.index = i as u64;
                tx.timestamp = timestamp;
                tx
            })
            .collect();

        let mut log_index = 0u64;
        let receipts = transactions
            .iter()
            .enumerate()
            .map(|(i, tx)| {
                let logs = logs
                    .get(i)
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|mut l| {
                        l.log_index = log_index;
                        log_index += 1;
                        l
                    })
                    .collect();
                Receipt {
                    tx_hash: tx.hash,
                    status: 1,
                    gas_used: 21_000,
                    cumulative_gas_used: 21_000 * (i as u64 + 1),
                    effective_gas_price: tx.gas_price,
                    contract_address: None,
                    logs,
                }
            })
            .collect();

        let block = Block {
            number: height,
            hash: block_hash(height),
            parent_hash: height.checked_sub(1).map(block_hash).unwrap_or_default(),
            timestamp,
            miner: Address::repeat_byte(0x4d),
            gas_used: 21_000 * transactions.len() as u64,
            gas_limit: 30_000_000,
            base_fee: Some(U256::from(1_000_000_000u64)),
            size: 512,
            transactions: transactions.iter().map(|t| t.hash).collect(),
        };
        let hash = block.hash;

        let mut state = self.state.write();
        state.blocks.insert(height, NodeBlock { block, transactions });
        state.receipts.insert(height, receipts);
        hash
    }

    /// Register empty blocks for every height in `range`.
    pub fn push_empty(&self, range: std::ops::RangeInclusive<u64>) {
        for h in range {
            self.push_block(h, vec![], vec![]);
        }
    }

    pub fn set_trace(&self, tx_hash: B256, frame: CallFrame) {
        self.state.write().traces.insert(tx_hash, frame);
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.state.write().balances.insert(address, balance);
    }

    /// Result of `eth_call` to `to` with the bare `selector`.
    pub fn set_call(&self, to: Address, selector: [u8; 4], output: Bytes) {
        self.state.write().calls.insert((to, selector), output);
    }

    /// Mark the receipt of `tx_hash` as a contract creation.
    pub fn set_contract_address(&self, tx_hash: B256, contract: Address) {
        let mut state = self.state.write();
        for receipt in state.receipts.values_mut().flatten() {
            if receipt.tx_hash == tx_hash {
                receipt.contract_address = Some(contract);
            }
        }
    }

    /// Fail the next `n` calls of `method` with a transient error.
    pub fn fail_next(&self, method: &'static str, n: u32) {
        self.state.write().failures.insert(method, n);
    }

    /// Fail every call of `method` with a non-transient error.
    pub fn reject(&self, method: &'static str) {
        self.state.write().rejected.insert(method);
    }

    /// Calls of `method` received so far, failed ones included.
    pub fn calls_made(&self, method: &str) -> u64 {
        self.state.read().made.get(method).copied().unwrap_or_default()
    }

    fn hit(&self, method: &'static str) -> Result<(), IndexerError> {
        let mut state = self.state.write();
        *state.made.entry(method).or_default() += 1;
        if state.rejected.contains(method) {
            return Err(IndexerError::RpcExecution {
                code: -32601,
                message: format!("{method} not supported"),
            });
        }
        match state.failures.get_mut(method) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(IndexerError::Rpc(format!("{method}: connection reset")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl NodeClient for MockNode {
    async fn chain_id(&self) -> Result<u64, IndexerError> {
        self.hit("chain_id")?;
        Ok(self.state.read().chain_id)
    }

    async fn latest_height(&self) -> Result<u64, IndexerError> {
        self.hit("latest_height")?;
        Ok(self.state.read().head)
    }

    async fn block(&self, height: u64) -> Result<Option<NodeBlock>, IndexerError> {
        self.hit("block")?;
        let state = self.state.read();
        if height > state.head {
            return Ok(None);
        }
        Ok(state.blocks.get(&height).cloned())
    }

    async fn receipts(&self, height: u64) -> Result<Vec<Receipt>, IndexerError> {
        self.hit("receipts")?;
        Ok(self.state.read().receipts.get(&height).cloned().unwrap_or_default())
    }

    async fn trace(&self, tx_hash: B256) -> Result<Option<CallFrame>, IndexerError> {
        self.hit("trace")?;
        Ok(self.state.read().traces.get(&tx_hash).cloned())
    }

    async fn balance(&self, address: Address, _height: u64) -> Result<U256, IndexerError> {
        self.hit("balance")?;
        Ok(self.state.read().balances.get(&address).copied().unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Bytes, _height: u64) -> Result<Bytes, IndexerError> {
        self.hit("call")?;
        let selector: Option<[u8; 4]> = data.get(..4).and_then(|s| s.try_into().ok());
        selector
            .and_then(|s| self.state.read().calls.get(&(to, s)).cloned())
            .ok_or_else(|| IndexerError::RpcExecution {
                code: 3,
                message: "execution reverted".into(),
            })
    }
}

// ─── Builders ────────────────────────────────────────────────────────────────

pub fn timestamp(height: u64) -> u64 {
    GENESIS_TS + height * 12
}

pub fn block_hash(height: u64) -> B256 {
    keccak256([b"block".as_slice(), &height.to_be_bytes()].concat())
}

pub fn tx_hash(height: u64, index: u64) -> B256 {
    keccak256([b"tx".as_slice(), &height.to_be_bytes(), &index.to_be_bytes()].concat())
}

/// A plain call `from → to` carrying `input`.
pub fn transfer_tx(height: u64, index: u64, from: Address, to: Address, input: Bytes) -> Transaction {
    Transaction {
        hash: tx_hash(height, index),
        block_number: height,
        index,
        from,
        to: Some(to),
        value: U256::ZERO,
        gas: 100_000,
        gas_price: U256::from(1_000_000_000u64),
        nonce: index,
        input,
        timestamp: timestamp(height),
    }
}

fn addr_topic(a: Address) -> B256 {
    a.into_word()
}

pub fn erc20_log(token: Address, from: Address, to: Address, amount: u64) -> Log {
    Log {
        address: token,
        topics: vec![TRANSFER_TOPIC, addr_topic(from), addr_topic(to)],
        data: Bytes::from(U256::from(amount).to_be_bytes::<32>().to_vec()),
        log_index: 0,
    }
}

pub fn erc721_log(token: Address, from: Address, to: Address, token_id: u64) -> Log {
    Log {
        address: token,
        topics: vec![
            TRANSFER_TOPIC,
            addr_topic(from),
            addr_topic(to),
            B256::from(U256::from(token_id)),
        ],
        data: Bytes::new(),
        log_index: 0,
    }
}

pub fn erc1155_single_log(token: Address, from: Address, to: Address, id: u64, quantity: u64) -> Log {
    let mut data = U256::from(id).to_be_bytes::<32>().to_vec();
    data.extend_from_slice(&U256::from(quantity).to_be_bytes::<32>());
    Log {
        address: token,
        topics: vec![TRANSFER_SINGLE_TOPIC, addr_topic(from), addr_topic(from), addr_topic(to)],
        data: Bytes::from(data),
        log_index: 0,
    }
}

/// `TransferBatch` with `ids[i]` moving `quantities[i]`.
pub fn erc1155_batch_log(
    token: Address,
    from: Address,
    to: Address,
    ids: &[u64],
    quantities: &[u64],
) -> Log {
    let words = |xs: &[u64]| {
        DynSolValue::Array(xs.iter().map(|x| DynSolValue::Uint(U256::from(*x), 256)).collect())
    };
    let data = DynSolValue::Tuple(vec![words(ids), words(quantities)]).abi_encode_params();
    Log {
        address: token,
        topics: vec![TRANSFER_BATCH_TOPIC, addr_topic(from), addr_topic(from), addr_topic(to)],
        data: Bytes::from(data),
        log_index: 0,
    }
}
