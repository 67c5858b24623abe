//! Chain data model: blocks, transactions, receipts, accounts, transfers.

use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

// ─── Block / Transaction / Receipt ───────────────────────────────────────────

/// A block header plus the ordered hashes of its transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    /// Unix timestamp (seconds).
    pub timestamp: u64,
    pub miner: Address,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub base_fee: Option<U256>,
    pub size: u64,
    pub transactions: Vec<B256>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: B256,
    pub block_number: u64,
    /// Position inside the block.
    pub index: u64,
    pub from: Address,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub gas: u64,
    pub gas_price: U256,
    pub nonce: u64,
    pub input: Bytes,
    pub timestamp: u64,
}

impl Transaction {
    /// 4-byte method selector, if the input carries one.
    pub fn method(&self) -> Option<[u8; 4]> {
        selector(&self.input)
    }

    pub fn has_input(&self) -> bool {
        !self.input.is_empty()
    }
}

pub(crate) fn selector(input: &[u8]) -> Option<[u8; 4]> {
    input.get(..4).and_then(|s| s.try_into().ok())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub log_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: B256,
    /// 1 = success, 0 = reverted.
    pub status: u64,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    pub effective_gas_price: U256,
    /// Address of the contract created by this transaction, if any.
    pub contract_address: Option<Address>,
    pub logs: Vec<Log>,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status == 1
    }
}

// ─── Accounts ────────────────────────────────────────────────────────────────

/// Everything the explorer knows about one address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    /// Block in which the address was first seen (0 = unknown).
    pub block_number: u64,
    pub balance: U256,
    /// Deployer, for contracts.
    pub creator: Option<Address>,
    /// Creation / first-seen transaction.
    pub tx_hash: Option<B256>,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub token_total_supply: U256,
    pub nft_total_supply: U256,
    pub erc20: bool,
    pub erc721: bool,
    pub erc1155: bool,
}

impl Account {
    pub fn empty(address: Address) -> Self {
        Self {
            address,
            ..Default::default()
        }
    }

    pub fn is_contract(&self) -> bool {
        self.creator.is_some() || self.erc20 || self.erc721 || self.erc1155
    }
}

// ─── Internal transactions ───────────────────────────────────────────────────

/// A nested call extracted from a transaction's call trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalTx {
    pub parent_hash: B256,
    pub block_number: u64,
    pub depth: u32,
    /// `CALL`, `DELEGATECALL`, `CREATE`, ...
    pub call_type: String,
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub gas_limit: u64,
    pub success: bool,
    pub timestamp: u64,
}

/// Pointer from an account's internal-tx index to the record itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalTxRef {
    pub parent_hash: B256,
    pub ordinal: crate::counter::Counter,
}

// ─── Token transfers ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TokenStandard {
    Erc20,
    Erc721,
    Erc1155,
}

impl TokenStandard {
    pub const ALL: [TokenStandard; 3] = [Self::Erc20, Self::Erc721, Self::Erc1155];

    /// One-byte tag used in store keys.
    pub fn tag(self) -> u8 {
        match self {
            Self::Erc20 => 20,
            Self::Erc721 => 21,
            Self::Erc1155 => 55,
        }
    }
}

impl std::fmt::Display for TokenStandard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Erc20 => write!(f, "erc20"),
            Self::Erc721 => write!(f, "erc721"),
            Self::Erc1155 => write!(f, "erc1155"),
        }
    }
}

impl std::str::FromStr for TokenStandard {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "erc20" => Ok(Self::Erc20),
            "erc721" => Ok(Self::Erc721),
            "erc1155" => Ok(Self::Erc1155),
            other => Err(format!("unknown token standard '{other}'")),
        }
    }
}

/// What moved in a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferValue {
    Amount { amount: U256 },
    Token { token_id: U256 },
    Batch { token_id: U256, quantity: U256 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub standard: TokenStandard,
    pub tx_hash: B256,
    pub block_number: u64,
    pub log_index: u64,
    pub contract: Address,
    pub method: Option<[u8; 4]>,
    pub from: Address,
    pub to: Address,
    pub value: TransferValue,
    pub timestamp: u64,
}

// ─── Home summary ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSample {
    pub number: u64,
    pub hash: B256,
    pub miner: Address,
    pub tx_count: u64,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxSample {
    pub hash: B256,
    pub block_number: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub timestamp: u64,
}

/// Rolling dashboard aggregate; one live instance per store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Home {
    pub block_number: u64,
    pub tx_total: u64,
    pub address_total: u64,
    pub erc20_total: u64,
    pub erc721_total: u64,
    pub erc1155_total: u64,
    /// Most recent first.
    pub blocks: Vec<BlockSample>,
    /// Most recent first.
    pub txs: Vec<TxSample>,
    /// `YYYYMMDD` (UTC) → transactions that day.
    pub daily_txs: BTreeMap<String, u64>,
}

// ─── Fetched bundle ──────────────────────────────────────────────────────────

/// Everything a fetch job produced for one height; the unit of apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockBundle {
    pub block: Block,
    /// In block order.
    pub transactions: Vec<Transaction>,
    /// Same order as `transactions`.
    pub receipts: Vec<Receipt>,
    /// Touch-set: every address seen while fetching, with fresh values.
    pub accounts: BTreeMap<Address, Account>,
    /// Parent tx hash → flattened calls, in trace order.
    pub internal_txs: BTreeMap<B256, Vec<InternalTx>>,
    /// Tx hash → opaque trace payload.
    pub traces: BTreeMap<B256, Bytes>,
}

impl BlockBundle {
    pub fn height(&self) -> u64 {
        self.block.number
    }

    /// Transactions paired with their receipts.
    pub fn tx_receipts(&self) -> impl Iterator<Item = (&Transaction, Option<&Receipt>)> {
        self.transactions
            .iter()
            .map(|tx| (tx, self.receipts.iter().find(|r| r.tx_hash == tx.hash)))
    }
}
