//! JSON-RPC over HTTP implementation of [`NodeClient`].
//!
//! Methods used:
//!
//! | Call | Method |
//! |---|---|
//! | head height | `eth_blockNumber` |
//! | chain id | `eth_chainId` |
//! | block with bodies | `eth_getBlockByNumber(n, true)` |
//! | all receipts of a block | `eth_getBlockReceipts(n)` |
//! | call trace | `debug_traceTransaction(hash, {tracer: "callTracer"})` |
//! | balance | `eth_getBalance(addr, n)` |
//! | contract read | `eth_call({to, data}, n)` |

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::trace;

use chainscan_core::error::IndexerError;
use chainscan_core::types::{Block, Log, Receipt, Transaction};

use crate::node::{CallFrame, NodeBlock, NodeClient};

// ─── JSON-RPC 2.0 wire types ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Result value, or the node's error object as [`IndexerError::RpcExecution`].
    pub fn into_result(self) -> Result<Value, IndexerError> {
        match self.error {
            Some(err) => Err(IndexerError::RpcExecution {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

// ─── Client ──────────────────────────────────────────────────────────────────

/// HTTP JSON-RPC node client.
pub struct HttpNode {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpNode {
    pub fn new(url: impl Into<String>) -> Result<Self, IndexerError> {
        Self::with_timeout(url, Duration::from_secs(30))
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Result<Self, IndexerError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexerError::Config(format!("http client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_once(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, IndexerError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| IndexerError::Rpc(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(IndexerError::Rpc(format!("HTTP {status}: {body}")));
        }

        resp.json::<JsonRpcResponse>()
            .await
            .map_err(|e| IndexerError::Rpc(e.to_string()))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, IndexerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        trace!(id, method, "rpc request");
        let value = self.send_once(&req).await?.into_result()?;
        serde_json::from_value(value)
            .map_err(|e| IndexerError::Codec(format!("{method}: {e}")))
    }
}

#[async_trait]
impl NodeClient for HttpNode {
    async fn chain_id(&self) -> Result<u64, IndexerError> {
        let raw: String = self.request("eth_chainId", vec![]).await?;
        parse_quantity(&raw)
    }

    async fn latest_height(&self) -> Result<u64, IndexerError> {
        let raw: String = self.request("eth_blockNumber", vec![]).await?;
        parse_quantity(&raw)
    }

    async fn block(&self, height: u64) -> Result<Option<NodeBlock>, IndexerError> {
        let raw: Option<RpcBlock> = self
            .request("eth_getBlockByNumber", vec![json!(quantity(height)), json!(true)])
            .await?;
        Ok(raw.map(RpcBlock::into_node_block))
    }

    async fn receipts(&self, height: u64) -> Result<Vec<Receipt>, IndexerError> {
        let raw: Option<Vec<RpcReceipt>> = self
            .request("eth_getBlockReceipts", vec![json!(quantity(height))])
            .await?;
        match raw {
            Some(receipts) => Ok(receipts.into_iter().map(RpcReceipt::into_receipt).collect()),
            None => Err(IndexerError::Rpc(format!("receipts for block {height} not available"))),
        }
    }

    async fn trace(&self, tx_hash: B256) -> Result<Option<CallFrame>, IndexerError> {
        self.request(
            "debug_traceTransaction",
            vec![json!(tx_hash), json!({ "tracer": "callTracer" })],
        )
        .await
    }

    async fn balance(&self, address: Address, height: u64) -> Result<U256, IndexerError> {
        self.request("eth_getBalance", vec![json!(address), json!(quantity(height))])
            .await
    }

    async fn call(&self, to: Address, data: Bytes, height: u64) -> Result<Bytes, IndexerError> {
        self.request(
            "eth_call",
            vec![json!({ "to": to, "data": data }), json!(quantity(height))],
        )
        .await
    }
}

/// Encode a height as a JSON-RPC quantity (`0x`-prefixed, no leading zeros).
pub fn quantity(n: u64) -> String {
    format!("0x{n:x}")
}

/// Parse a JSON-RPC quantity (with or without `0x`).
pub fn parse_quantity(s: &str) -> Result<u64, IndexerError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map_err(|e| IndexerError::Codec(format!("bad quantity '{s}': {e}")))
}

// ─── Node response shapes ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: U64,
    hash: B256,
    parent_hash: B256,
    timestamp: U64,
    miner: Address,
    gas_used: U64,
    gas_limit: U64,
    #[serde(default)]
    base_fee_per_gas: Option<U256>,
    #[serde(default)]
    size: Option<U64>,
    #[serde(default)]
    transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    hash: B256,
    #[serde(default)]
    transaction_index: Option<U64>,
    from: Address,
    #[serde(default)]
    to: Option<Address>,
    value: U256,
    gas: U64,
    #[serde(default)]
    gas_price: Option<U256>,
    nonce: U64,
    #[serde(default)]
    input: Bytes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    #[serde(default)]
    status: Option<U64>,
    gas_used: U64,
    cumulative_gas_used: U64,
    #[serde(default)]
    effective_gas_price: Option<U256>,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    #[serde(default)]
    topics: Vec<B256>,
    #[serde(default)]
    data: Bytes,
    #[serde(default)]
    log_index: Option<U64>,
}

impl RpcBlock {
    fn into_node_block(self) -> NodeBlock {
        let number = self.number.to::<u64>();
        let timestamp = self.timestamp.to::<u64>();
        let transactions: Vec<Transaction> = self
            .transactions
            .into_iter()
            .enumerate()
            .map(|(i, tx)| Transaction {
                hash: tx.hash,
                block_number: number,
                index: tx.transaction_index.map_or(i as u64, |n| n.to::<u64>()),
                from: tx.from,
                to: tx.to,
                value: tx.value,
                gas: tx.gas.to::<u64>(),
                gas_price: tx.gas_price.unwrap_or_default(),
                nonce: tx.nonce.to::<u64>(),
                input: tx.input,
                timestamp,
            })
            .collect();
        let block = Block {
            number,
            hash: self.hash,
            parent_hash: self.parent_hash,
            timestamp,
            miner: self.miner,
            gas_used: self.gas_used.to::<u64>(),
            gas_limit: self.gas_limit.to::<u64>(),
            base_fee: self.base_fee_per_gas,
            size: self.size.map_or(0, |s| s.to::<u64>()),
            transactions: transactions.iter().map(|t| t.hash).collect(),
        };
        NodeBlock {
            block,
            transactions,
        }
    }
}

impl RpcReceipt {
    fn into_receipt(self) -> Receipt {
        Receipt {
            tx_hash: self.transaction_hash,
            // pre-Byzantium receipts carry no status
            status: self.status.map_or(1, |s| s.to::<u64>()),
            gas_used: self.gas_used.to::<u64>(),
            cumulative_gas_used: self.cumulative_gas_used.to::<u64>(),
            effective_gas_price: self.effective_gas_price.unwrap_or_default(),
            contract_address: self.contract_address,
            logs: self
                .logs
                .into_iter()
                .enumerate()
                .map(|(i, l)| Log {
                    address: l.address,
                    topics: l.topics,
                    data: l.data,
                    log_index: l.log_index.map_or(i as u64, |n| n.to::<u64>()),
                })
                .collect(),
        }
    }
}
