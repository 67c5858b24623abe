//! Node client seam and head-height feed.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use chainscan_core::error::IndexerError;
use chainscan_core::types::{Block, Receipt, Transaction};

/// A block as served by the node, with full transaction bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeBlock {
    pub block: Block,
    pub transactions: Vec<Transaction>,
}

/// One frame of a `callTracer` trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    #[serde(rename = "type")]
    pub call_type: String,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default)]
    pub gas: Option<U256>,
    #[serde(default)]
    pub gas_used: Option<U256>,
    #[serde(default)]
    pub input: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Bytes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<CallFrame>,
}

/// Everything the indexer reads from a chain node.
///
/// Errors classified by [`IndexerError::is_transient`] are retried by the
/// caller; anything else is fatal.
#[async_trait]
pub trait NodeClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64, IndexerError>;

    async fn latest_height(&self) -> Result<u64, IndexerError>;

    /// `None` while the node does not have the block yet.
    async fn block(&self, height: u64) -> Result<Option<NodeBlock>, IndexerError>;

    async fn receipts(&self, height: u64) -> Result<Vec<Receipt>, IndexerError>;

    /// `callTracer` trace of one transaction.
    async fn trace(&self, tx_hash: B256) -> Result<Option<CallFrame>, IndexerError>;

    async fn balance(&self, address: Address, height: u64) -> Result<U256, IndexerError>;

    /// `eth_call` against the state at `height`.
    async fn call(&self, to: Address, data: Bytes, height: u64) -> Result<Bytes, IndexerError>;
}

/// Continuously updated view of the node's head height.
///
/// A background task polls `latest_height`; readers observe the newest
/// value through a `watch` channel. The task ends once every receiver is
/// dropped.
pub struct HeadFeed {
    rx: watch::Receiver<u64>,
    task: JoinHandle<()>,
}

impl HeadFeed {
    /// Read the head once (retrying transient errors), then start polling.
    pub async fn start(
        node: Arc<dyn NodeClient>,
        interval: Duration,
        retry_delay: Duration,
    ) -> Result<Self, IndexerError> {
        let first = loop {
            match node.latest_height().await {
                Ok(h) => break h,
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "head height unavailable, retrying");
                    tokio::time::sleep(retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        };

        let (tx, rx) = watch::channel(first);
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match node.latest_height().await {
                    Ok(h) => {
                        let changed = tx.send_if_modified(|cur| {
                            if h > *cur {
                                *cur = h;
                                true
                            } else {
                                false
                            }
                        });
                        if changed {
                            debug!(head = h, "new head");
                        }
                    }
                    Err(e) => warn!(error = %e, "head poll failed"),
                }
                if tx.is_closed() {
                    break;
                }
            }
        });
        Ok(Self { rx, task })
    }

    pub fn latest(&self) -> u64 {
        *self.rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.rx.clone()
    }
}

impl Drop for HeadFeed {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockNode;

    #[tokio::test]
    async fn feed_follows_head() {
        let node = Arc::new(MockNode::new(1));
        node.set_head(10);
        let feed = HeadFeed::start(node.clone(), Duration::from_millis(5), Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(feed.latest(), 10);

        let mut rx = feed.subscribe();
        node.set_head(12);
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(feed.latest(), 12);
    }

    #[tokio::test]
    async fn feed_never_moves_backwards() {
        let node = Arc::new(MockNode::new(1));
        node.set_head(20);
        let feed = HeadFeed::start(node.clone(), Duration::from_millis(5), Duration::from_millis(1))
            .await
            .unwrap();
        node.set_head(18);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(feed.latest(), 20);
    }

    #[test]
    fn call_frame_parses_call_tracer_output() {
        let json = serde_json::json!({
            "type": "CALL",
            "from": "0x00000000000000000000000000000000000000a1",
            "to": "0x00000000000000000000000000000000000000ee",
            "value": "0x0",
            "gas": "0x5208",
            "gasUsed": "0x5208",
            "input": "0xa9059cbb",
            "calls": [{
                "type": "DELEGATECALL",
                "from": "0x00000000000000000000000000000000000000ee",
                "to": "0x00000000000000000000000000000000000000c0",
                "gas": "0x100",
                "input": "0x",
                "error": "execution reverted"
            }]
        });
        let frame: CallFrame = serde_json::from_value(json).unwrap();
        assert_eq!(frame.call_type, "CALL");
        assert_eq!(frame.gas, Some(U256::from(21_000)));
        assert_eq!(frame.calls.len(), 1);
        assert_eq!(frame.calls[0].error.as_deref(), Some("execution reverted"));
        assert_eq!(frame.calls[0].value, None);
    }
}
