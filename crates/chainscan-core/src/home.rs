//! Home summary: the dashboard aggregate rewritten on every block.

use alloy_primitives::B256;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Block, BlockSample, Home, Transaction, TxSample};

/// Samples kept per list.
pub const RECENT_LIMIT: usize = 10;
/// Days kept in the per-day transaction histogram.
pub const HISTOGRAM_DAYS: u64 = 14;

const DAY_SECS: u64 = 86_400;

/// `YYYYMMDD` in UTC.
pub fn day_key(timestamp: u64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp as i64, 0)
        .map(|t| t.format("%Y%m%d").to_string())
        .unwrap_or_default()
}

/// What one block added to the summary. Kept in the fork ledger so the
/// block can be retracted after later blocks rewrote the summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomeContribution {
    pub height: u64,
    pub txs: u64,
    pub new_addresses: u64,
    pub erc20: u64,
    pub erc721: u64,
    pub erc1155: u64,
    pub day: String,
    pub tx_hashes: Vec<B256>,
}

impl Home {
    /// Fold one block into the summary.
    pub fn record_block(&mut self, block: &Block, txs: &[Transaction], c: &HomeContribution) {
        self.block_number = block.number;
        self.tx_total += c.txs;
        self.address_total += c.new_addresses;
        self.erc20_total += c.erc20;
        self.erc721_total += c.erc721;
        self.erc1155_total += c.erc1155;

        self.blocks.insert(
            0,
            BlockSample {
                number: block.number,
                hash: block.hash,
                miner: block.miner,
                tx_count: txs.len() as u64,
                timestamp: block.timestamp,
            },
        );
        self.blocks.truncate(RECENT_LIMIT);

        // newest transaction of the block first
        for tx in txs.iter().rev().take(RECENT_LIMIT).rev() {
            self.txs.insert(
                0,
                TxSample {
                    hash: tx.hash,
                    block_number: tx.block_number,
                    from: tx.from,
                    to: tx.to,
                    value: tx.value,
                    timestamp: tx.timestamp,
                },
            );
        }
        self.txs.truncate(RECENT_LIMIT);

        if !c.day.is_empty() {
            *self.daily_txs.entry(c.day.clone()).or_default() += c.txs;
        }
        let evicted = day_key(block.timestamp.saturating_sub(HISTOGRAM_DAYS * DAY_SECS));
        self.daily_txs.remove(&evicted);
    }

    /// Undo a block's contribution in place. Samples evicted by that block
    /// are not recovered.
    pub fn retract(&mut self, c: &HomeContribution) {
        self.tx_total = self.tx_total.saturating_sub(c.txs);
        self.address_total = self.address_total.saturating_sub(c.new_addresses);
        self.erc20_total = self.erc20_total.saturating_sub(c.erc20);
        self.erc721_total = self.erc721_total.saturating_sub(c.erc721);
        self.erc1155_total = self.erc1155_total.saturating_sub(c.erc1155);

        self.blocks.retain(|b| b.number != c.height);
        self.txs.retain(|t| !c.tx_hashes.contains(&t.hash));

        if let Some(n) = self.daily_txs.get_mut(&c.day) {
            *n = n.saturating_sub(c.txs);
            if *n == 0 {
                self.daily_txs.remove(&c.day);
            }
        }
    }
}
