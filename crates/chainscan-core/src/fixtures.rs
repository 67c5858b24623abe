//! Hand-built blocks for unit tests.

use std::collections::BTreeMap;

use alloy_primitives::{Address, Bytes, B256, U256};

use crate::types::{Account, Block, BlockBundle, InternalTx, Log, Receipt, Transaction};

pub const ALICE: Address = Address::repeat_byte(0xa1);
pub const BOB: Address = Address::repeat_byte(0xb0);
pub const CAROL: Address = Address::repeat_byte(0xc0);
pub const TOKEN: Address = Address::repeat_byte(0xee);

// 2024-01-15 00:00:00 UTC
pub const BASE_TS: u64 = 1_705_276_800;

pub struct BundleBuilder {
    bundle: BlockBundle,
}

impl BundleBuilder {
    pub fn new(height: u64) -> Self {
        let block = Block {
            number: height,
            hash: B256::from(U256::from(height)),
            parent_hash: B256::from(U256::from(height.saturating_sub(1))),
            timestamp: BASE_TS + height * 12,
            miner: Address::ZERO,
            gas_used: 0,
            gas_limit: 30_000_000,
            base_fee: None,
            size: 0,
            transactions: vec![],
        };
        Self {
            bundle: BlockBundle {
                block,
                transactions: vec![],
                receipts: vec![],
                accounts: BTreeMap::new(),
                internal_txs: BTreeMap::new(),
                traces: BTreeMap::new(),
            },
        }
    }

    /// Add a transaction `from → to` emitting `logs`; returns its hash via
    /// [`BundleBuilder::last_tx`].
    pub fn tx(mut self, from: Address, to: Address, logs: Vec<Log>) -> Self {
        let h = self.bundle.block.number;
        let index = self.bundle.transactions.len() as u64;
        let hash = B256::from(U256::from(h * 1_000 + index));
        let tx = Transaction {
            hash,
            block_number: h,
            index,
            from,
            to: Some(to),
            value: U256::from(1),
            gas: 21_000,
            gas_price: U256::from(1_000_000_000u64),
            nonce: index,
            input: if logs.is_empty() {
                Bytes::new()
            } else {
                Bytes::from_static(&[0xa9, 0x05, 0x9c, 0xbb])
            },
            timestamp: self.bundle.block.timestamp,
        };
        let logs = logs
            .into_iter()
            .enumerate()
            .map(|(i, mut l)| {
                l.log_index = i as u64;
                l
            })
            .collect();
        self.bundle.receipts.push(Receipt {
            tx_hash: hash,
            status: 1,
            gas_used: 21_000,
            cumulative_gas_used: 21_000 * (index + 1),
            effective_gas_price: U256::from(1_000_000_000u64),
            contract_address: None,
            logs,
        });
        self.bundle.block.transactions.push(hash);
        self.bundle.transactions.push(tx);
        for addr in [from, to] {
            self = self.touch(addr, |_| {});
        }
        self
    }

    pub fn touch(mut self, addr: Address, f: impl FnOnce(&mut Account)) -> Self {
        let h = self.bundle.block.number;
        let account = self.bundle.accounts.entry(addr).or_insert_with(|| Account {
            block_number: h,
            balance: U256::from(h),
            ..Account::empty(addr)
        });
        f(account);
        self
    }

    /// Attach an internal call to the most recent transaction.
    pub fn itx(mut self, from: Address, to: Address) -> Self {
        let parent = self.last_tx();
        let h = self.bundle.block.number;
        self.bundle.internal_txs.entry(parent).or_default().push(InternalTx {
            parent_hash: parent,
            block_number: h,
            depth: 1,
            call_type: "CALL".into(),
            from,
            to,
            value: U256::ZERO,
            gas_limit: 50_000,
            success: true,
            timestamp: self.bundle.block.timestamp,
        });
        self.bundle
            .traces
            .insert(parent, Bytes::from(format!("{{\"tx\":\"{parent}\"}}").into_bytes()));
        self
    }

    pub fn last_tx(&self) -> B256 {
        self.bundle.transactions.last().map(|t| t.hash).unwrap_or_default()
    }

    pub fn build(self) -> BlockBundle {
        self.bundle
    }
}

/// A block with one plain transfer and one ERC-20 transfer touching ALICE.
pub fn busy_block(height: u64) -> BlockBundle {
    use crate::transfer::tests::erc20_log;
    BundleBuilder::new(height)
        .tx(ALICE, BOB, vec![])
        .tx(ALICE, TOKEN, vec![erc20_log(TOKEN, ALICE, CAROL, 10 * height)])
        .touch(TOKEN, |a| {
            a.erc20 = true;
            a.symbol = Some("TKN".into());
        })
        .touch(CAROL, |_| {})
        .itx(TOKEN, CAROL)
        .build()
}

/// A plain ALICE → BOB transfer whose accounts come out byte-identical at
/// every height.
pub fn steady_block(height: u64) -> BlockBundle {
    let steady = |a: &mut Account| a.balance = U256::from(7);
    BundleBuilder::new(height)
        .tx(ALICE, BOB, vec![])
        .touch(ALICE, steady)
        .touch(BOB, steady)
        .build()
}
