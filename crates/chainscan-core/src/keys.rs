//! Store key layout.
//!
//! Both stores use the same layout; they are separate instances, so no
//! per-store prefix is needed. Ordinals are encoded with
//! [`Counter::to_key`] so that key order is ordinal order.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::counter::Counter;
use crate::types::TokenStandard;

pub const SYNCED_KEY: &[u8] = b"synced";
pub const HOME_KEY: &[u8] = b"home";

pub fn height(h: u64) -> Vec<u8> {
    Counter::from(h).to_key()
}

fn join(parts: &[&[u8]]) -> Vec<u8> {
    parts.concat()
}

pub fn block_tx(h: u64, ordinal: &Counter) -> Vec<u8> {
    join(&[&height(h), &ordinal.to_key()])
}

pub fn block_tx_prefix(h: u64) -> Vec<u8> {
    height(h)
}

pub fn tx_index(ordinal: &Counter) -> Vec<u8> {
    ordinal.to_key()
}

pub fn account_tx(addr: &Address, ordinal: &Counter) -> Vec<u8> {
    join(&[addr.as_slice(), &ordinal.to_key()])
}

pub fn internal_tx(parent: &B256, ordinal: &Counter) -> Vec<u8> {
    join(&[parent.as_slice(), &ordinal.to_key()])
}

pub fn account_internal_tx(addr: &Address, ordinal: &Counter) -> Vec<u8> {
    join(&[addr.as_slice(), &ordinal.to_key()])
}

pub fn transfer(std: TokenStandard, ordinal: &Counter) -> Vec<u8> {
    join(&[&[std.tag()], &ordinal.to_key()])
}

pub fn contract_transfer(std: TokenStandard, contract: &Address, ordinal: &Counter) -> Vec<u8> {
    join(&[&[std.tag()], contract.as_slice(), &ordinal.to_key()])
}

pub fn account_transfer(std: TokenStandard, addr: &Address, ordinal: &Counter) -> Vec<u8> {
    join(&[&[std.tag()], addr.as_slice(), &ordinal.to_key()])
}

/// Prefix shared by holder and inventory keys of one token contract.
pub fn token_prefix(std: TokenStandard, contract: &Address) -> Vec<u8> {
    join(&[&[std.tag()], contract.as_slice()])
}

pub fn holder(std: TokenStandard, contract: &Address, holder: &Address) -> Vec<u8> {
    join(&[&token_prefix(std, contract), holder.as_slice()])
}

/// ERC-721: token id → owner. ERC-1155: token id ++ holder → quantity.
pub fn inventory(
    std: TokenStandard,
    contract: &Address,
    token_id: &U256,
    holder: Option<&Address>,
) -> Vec<u8> {
    let id = token_id.to_be_bytes::<32>();
    match holder {
        Some(h) => join(&[&token_prefix(std, contract), &id, h.as_slice()]),
        None => join(&[&token_prefix(std, contract), &id]),
    }
}

// ─── Counters ────────────────────────────────────────────────────────────────

/// One counter family member. Each has an `index` (ordinals retired from
/// the low end) and a `total` (live ordinals) stored under [`Table::Counters`].
///
/// [`Table::Counters`]: crate::kv::Table::Counters
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CounterKey {
    /// All transactions.
    GlobalTx,
    /// Transactions touching an account.
    AccountTx(Address),
    /// Internal calls of one parent transaction.
    InternalTx(B256),
    /// Internal calls touching an account.
    AccountInternalTx(Address),
    /// All transfers of a standard.
    Transfer(TokenStandard),
    /// Transfers of one token contract.
    ContractTransfer(TokenStandard, Address),
    /// Transfers of a standard touching an account.
    AccountTransfer(TokenStandard, Address),
    /// Transfers of any standard touching an account.
    AccountTransferAll(Address),
}

impl CounterKey {
    fn base(&self) -> Vec<u8> {
        match self {
            Self::GlobalTx => b"tx".to_vec(),
            Self::AccountTx(a) => join(&[b"acct_tx/", a.as_slice()]),
            Self::InternalTx(h) => join(&[b"itx/", h.as_slice()]),
            Self::AccountInternalTx(a) => join(&[b"acct_itx/", a.as_slice()]),
            Self::Transfer(s) => join(&[b"xfer/", &[s.tag()]]),
            Self::ContractTransfer(s, c) => join(&[b"contract_xfer/", &[s.tag()], c.as_slice()]),
            Self::AccountTransfer(s, a) => join(&[b"acct_xfer/", &[s.tag()], a.as_slice()]),
            Self::AccountTransferAll(a) => join(&[b"acct_xfer_all/", a.as_slice()]),
        }
    }

    pub fn index_key(&self) -> Vec<u8> {
        join(&[&self.base(), b"/index"])
    }

    pub fn total_key(&self) -> Vec<u8> {
        join(&[&self.base(), b"/total"])
    }
}

impl std::fmt::Display for CounterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GlobalTx => write!(f, "tx"),
            Self::AccountTx(a) => write!(f, "acct_tx:{a}"),
            Self::InternalTx(h) => write!(f, "itx:{h}"),
            Self::AccountInternalTx(a) => write!(f, "acct_itx:{a}"),
            Self::Transfer(s) => write!(f, "xfer:{s}"),
            Self::ContractTransfer(s, c) => write!(f, "contract_xfer:{s}:{c}"),
            Self::AccountTransfer(s, a) => write!(f, "acct_xfer:{s}:{a}"),
            Self::AccountTransferAll(a) => write!(f, "acct_xfer_all:{a}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinal_keys_sort_numerically_within_owner() {
        let a = Address::repeat_byte(0x11);
        let k9 = account_tx(&a, &Counter::from(9));
        let k10 = account_tx(&a, &Counter::from(10));
        let k300 = account_tx(&a, &Counter::from(300));
        assert!(k9 < k10 && k10 < k300);
        assert!(k9.starts_with(a.as_slice()));
    }

    #[test]
    fn counter_keys_do_not_collide() {
        let a = Address::repeat_byte(0x22);
        let keys = [
            CounterKey::AccountTx(a),
            CounterKey::AccountInternalTx(a),
            CounterKey::AccountTransfer(TokenStandard::Erc20, a),
            CounterKey::AccountTransfer(TokenStandard::Erc721, a),
            CounterKey::AccountTransferAll(a),
        ];
        let mut totals: Vec<_> = keys.iter().map(|k| k.total_key()).collect();
        totals.sort();
        totals.dedup();
        assert_eq!(totals.len(), keys.len());
        assert_ne!(keys[0].index_key(), keys[0].total_key());
    }

    #[test]
    fn inventory_keys_share_token_prefix() {
        let c = Address::repeat_byte(0x33);
        let h = Address::repeat_byte(0x44);
        let prefix = token_prefix(TokenStandard::Erc1155, &c);
        let key = inventory(TokenStandard::Erc1155, &c, &U256::from(7), Some(&h));
        assert!(key.starts_with(&prefix));
        assert_eq!(key.len(), prefix.len() + 32 + 20);
    }
}
