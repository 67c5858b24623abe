//! Field-level account merge.

use crate::types::Account;

/// Which token-standard flags a merge switched on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NewFlags {
    pub erc20: bool,
    pub erc721: bool,
    pub erc1155: bool,
}

/// Merge a freshly observed account version into the stored one.
///
/// - balance is replaced outright
/// - token-standard flags are OR'ed
/// - identity fields (creator, first tx, name, symbol, decimals, first-seen
///   block) are filled only while empty
/// - total supplies are replaced only by a nonzero value
pub fn merge_account(stored: &Account, incoming: &Account) -> (Account, NewFlags) {
    let mut merged = stored.clone();
    merged.address = incoming.address;

    if merged.block_number == 0 {
        merged.block_number = incoming.block_number;
    }
    merged.balance = incoming.balance;

    let flags = NewFlags {
        erc20: incoming.erc20 && !stored.erc20,
        erc721: incoming.erc721 && !stored.erc721,
        erc1155: incoming.erc1155 && !stored.erc1155,
    };
    merged.erc20 |= incoming.erc20;
    merged.erc721 |= incoming.erc721;
    merged.erc1155 |= incoming.erc1155;

    fill(&mut merged.creator, &incoming.creator);
    fill(&mut merged.tx_hash, &incoming.tx_hash);
    fill(&mut merged.decimals, &incoming.decimals);
    fill_str(&mut merged.name, &incoming.name);
    fill_str(&mut merged.symbol, &incoming.symbol);

    if !incoming.token_total_supply.is_zero() {
        merged.token_total_supply = incoming.token_total_supply;
    }
    if !incoming.nft_total_supply.is_zero() {
        merged.nft_total_supply = incoming.nft_total_supply;
    }

    (merged, flags)
}

/// Overlay a fork-window version over the finalized version for reads.
pub fn overlay_fork(full: Option<Account>, fork: Option<Account>) -> Option<Account> {
    match (full, fork) {
        (Some(full), Some(fork)) => Some(merge_account(&full, &fork).0),
        (full, fork) => fork.or(full),
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(value);
    }
}

fn fill_str(slot: &mut Option<String>, value: &Option<String>) {
    let empty = slot.as_deref().map_or(true, str::is_empty);
    if empty && value.as_deref().is_some_and(|v| !v.is_empty()) {
        slot.clone_from(value);
    }
}
