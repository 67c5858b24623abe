//! chainscan-core: data model and fork-aware apply engine for the ChainScan indexer.
//!
//! # Architecture
//!
//! ```text
//! SyncCursor ──(full | fork heights)──► ApplyEngine
//!                                          ├── BlockWriter   (one store tx per block)
//!                                          ├── ForkLedger    (undo entries per fork height)
//!                                          ├── BaselineCache (committed counter states)
//!                                          └── KvStore       (Full / Fork backends)
//! ```

pub mod account;
pub mod apply;
pub mod config;
pub mod counter;
pub mod cursor;
pub mod error;
pub mod home;
pub mod keys;
pub mod kv;
pub mod ledger;
pub mod memory;
pub mod transfer;
pub mod types;

#[cfg(test)]
mod fixtures;

pub use apply::{ApplyEngine, ApplyStats, Target};
pub use config::{IndexerState, SyncConfig};
pub use counter::Counter;
pub use cursor::{Step, SyncCursor};
pub use error::IndexerError;
pub use keys::CounterKey;
pub use kv::{KvStore, KvTx, Table};
pub use ledger::{CounterState, ForkLedger, LedgerEntry};
pub use memory::MemoryKv;
pub use types::{
    Account, Block, BlockBundle, Home, InternalTx, Log, Receipt, TokenStandard, TokenTransfer,
    Transaction, TransferValue,
};
