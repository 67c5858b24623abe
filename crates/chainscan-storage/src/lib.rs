//! chainscan-storage: key-value backends and read accessors for ChainScan.
//!
//! Backends:
//! - [`MemoryKv`]: in-memory (dev/testing, no persistence), always available
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)
//!
//! [`ChainReader`] serves paginated views over an indexed store.

pub mod reader;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use chainscan_core::memory::MemoryKv;
pub use reader::{ChainReader, InventoryItem, Page, Pager};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteKv;
