//! Sync configuration and runtime state types.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Configuration for one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Chain label, used in logs only (e.g. `"ethereum"`).
    pub chain: String,
    /// First height to index when the Full store is empty.
    pub from_block: u64,
    /// Stop after applying this height. `None` = follow the head forever.
    pub to_block: Option<u64>,
    /// Trailing blocks treated as not yet final.
    /// Typical values: 12 (Ethereum PoS), 64 (Ethereum safe), 1 (fast chains).
    pub fork_depth: u64,
    /// Concurrent fetch jobs.
    pub workers: usize,
    /// Head height polling interval (milliseconds).
    pub head_poll_interval_ms: u64,
    /// Sleep when caught up with the head (milliseconds).
    pub idle_sleep_ms: u64,
    /// Fixed backoff between retries of a failed node call (milliseconds).
    pub retry_delay_ms: u64,
    /// Attempts per call trace before it is dropped.
    pub trace_retries: u32,
    /// Look up the balance of every touched address.
    pub fetch_balances: bool,
    /// Counter states cached per store before the cache is reset.
    pub baseline_cache_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chain: "ethereum".into(),
            from_block: 0,
            to_block: None,
            fork_depth: 12,
            workers: 16,
            head_poll_interval_ms: 2000,
            idle_sleep_ms: 100,
            retry_delay_ms: 1000,
            trace_retries: 3,
            fetch_balances: true,
            baseline_cache_capacity: 100_000,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.fork_depth == 0 {
            return Err(IndexerError::Config("fork_depth must be at least 1".into()));
        }
        if self.workers == 0 {
            return Err(IndexerError::Config("workers must be at least 1".into()));
        }
        if let Some(to) = self.to_block {
            if to < self.from_block {
                return Err(IndexerError::Config(format!(
                    "to_block {to} is below from_block {}",
                    self.from_block
                )));
            }
        }
        Ok(())
    }

    pub fn head_poll_interval(&self) -> Duration {
        Duration::from_millis(self.head_poll_interval_ms)
    }

    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Runtime state of the sync loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Not yet started.
    Idle,
    /// Applying heights already behind the fork window.
    Backfilling,
    /// Following the chain tip through the fork window.
    Live,
    /// Shutting down gracefully.
    Stopping,
    /// Terminated.
    Stopped,
    /// Encountered an unrecoverable error.
    Error,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Backfilling => write!(f, "backfilling"),
            Self::Live => write!(f, "live"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
        }
    }
}
