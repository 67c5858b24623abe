//! Fluent builder API for creating sync orchestrators.
//!
//! # Example
//!
//! ```rust,no_run
//! use chainscan_evm::SyncBuilder;
//!
//! let config = SyncBuilder::new()
//!     .chain("ethereum")
//!     .from_block(19_000_000)
//!     .fork_depth(12)
//!     .workers(32)
//!     .trace_retries(5)
//!     .build_config();
//! ```

use std::sync::Arc;

use chainscan_core::apply::ApplyEngine;
use chainscan_core::config::SyncConfig;
use chainscan_core::error::IndexerError;
use chainscan_core::kv::KvStore;

use crate::fetch::ContractInfoCache;
use crate::node::NodeClient;
use crate::sync::SyncOrchestrator;

/// Fluent builder for [`SyncConfig`] and [`SyncOrchestrator`].
#[derive(Default)]
pub struct SyncBuilder {
    config: SyncConfig,
    info: Option<Arc<ContractInfoCache>>,
}

impl SyncBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration (e.g. loaded from a file).
    pub fn from_config(config: SyncConfig) -> Self {
        Self { config, info: None }
    }

    /// Set the chain label.
    pub fn chain(mut self, chain: impl Into<String>) -> Self {
        self.config.chain = chain.into();
        self
    }

    /// Set the first height to index on an empty store.
    pub fn from_block(mut self, block: u64) -> Self {
        self.config.from_block = block;
        self
    }

    /// Set the last height to schedule (bounded backfill).
    pub fn to_block(mut self, block: u64) -> Self {
        self.config.to_block = Some(block);
        self
    }

    /// Set the reorg window size.
    pub fn fork_depth(mut self, depth: u64) -> Self {
        self.config.fork_depth = depth;
        self
    }

    /// Set the number of concurrent fetch jobs.
    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n;
        self
    }

    pub fn head_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.head_poll_interval_ms = ms;
        self
    }

    pub fn idle_sleep_ms(mut self, ms: u64) -> Self {
        self.config.idle_sleep_ms = ms;
        self
    }

    /// Set the fixed backoff between node retries.
    pub fn retry_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry_delay_ms = ms;
        self
    }

    /// Set the attempts per call trace before it is dropped.
    pub fn trace_retries(mut self, n: u32) -> Self {
        self.config.trace_retries = n;
        self
    }

    pub fn fetch_balances(mut self, enabled: bool) -> Self {
        self.config.fetch_balances = enabled;
        self
    }

    pub fn baseline_cache_capacity(mut self, n: usize) -> Self {
        self.config.baseline_cache_capacity = n;
        self
    }

    /// Share a contract metadata cache.
    pub fn info_cache(mut self, info: Arc<ContractInfoCache>) -> Self {
        self.info = Some(info);
        self
    }

    /// Build the `SyncConfig`.
    pub fn build_config(self) -> SyncConfig {
        self.config
    }

    /// Validate the configuration, open the apply engine over both stores
    /// and wire up the orchestrator.
    pub async fn build(
        self,
        node: Arc<dyn NodeClient>,
        full: Arc<dyn KvStore>,
        fork: Arc<dyn KvStore>,
    ) -> Result<SyncOrchestrator, IndexerError> {
        self.config.validate()?;
        let engine = ApplyEngine::open(full, fork, self.config.baseline_cache_capacity).await?;
        let orchestrator = SyncOrchestrator::new(self.config, node, engine);
        Ok(match self.info {
            Some(info) => orchestrator.with_info_cache(info),
            None => orchestrator,
        })
    }
}
