//! Sync orchestrator: schedules fetch jobs and applies their bundles in
//! strict height order.
//!
//! ```text
//!   HeadFeed ──► producer ──(SyncCursor)──► WorkerPool ──► FetchJob …
//!                   │                                        │
//!                   └──── ApplyItem{fork, full, retire} ─────┘
//!                                  │  bounded mpsc
//!                                  ▼
//!                   consumer (sole writer) ──► ApplyEngine
//! ```
//!
//! For every item the Fork bundle is applied first, retiring the height
//! that leaves the window in the same transaction, then the promoted
//! height is applied to Full.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use chainscan_core::apply::{ApplyEngine, ApplyStats, Target};
use chainscan_core::config::{IndexerState, SyncConfig};
use chainscan_core::cursor::SyncCursor;
use chainscan_core::error::IndexerError;
use chainscan_core::types::BlockBundle;

use crate::fetch::{with_retry, ContractInfoCache, FetchConfig, FetchJob};
use crate::node::{HeadFeed, NodeClient};
use crate::pool::{JobHandle, WorkerPool};

type Job = JobHandle<Result<BlockBundle, IndexerError>>;

/// One iteration's worth of work, queued in scheduling order.
struct ApplyItem {
    fork: Option<(u64, Job)>,
    full: Option<(u64, Job)>,
    /// Fork height whose ledger entry is reversed with `fork`.
    retire: Option<u64>,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub full_synced: Option<u64>,
    pub fork_synced: Option<u64>,
    pub full_applied: u64,
    pub fork_applied: u64,
    /// Heights still held by the fork ledger.
    pub ledger: Vec<u64>,
}

#[derive(Default)]
struct Applied {
    full: u64,
    fork: u64,
}

pub struct SyncOrchestrator {
    config: SyncConfig,
    node: Arc<dyn NodeClient>,
    engine: ApplyEngine,
    info: Arc<ContractInfoCache>,
    state: watch::Sender<IndexerState>,
}

impl SyncOrchestrator {
    pub fn new(config: SyncConfig, node: Arc<dyn NodeClient>, engine: ApplyEngine) -> Self {
        let (state, _) = watch::channel(IndexerState::Idle);
        Self {
            config,
            node,
            engine,
            info: Arc::new(ContractInfoCache::new()),
            state,
        }
    }

    /// Share a contract metadata cache with other orchestrators.
    pub fn with_info_cache(mut self, info: Arc<ContractInfoCache>) -> Self {
        self.info = info;
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state(&self) -> watch::Receiver<IndexerState> {
        self.state.subscribe()
    }

    pub fn engine(&self) -> &ApplyEngine {
        &self.engine
    }

    pub fn into_engine(self) -> ApplyEngine {
        self.engine
    }

    /// Sync until `to_block` is scheduled or `shutdown` flips to `true`
    /// (dropping its sender also stops the loop). Heights already queued
    /// are applied before returning.
    pub async fn run(&mut self, shutdown: watch::Receiver<bool>) -> Result<SyncReport, IndexerError> {
        let result = self.drive(shutdown).await;
        match &result {
            Ok(report) => {
                set_state(&self.state, IndexerState::Stopped);
                info!(
                    full_synced = ?report.full_synced,
                    fork_synced = ?report.fork_synced,
                    full_applied = report.full_applied,
                    fork_applied = report.fork_applied,
                    "sync stopped"
                );
            }
            Err(e) => {
                set_state(&self.state, IndexerState::Error);
                error!(error = %e, "sync halted");
            }
        }
        result
    }

    async fn drive(&mut self, shutdown: watch::Receiver<bool>) -> Result<SyncReport, IndexerError> {
        self.config.validate()?;
        let delay = self.config.retry_delay();
        let node = self.node.clone();
        let chain_id = with_retry("chain_id", 0, delay, || node.chain_id()).await?;

        let full_synced = self.engine.synced(Target::Full).await?;
        let fork_synced = self.engine.synced(Target::Fork).await?;
        let (cursor, catch_up) = SyncCursor::recover(
            self.config.from_block,
            self.config.fork_depth,
            full_synced,
            fork_synced,
            !self.engine.ledger().is_empty(),
        );
        info!(
            chain = %self.config.chain,
            chain_id,
            begin = cursor.begin,
            fork_start = ?cursor.fork_start,
            fork_depth = cursor.fork_depth,
            full_synced = ?full_synced,
            fork_synced = ?fork_synced,
            "sync starting"
        );
        if !catch_up.is_empty() {
            warn!(heights = ?catch_up, "re-applying promotions lost before restart");
        }

        let pool = WorkerPool::new(self.config.workers);
        let (queue, items) = mpsc::channel(self.config.workers * 2);
        let mut applied = Applied::default();

        let Self {
            config,
            node,
            engine,
            info,
            state,
        } = self;
        let producer = Producer {
            config,
            node,
            info,
            state,
            pool,
        };
        tokio::try_join!(
            producer.run(cursor, catch_up, queue, shutdown),
            consume(engine, items, &mut applied),
        )?;

        Ok(SyncReport {
            full_synced: self.engine.synced(Target::Full).await?,
            fork_synced: self.engine.synced(Target::Fork).await?,
            full_applied: applied.full,
            fork_applied: applied.fork,
            ledger: self.engine.ledger().heights(),
        })
    }
}

struct Producer<'a> {
    config: &'a SyncConfig,
    node: &'a Arc<dyn NodeClient>,
    info: &'a Arc<ContractInfoCache>,
    state: &'a watch::Sender<IndexerState>,
    pool: WorkerPool,
}

impl Producer<'_> {
    fn job(&self, height: u64) -> FetchJob {
        FetchJob::new(
            height,
            self.node.clone(),
            self.info.clone(),
            FetchConfig::from(self.config),
        )
    }

    async fn submit(&self, height: Option<u64>) -> Result<Option<(u64, Job)>, IndexerError> {
        match height {
            Some(h) => Ok(Some((h, self.pool.submit(self.job(h).run()).await?))),
            None => Ok(None),
        }
    }

    async fn run(
        self,
        mut cursor: SyncCursor,
        catch_up: Vec<u64>,
        queue: mpsc::Sender<ApplyItem>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), IndexerError> {
        let feed = HeadFeed::start(
            self.node.clone(),
            self.config.head_poll_interval(),
            self.config.retry_delay(),
        )
        .await?;
        let mut heads = feed.subscribe();

        for h in catch_up {
            if *shutdown.borrow() {
                return Ok(());
            }
            set_state(self.state, IndexerState::Backfilling);
            let item = ApplyItem {
                fork: None,
                full: self.submit(Some(h)).await?,
                retire: None,
            };
            if queue.send(item).await.is_err() {
                return Ok(());
            }
        }

        loop {
            if *shutdown.borrow() {
                set_state(self.state, IndexerState::Stopping);
                info!(next = cursor.begin, "shutdown requested");
                break;
            }
            if self.config.to_block.is_some_and(|to| cursor.begin > to) {
                info!(to_block = ?self.config.to_block, "target height reached");
                break;
            }

            let latest = *heads.borrow_and_update();
            let Some(step) = cursor.next(latest) else {
                tokio::select! {
                    res = shutdown.changed() => if res.is_err() { break },
                    res = heads.changed() => if res.is_err() {
                        return Err(IndexerError::Aborted { reason: "head feed stopped".into() });
                    },
                    _ = tokio::time::sleep(self.config.idle_sleep()) => {}
                }
                continue;
            };

            let mode = if step.fork.is_some() {
                IndexerState::Live
            } else {
                IndexerState::Backfilling
            };
            set_state(self.state, mode);

            let item = ApplyItem {
                fork: self.submit(step.fork).await?,
                full: self.submit(step.full).await?,
                retire: step.retires(cursor.fork_depth),
            };
            // closed queue: the consumer failed and reports why
            if queue.send(item).await.is_err() {
                break;
            }
        }
        Ok(())
    }
}

async fn consume(
    engine: &mut ApplyEngine,
    mut items: mpsc::Receiver<ApplyItem>,
    applied: &mut Applied,
) -> Result<(), IndexerError> {
    while let Some(item) = items.recv().await {
        if let Some((h, job)) = item.fork {
            let bundle = settle(h, Target::Fork, job).await?;
            let stats = engine
                .apply_fork(&bundle, item.retire)
                .await
                .map_err(|e| fatal(h, Target::Fork, e))?;
            log_applied(Target::Fork, &stats, item.retire);
            applied.fork += 1;
        }
        if let Some((h, job)) = item.full {
            let bundle = settle(h, Target::Full, job).await?;
            let stats = engine
                .apply_full(&bundle)
                .await
                .map_err(|e| fatal(h, Target::Full, e))?;
            log_applied(Target::Full, &stats, None);
            applied.full += 1;
        }
    }
    Ok(())
}

async fn settle(height: u64, target: Target, job: Job) -> Result<BlockBundle, IndexerError> {
    job.join().await?.map_err(|e| {
        error!(height, target = %target, error = %e, "fetch job failed");
        e
    })
}

fn fatal(height: u64, target: Target, e: IndexerError) -> IndexerError {
    error!(height, target = %target, error = %e, "block apply failed");
    e
}

fn log_applied(target: Target, stats: &ApplyStats, retired: Option<u64>) {
    info!(
        height = stats.height,
        target = %target,
        txs = stats.txs,
        transfers = stats.transfers,
        internal_txs = stats.internal_txs,
        new_addresses = stats.new_addresses,
        retired = ?retired,
        "block applied"
    );
}

fn set_state(state: &watch::Sender<IndexerState>, next: IndexerState) {
    let changed = state.send_if_modified(|cur| {
        if *cur == next {
            false
        } else {
            *cur = next;
            true
        }
    });
    if changed {
        info!(state = %next, "indexer state");
    }
}
