//! Sync cursor: decides, height by height, which store a block goes to.

use serde::{Deserialize, Serialize};

/// Jobs scheduled for one iteration of the sync loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Height to apply to the Full store.
    pub full: Option<u64>,
    /// Height to apply to the Fork store.
    pub fork: Option<u64>,
}

impl Step {
    /// Fork height whose ledger entry leaves the window with this step.
    pub fn retires(&self, fork_depth: u64) -> Option<u64> {
        self.fork.and_then(|h| h.checked_sub(fork_depth))
    }
}

/// Position of the sync loop.
///
/// - `begin`: next height to schedule
/// - `fork_start`: oldest height still inside the fork window, once the
///   loop has entered fork mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub begin: u64,
    pub fork_start: Option<u64>,
    pub fork_depth: u64,
}

impl SyncCursor {
    pub fn new(begin: u64, fork_depth: u64) -> Self {
        Self {
            begin,
            fork_start: None,
            fork_depth,
        }
    }

    /// Rebuild the cursor from the persisted markers.
    ///
    /// Returns the cursor and the heights whose Full apply was lost between
    /// a committed Fork transaction and its Full counterpart; they must be
    /// applied to Full before anything else.
    pub fn recover(
        from_block: u64,
        fork_depth: u64,
        full_synced: Option<u64>,
        fork_synced: Option<u64>,
        has_ledger: bool,
    ) -> (Self, Vec<u64>) {
        let next_full = full_synced.map_or(from_block, |h| h + 1).max(from_block);
        match fork_synced {
            Some(fork) if has_ledger && fork >= next_full => {
                let begin = fork + 1;
                let fork_start = next_full.max(begin.saturating_sub(fork_depth));
                let catch_up = (next_full..fork_start).collect();
                (
                    Self {
                        begin,
                        fork_start: Some(fork_start),
                        fork_depth,
                    },
                    catch_up,
                )
            }
            _ => (Self::new(next_full, fork_depth), Vec::new()),
        }
    }

    /// Classify `begin` against the node head. `None` when caught up.
    pub fn next(&mut self, latest: u64) -> Option<Step> {
        if self.begin > latest {
            return None;
        }
        let h = self.begin;
        let step = match self.fork_start {
            None if self.is_final(h, latest) => Step {
                full: Some(h),
                fork: None,
            },
            None => {
                self.fork_start = Some(h);
                Step {
                    full: None,
                    fork: Some(h),
                }
            }
            Some(start) => {
                let promote = h.checked_sub(self.fork_depth).is_some_and(|t| start <= t);
                if promote {
                    self.fork_start = Some(start + 1);
                }
                Step {
                    full: promote.then_some(start),
                    fork: Some(h),
                }
            }
        };
        self.begin += 1;
        Some(step)
    }

    /// `true` if `height` is at least `fork_depth` blocks behind `latest`.
    pub fn is_final(&self, height: u64, latest: u64) -> bool {
        latest
            .checked_sub(self.fork_depth)
            .is_some_and(|t| height <= t)
    }

    pub fn in_fork_mode(&self) -> bool {
        self.fork_start.is_some()
    }
}
