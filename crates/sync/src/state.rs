//! The shared syncer state: layout, unprocessed ranges, staged chunks.

use crate::{
    constants::{FETCH_HEADERS_OPPORTUNISTIC, FETCH_HEADERS_REQUEST, STAGED_QUEUE_HWM},
    BlockRangeSet, HeaderStash, LinkedHChain, StagedQueue, SyncError, SyncLayout, SyncResult,
};
use alloy_consensus::{Header, Sealed};
use alloy_primitives::B256;
use tracing::{debug, info, warn};

/// A slice of block numbers reserved for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    /// Lowest block number of the slice.
    pub lo: u64,
    /// Highest block number of the slice.
    pub hi: u64,
    /// When the slice is adjacent to the right run this is the anchor
    /// hash to fetch down from; the lead-peer by-hash mode.
    pub anchor: Option<B256>,
}

impl FetchRequest {
    /// Number of headers the request covers.
    pub const fn count(&self) -> u64 {
        self.hi - self.lo + 1
    }
}

/// What staging a chunk did to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// The chunk is staged.
    Staged,
    /// The queue blew past its high-water mark: everything (including
    /// the new chunk) was flushed back to the unprocessed set.
    FlushedHwm,
}

/// How the syncer reacts to a failed block import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportRecovery {
    /// The chunk came from a lying peer: its range is back in the
    /// unprocessed set and the peer should be zombified.
    Recycled,
    /// The canonical chain moved: single-peer backtracking is armed
    /// from the offending parent.
    BacktrackArmed,
}

/// Running counters surfaced by the daemon tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Headers persisted through the stash.
    pub stashed_headers: u64,
    /// Chunks merged into the right run.
    pub merged_chunks: u64,
    /// Header batches rejected or timed out.
    pub bad_batches: u64,
    /// Times the staged queue hit its high-water mark.
    pub hwm_flushes: u64,
    /// Reorg backtracks armed.
    pub backtracks: u64,
}

/// The state shared by every peer worker.
///
/// One actor mutates it at a time: `multi` peers reserve and release
/// disjoint ranges, `pool` passes serialize whole-queue surgery.
#[derive(Debug)]
pub struct SyncState {
    /// The `(B, L, F)` layout.
    pub layout: SyncLayout,
    /// Block numbers whose headers are neither staged nor persisted.
    pub unprocessed: BlockRangeSet,
    /// Fetched chunks waiting to attach to the right run.
    pub staged: StagedQueue,
    /// When set, a reorg was detected at import and a single peer
    /// backtracks from this hash.
    pub backtrack: Option<B256>,
    /// Counters for the daemon tick.
    pub stats: SyncStats,
}

impl SyncState {
    /// A pristine state anchored at the genesis hash.
    pub fn new(genesis_hash: B256) -> Self {
        Self {
            layout: SyncLayout::pristine(genesis_hash),
            unprocessed: BlockRangeSet::new(),
            staged: StagedQueue::new(),
            backtrack: None,
            stats: SyncStats::default(),
        }
    }

    /// Whether every header between genesis and the finalized tip is
    /// persisted; block import can run from block `base + 1` up.
    pub const fn header_sync_complete(&self) -> bool {
        self.layout.header_chain_complete()
    }

    /// Applies a beacon-finalized head. Returns false for stale heads.
    ///
    /// A newer tip retargets the right run and opens
    /// `(F_old + 1, F_new)` in the unprocessed set.
    pub fn update_beacon(&mut self, header: &Sealed<Header>) -> bool {
        let number = header.number;
        if number <= self.layout.final_number {
            return false;
        }
        let previous = self.layout.final_number;
        self.layout.retarget(number, header.seal());
        self.unprocessed.add(previous.max(self.layout.base) + 1, number);
        info!(
            target: "sync",
            finalized = number,
            unprocessed = self.unprocessed.total(),
            "beacon retarget"
        );
        true
    }

    /// Reserves the upper slice of the unprocessed set for one fetch.
    ///
    /// The reservation expands opportunistically while the staged queue
    /// is shallow; the slice adjacent to the right run is handed out in
    /// by-hash mode with the current anchor.
    pub fn reserve(&mut self) -> Option<FetchRequest> {
        let max = if self.staged.is_empty() {
            FETCH_HEADERS_OPPORTUNISTIC
        } else {
            FETCH_HEADERS_REQUEST
        };
        let (lo, hi) = self.unprocessed.reserve_top(max)?;
        let anchor = (hi + 1 == self.layout.least).then_some(self.layout.least_parent);
        Some(FetchRequest { lo, hi, anchor })
    }

    /// Returns a reserved slice to the unprocessed set.
    pub fn release(&mut self, lo: u64, hi: u64) {
        self.unprocessed.add(lo, hi);
    }

    /// Records a rejected batch or timeout: the range goes back, the
    /// caller zombifies the peer.
    pub fn bad_batch(&mut self, lo: u64, hi: u64) {
        self.stats.bad_batches += 1;
        self.release(lo, hi);
    }

    /// Stages a validated chunk, flushing wholesale past the high-water
    /// mark.
    pub fn stage(&mut self, chunk: LinkedHChain) -> StageOutcome {
        self.staged.insert(chunk);
        if self.staged.len() > STAGED_QUEUE_HWM {
            self.flush_staged();
            self.stats.hwm_flushes += 1;
            warn!(target: "sync", "staged queue over high-water mark; flushed for refetch");
            return StageOutcome::FlushedHwm;
        }
        StageOutcome::Staged
    }

    /// Dumps every staged chunk back into the unprocessed set.
    pub fn flush_staged(&mut self) {
        let spans: Vec<_> = self.staged.spans().collect();
        for (lo, hi) in spans {
            self.unprocessed.add(lo, hi);
        }
        self.staged.drain();
    }

    /// Drains every staged chunk that attaches to the right run into
    /// the stash. Returns the number of headers persisted.
    ///
    /// A chunk keyed at `least - 1` whose top hash does not match the
    /// anchor is from the wrong fork: it is dropped and its range
    /// recycled. When the right run reaches down to `base` with a
    /// mismatched anchor, the left run itself is stale and a backtrack
    /// is armed.
    pub fn process_staged<S: HeaderStash>(&mut self, stash: &mut S) -> SyncResult<usize> {
        let mut stashed = 0usize;
        while let Some(chunk) = self.staged.remove(self.layout.least.saturating_sub(1)) {
            if chunk.top_hash() != self.layout.least_parent {
                warn!(
                    target: "sync",
                    top = chunk.top_number(),
                    expected = %self.layout.least_parent,
                    got = %chunk.top_hash(),
                    "staged chunk does not attach; recycling"
                );
                self.bad_batch(chunk.bottom_number(), chunk.top_number());
                break;
            }

            let bottom = chunk.bottom_number();
            let parent = chunk.parent_hash();
            let count = chunk.len();
            stash
                .stash_headers(&chunk.into_ascending())
                .map_err(|e| SyncError::Stash(e.to_string()))?;

            self.layout.attach(bottom, parent);
            self.stats.merged_chunks += 1;
            self.stats.stashed_headers += count as u64;
            stashed += count;
            debug!(target: "sync", least = bottom, count, "chunk merged into the right run");
        }

        if self.layout.header_chain_complete() {
            if self.layout.least_parent != self.layout.base_hash {
                // The right run walked down to the left run but the
                // hashes disagree: the persisted left run is on a dead
                // fork.
                self.arm_backtrack(self.layout.least_parent);
            } else if self.layout.final_number > self.layout.base {
                // The runs met; the finalized tip becomes the new base.
                self.layout.base = self.layout.final_number;
                self.layout.base_hash = self.layout.final_hash;
                self.layout.least = self.layout.final_number + 1;
                self.layout.least_parent = self.layout.final_hash;
                info!(
                    target: "sync",
                    base = self.layout.base,
                    "header chain linked down to genesis"
                );
            }
        }
        Ok(stashed)
    }

    /// Arms single-peer backtracking from the given parent hash: the
    /// staged queue is cleared and multi-peer fetching pauses until the
    /// backtrack resolves.
    pub fn arm_backtrack(&mut self, from: B256) {
        warn!(target: "sync", %from, "re-org detected; arming single-peer backtrack");
        self.flush_staged();
        self.backtrack = Some(from);
        self.stats.backtracks += 1;
    }

    /// Reacts to a failed `persist_blocks` batch per the recovery
    /// policy: a chunk whose first parent matches what is on disk came
    /// from a lying peer and is recycled; anything else means the
    /// canonical chain moved underneath us.
    pub fn report_import_failure(
        &mut self,
        failing: &Sealed<Header>,
        parent_on_disk: bool,
    ) -> ImportRecovery {
        if parent_on_disk {
            self.bad_batch(failing.number, self.layout.final_number.max(failing.number));
            ImportRecovery::Recycled
        } else {
            self.arm_backtrack(failing.parent_hash);
            ImportRecovery::BacktrackArmed
        }
    }
}
