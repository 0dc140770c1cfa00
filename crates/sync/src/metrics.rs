//! Prometheus metrics for the header syncer, refreshed from the daemon
//! tick.

use crate::SyncState;
use lazy_static::lazy_static;
use prometheus::{self, register_int_gauge, IntGauge};

lazy_static! {
    /// The finalized tip the layout is targeting.
    pub static ref FINALIZED_TIP: IntGauge = register_int_gauge!(
        "laurel_sync_finalized_tip",
        "Beacon-finalized tip block number"
    ).expect("Finalized tip gauge failed to register");

    /// Top of the left linked run.
    pub static ref BASE_BLOCK: IntGauge = register_int_gauge!(
        "laurel_sync_base_block",
        "Top of the genesis-linked header run"
    ).expect("Base block gauge failed to register");

    /// Block numbers not yet fetched.
    pub static ref UNPROCESSED_BLOCKS: IntGauge = register_int_gauge!(
        "laurel_sync_unprocessed_blocks",
        "Block numbers whose headers are not yet fetched"
    ).expect("Unprocessed blocks gauge failed to register");

    /// Chunks waiting to attach.
    pub static ref STAGED_CHUNKS: IntGauge = register_int_gauge!(
        "laurel_sync_staged_chunks",
        "Staged header chunks waiting to link up"
    ).expect("Staged chunks gauge failed to register");

    /// Headers persisted so far.
    pub static ref STASHED_HEADERS: IntGauge = register_int_gauge!(
        "laurel_sync_stashed_headers",
        "Headers persisted by the syncer"
    ).expect("Stashed headers gauge failed to register");

    /// Rejected or timed-out batches.
    pub static ref BAD_BATCHES: IntGauge = register_int_gauge!(
        "laurel_sync_bad_batches",
        "Header batches rejected or timed out"
    ).expect("Bad batches gauge failed to register");
}

/// Pushes the current state into the gauges.
pub fn update(state: &SyncState) {
    FINALIZED_TIP.set(state.layout.final_number as i64);
    BASE_BLOCK.set(state.layout.base as i64);
    UNPROCESSED_BLOCKS.set(state.unprocessed.total() as i64);
    STAGED_CHUNKS.set(state.staged.len() as i64);
    STASHED_HEADERS.set(state.stats.stashed_headers as i64);
    BAD_BATCHES.set(state.stats.bad_batches as i64);
}
