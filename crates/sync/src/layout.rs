//! The `(B, L, F)` triple-interval layout over block numbers.

use alloy_primitives::B256;

/// The header-chain layout between the trusted genesis and the
/// beacon-finalized tip.
///
/// `base` tops the left run linked down to genesis. `least` bottoms the
/// right run linked up to the finalized block; `least_parent` is the
/// hash of block `least - 1`, the anchor the next staged chunk must
/// match. Right after a beacon bump the right run is empty and `least`
/// sits at `final + 1` with the finalized hash as anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncLayout {
    /// Top of the left linked run (`B`).
    pub base: u64,
    /// Hash of the `base` block.
    pub base_hash: B256,
    /// Bottom of the right linked run (`L`).
    pub least: u64,
    /// Hash of block `least - 1`; the attach anchor.
    pub least_parent: B256,
    /// The finalized tip number (`F`).
    pub final_number: u64,
    /// The finalized tip hash.
    pub final_hash: B256,
}

impl SyncLayout {
    /// The layout of a chain that has only its genesis: `(B, L, F)` is
    /// `(0, 1, 0)` with every anchor at the genesis hash.
    pub const fn pristine(genesis_hash: B256) -> Self {
        Self {
            base: 0,
            base_hash: genesis_hash,
            least: 1,
            least_parent: genesis_hash,
            final_number: 0,
            final_hash: genesis_hash,
        }
    }

    /// Whether the left and right runs meet: every header between
    /// genesis and the finalized tip is persisted.
    pub const fn header_chain_complete(&self) -> bool {
        self.least == self.base + 1
    }

    /// Points the layout at a new finalized tip, emptying the right run.
    pub fn retarget(&mut self, final_number: u64, final_hash: B256) {
        self.final_number = final_number;
        self.final_hash = final_hash;
        self.least = final_number + 1;
        self.least_parent = final_hash;
    }

    /// Lowers the right run onto a merged chunk.
    pub fn attach(&mut self, bottom: u64, parent: B256) {
        self.least = bottom;
        self.least_parent = parent;
    }
}
