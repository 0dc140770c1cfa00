//! EIP-2124 fork identifiers.
//!
//! A fork id is a `(checksum, next)` pair: the checksum is a cumulative
//! CRC32 over the genesis hash followed by every past fork transition
//! height (big-endian u64), and `next` is the first upcoming transition
//! (zero when none remains). Peers exchange it during the `eth` handshake
//! to detect incompatible chains.

use crate::ChainConfig;
use alloy_primitives::B256;
use crc::{Crc, CRC_32_ISO_HDLC};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// An EIP-2124 fork identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ForkId {
    /// Cumulative CRC32 of the genesis hash and past fork heights.
    pub hash: u32,
    /// The next upcoming fork height, or zero.
    pub next: u64,
}

/// The precomputed fork-id table for one chain.
///
/// Built once from the [ChainConfig]; a pure function of it, so
/// recomputation always yields identical entries. Each entry records the
/// height from which its id applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForkIdTable {
    entries: Vec<(u64, ForkId)>,
}

impl ForkIdTable {
    /// Builds the table by scanning the configured forks in order.
    ///
    /// Transition heights of zero are part of the genesis rule-set and do
    /// not fold into the checksum; forks sharing a height collapse into a
    /// single entry.
    pub fn new(genesis_hash: B256, config: &ChainConfig) -> Self {
        let mut forks = config.fork_transitions();
        forks.retain(|&b| b != 0);
        forks.sort_unstable();
        forks.dedup();

        let mut digest = CRC32.digest();
        digest.update(genesis_hash.as_slice());

        let mut entries = Vec::with_capacity(forks.len() + 1);
        let genesis_id =
            ForkId { hash: digest.clone().finalize(), next: forks.first().copied().unwrap_or(0) };
        entries.push((0, genesis_id));

        for (i, &block) in forks.iter().enumerate() {
            digest.update(&block.to_be_bytes());
            let next = forks.get(i + 1).copied().unwrap_or(0);
            entries.push((block, ForkId { hash: digest.clone().finalize(), next }));
        }

        Self { entries }
    }

    /// The fork id in effect at the given head height.
    pub fn fork_id(&self, head: u64) -> ForkId {
        let mut current = self.entries[0].1;
        for &(from, id) in &self.entries {
            if head >= from {
                current = id;
            } else {
                break;
            }
        }
        current
    }

    /// The table entries as `(activation_height, id)` pairs.
    pub fn entries(&self) -> &[(u64, ForkId)] {
        &self.entries
    }
}
