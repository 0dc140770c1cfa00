//! Protocol constants for the Clique engine (EIP-225).

use alloy_primitives::{B64, U256};

/// Fixed number of extra-data prefix bytes reserved for signer vanity.
pub const EXTRA_VANITY: usize = 32;

/// Fixed number of extra-data suffix bytes reserved for the signer seal.
pub const EXTRA_SEAL: usize = 65;

/// Header nonce casting a vote to authorize a signer.
pub const NONCE_AUTH: B64 = B64::new([0xff; 8]);

/// Header nonce casting a vote to drop a signer.
pub const NONCE_DROP: B64 = B64::new([0x00; 8]);

/// Difficulty of a block sealed by the in-turn signer.
pub const DIFF_IN_TURN: U256 = U256::from_limbs([2, 0, 0, 0]);

/// Difficulty of a block sealed by an out-of-turn signer.
pub const DIFF_NO_TURN: U256 = U256::from_limbs([1, 0, 0, 0]);

/// Number of blocks between persisted snapshot checkpoints.
pub const CHECKPOINT_INTERVAL: u64 = 1024;

/// Number of recent snapshots held in memory.
pub const INMEMORY_SNAPSHOTS: usize = 128;

/// Number of recovered seal signers held in memory.
pub const INMEMORY_SIGNATURES: usize = 4096;

/// Default vote-reset epoch when the chain config omits one.
pub const DEFAULT_EPOCH_LENGTH: u64 = 30_000;
