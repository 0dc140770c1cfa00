//! Errors for the `laurel-clique` crate.

use alloy_primitives::{Address, B256};
use laurel_storage::StoreError;
use thiserror::Error;

/// A [Result] type alias where the error is [CliqueError].
pub type CliqueResult<T> = Result<T, CliqueError>;

/// A violation of the Clique protocol or a failure of its state machine.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CliqueError {
    /// The recovered seal signer is not in the authorized set.
    #[error("unauthorized signer {0}")]
    UnauthorizedSigner(Address),
    /// The signer sealed another block inside the spam-protection window.
    #[error("signer {0} recently signed")]
    RecentlySigned(Address),
    /// The header nonce is neither the auth nor the drop vote.
    #[error("vote nonce is not an auth or drop vote")]
    InvalidVote,
    /// A header batch handed to snapshot application is not contiguous.
    #[error("out-of-range or non-contiguous voting chain")]
    InvalidVotingChain,
    /// A parent required to rebuild a snapshot is not available.
    #[error("unknown ancestor {0}")]
    UnknownAncestor(B256),
    /// A persisted snapshot failed to load or parse.
    #[error("snapshot load failed: {0}")]
    SnapshotLoad(String),
    /// A snapshot could not be persisted.
    #[error("snapshot store failed: {0}")]
    SnapshotStore(String),
    /// The header extra-data is shorter than the 32-byte vanity prefix.
    #[error("extra-data 32 byte vanity prefix missing")]
    MissingVanity,
    /// The header extra-data is shorter than vanity plus the 65-byte seal.
    #[error("extra-data 65 byte signature suffix missing")]
    MissingSignature,
    /// A non-checkpoint header carries a signer list.
    #[error("non-checkpoint block contains extra signer list")]
    ExtraSigners,
    /// A checkpoint header's signer list is malformed or does not match
    /// the snapshot.
    #[error("invalid signer list on checkpoint block")]
    InvalidCheckpointSigners,
    /// A checkpoint header carries a beneficiary.
    #[error("beneficiary in checkpoint block non-zero")]
    InvalidCheckpointBeneficiary,
    /// A checkpoint header carries a vote nonce.
    #[error("vote nonce in checkpoint block non-zero")]
    InvalidCheckpointVote,
    /// The header mix digest is non-zero.
    #[error("non-zero mix digest")]
    InvalidMixDigest,
    /// The header ommers hash is not the empty-list hash.
    #[error("non empty uncle hash")]
    InvalidUncleHash,
    /// The header difficulty is neither in-turn nor out-of-turn.
    #[error("invalid difficulty")]
    InvalidDifficulty,
    /// The difficulty contradicts the signer's turn.
    #[error("wrong difficulty for signer turn")]
    WrongDifficulty,
    /// The header timestamp is below the parent's plus the block period.
    #[error("invalid timestamp")]
    InvalidTimestamp,
    /// The seal signature failed to parse or recover.
    #[error("invalid seal signature")]
    InvalidSeal,
    /// The underlying store failed outside snapshot (de)serialization.
    #[error(transparent)]
    Store(#[from] StoreError),
}
