//! Errors for the `laurel-storage` crate.

use alloy_primitives::B256;
use thiserror::Error;

/// A [Result] type alias where the error is [StoreError].
pub type StoreResult<T> = Result<T, StoreError>;

/// An error raised by the persistence layer.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// A stored blob failed to decode.
    #[error("RLP decoding failed: {0}")]
    Rlp(#[from] alloy_rlp::Error),
    /// The backing store reported a failure.
    #[error("KV backend error: {0}")]
    Io(String),
    /// A transaction operation was issued with no transaction open.
    #[error("no open KV transaction")]
    NoTransaction,
    /// A header referenced by hash is not persisted.
    #[error("missing header {0}")]
    MissingHeader(B256),
}
