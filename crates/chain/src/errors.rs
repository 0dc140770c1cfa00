//! Errors for the `laurel-chain` crate.

use crate::KinshipError;
use alloy_primitives::B256;
use laurel_clique::CliqueError;
use laurel_executor::ExecutorError;
use laurel_storage::StoreError;
use thiserror::Error;

/// A [Result] type alias where the error is [ChainError].
pub type ChainResult<T> = Result<T, ChainError>;

/// The sum of everything that can go wrong while advancing the chain.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChainError {
    /// `persist_blocks` was handed slices of different lengths.
    #[error("headers/bodies length mismatch: {headers} headers, {bodies} bodies")]
    LengthMismatch {
        /// Number of headers supplied.
        headers: usize,
        /// Number of bodies supplied.
        bodies: usize,
    },
    /// The first block of a batch does not attach to a persisted header.
    #[error("unknown parent {0} for batch")]
    UnknownParent(B256),
    /// The store holds no genesis block to anchor the chain on.
    #[error("store holds no genesis block")]
    GenesisMissing,
    /// A header failed validation against its parent.
    #[error(transparent)]
    Kinship(#[from] KinshipError),
    /// Block execution failed.
    #[error(transparent)]
    Execution(#[from] ExecutorError),
    /// The consensus engine rejected a header.
    #[error(transparent)]
    Clique(#[from] CliqueError),
    /// The persistence layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The VM factory failed to seed a block state.
    #[error("vm failure: {0}")]
    Vm(String),
}
