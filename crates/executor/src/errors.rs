//! Errors for the `laurel-executor` crate.

use alloy_primitives::{Bloom, B256};
use laurel_clique::CliqueError;
use laurel_storage::StoreError;
use thiserror::Error;

/// A [Result] type alias where the error is [ExecutorError].
pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// The error type for block execution.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ExecutorError {
    /// A header commitment did not match the executed result.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The VM reported a failure while applying a transaction or
    /// persisting state.
    #[error("vm failure: {0}")]
    Vm(String),
    /// Sender recovery failed for a transaction.
    #[error("sender recovery failed: {0}")]
    Signature(String),
    /// A transaction type this executor does not process.
    #[error("unsupported transaction type")]
    UnsupportedTransaction,
    /// A pre-Byzantium receipt needs the intermediate state root and the
    /// VM did not supply one.
    #[error("vm did not supply an intermediate state root")]
    MissingIntermediateRoot,
    /// Clique snapshot advancement failed for this block.
    #[error(transparent)]
    Clique(#[from] CliqueError),
    /// The persistence layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A mismatch between a header commitment and the executed result.
///
/// Each variant carries the expected value (from the header) and the
/// value actually computed, which is what ends up in the single log line
/// emitted when chain advancement stops.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// The transactions in the body do not hash to the header's root.
    #[error("transactions root mismatch: expected {expected}, got {got}")]
    TransactionsRoot {
        /// Root the header commits to.
        expected: B256,
        /// Root of the supplied body.
        got: B256,
    },
    /// The body carries transactions although the header commits to the
    /// empty trie.
    #[error("body is non-empty but header commits to the empty trie")]
    UnexpectedTransactions,
    /// Total gas consumed differs from the header's gas-used field.
    #[error("gas used mismatch: expected {expected}, got {got}")]
    GasUsed {
        /// Gas the header reports.
        expected: u64,
        /// Gas actually consumed.
        got: u64,
    },
    /// The uncle list does not hash to the header's ommers hash.
    #[error("ommers hash mismatch: expected {expected}, got {got}")]
    OmmersHash {
        /// Hash the header commits to.
        expected: B256,
        /// Hash of the supplied uncle list.
        got: B256,
    },
    /// The post-state root differs from the header's state root.
    #[error("state root mismatch: expected {expected}, got {got}")]
    StateRoot {
        /// Root the header commits to.
        expected: B256,
        /// Root the VM produced.
        got: B256,
    },
    /// The assembled receipts do not hash to the header's receipts root.
    #[error("receipts root mismatch: expected {expected}, got {got}")]
    ReceiptsRoot {
        /// Root the header commits to.
        expected: B256,
        /// Root of the assembled receipts.
        got: B256,
    },
    /// The union of receipt blooms differs from the header bloom.
    #[error("logs bloom mismatch")]
    LogsBloom {
        /// Bloom the header commits to.
        expected: Box<Bloom>,
        /// Bloom accrued from the receipts.
        got: Box<Bloom>,
    },
}
