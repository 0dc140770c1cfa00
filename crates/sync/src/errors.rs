//! Errors for the `laurel-sync` crate.

use thiserror::Error;

/// A [Result] type alias where the error is [SyncError].
pub type SyncResult<T> = Result<T, SyncError>;

/// A failure inside the header syncer. Peer-side failures are always
/// recoverable: the supervisor recycles the range and picks another
/// peer.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SyncError {
    /// A peer request exceeded its deadline.
    #[error("peer request timed out")]
    Timeout,
    /// The transport reported a failure.
    #[error("network failure: {0}")]
    Network(String),
    /// A peer answered with no headers.
    #[error("empty header reply")]
    EmptyReply,
    /// Reply numbers are not strictly contiguous.
    #[error("header batch is not contiguous")]
    NonContiguousBatch,
    /// A parent-hash link inside the reply does not hash out.
    #[error("header batch link broken at block {0}")]
    BrokenLink(u64),
    /// The reply does not cover the requested anchor.
    #[error("reply does not attach to the requested anchor")]
    WrongAnchor,
    /// The header stash rejected a write.
    #[error("stash failure: {0}")]
    Stash(String),
}
