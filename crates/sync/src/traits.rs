//! The seams towards the network and the store.

use alloy_consensus::{Header, Sealed};
use alloy_primitives::B256;
use async_trait::async_trait;
use core::fmt::Display;
use laurel_storage::{ChainStore, KeyValueStore};

/// One remote peer's header service.
///
/// Implementations sit on the devp2p wire; replies longer than the
/// protocol maximum are truncated by the chunk validator, not here.
#[async_trait]
pub trait PeerClient {
    /// The transport's error type.
    type Error: Display + Send + Sync + 'static;

    /// Headers ascending from `start`, at most `count`.
    async fn headers_by_number(
        &mut self,
        start: u64,
        count: u64,
    ) -> Result<Vec<Header>, Self::Error>;

    /// Headers descending from the block with hash `start`, at most
    /// `count`.
    async fn headers_by_hash(
        &mut self,
        start: B256,
        count: u64,
    ) -> Result<Vec<Header>, Self::Error>;
}

/// Where linked header runs land once they attach to the layout.
pub trait HeaderStash {
    /// The stash's error type.
    type Error: Display;

    /// Persists a run of linked headers.
    fn stash_headers(&mut self, headers: &[Sealed<Header>]) -> Result<(), Self::Error>;

    /// Whether the header with `hash` is already persisted. Drives
    /// backtrack termination.
    fn has_header(&self, hash: B256) -> bool;
}

impl<K: KeyValueStore> HeaderStash for ChainStore<K> {
    type Error = laurel_storage::StoreError;

    fn stash_headers(&mut self, headers: &[Sealed<Header>]) -> Result<(), Self::Error> {
        Self::stash_headers(self, headers)
    }

    fn has_header(&self, hash: B256) -> bool {
        self.header_by_hash(hash).is_ok_and(|h| h.is_some())
    }
}
