//! Staged header chunks: reverse-linked runs keyed by their top block.

use crate::{constants::FETCH_HEADERS_REQUEST, SyncError, SyncResult};
use alloy_consensus::{Header, Sealable, Sealed};
use alloy_primitives::B256;
use std::collections::BTreeMap;

/// A validated run of headers in descending order: `headers[0]` has the
/// largest number, every `headers[i].parent_hash` is the hash of
/// `headers[i + 1]`, and `parent_hash()` points below the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedHChain {
    headers: Vec<Sealed<Header>>,
}

impl LinkedHChain {
    /// Builds a chunk from a wire reply, in either number order.
    ///
    /// Replies longer than the protocol maximum are truncated to
    /// [FETCH_HEADERS_REQUEST] before validation. The reply must be
    /// strictly contiguous and hash-linked.
    pub fn from_reply(mut reply: Vec<Header>) -> SyncResult<Self> {
        if reply.is_empty() {
            return Err(SyncError::EmptyReply);
        }
        reply.truncate(FETCH_HEADERS_REQUEST as usize);

        // Normalize to descending block numbers.
        if reply.len() >= 2 && reply[0].number < reply[1].number {
            reply.reverse();
        }

        let headers: Vec<Sealed<Header>> = reply.into_iter().map(Sealable::seal_slow).collect();
        for pair in headers.windows(2) {
            if pair[0].number != pair[1].number + 1 {
                return Err(SyncError::NonContiguousBatch);
            }
            if pair[0].parent_hash != pair[1].seal() {
                return Err(SyncError::BrokenLink(pair[0].number));
            }
        }
        Ok(Self { headers })
    }

    /// Number of headers in the chunk.
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// A chunk is never empty; this exists for the usual pairing.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// The highest block number in the chunk.
    pub fn top_number(&self) -> u64 {
        self.headers[0].number
    }

    /// Hash of the highest header.
    pub fn top_hash(&self) -> B256 {
        self.headers[0].seal()
    }

    /// The lowest block number in the chunk.
    pub fn bottom_number(&self) -> u64 {
        self.headers[self.headers.len() - 1].number
    }

    /// Parent hash of the lowest header, the link below the run.
    pub fn parent_hash(&self) -> B256 {
        self.headers[self.headers.len() - 1].parent_hash
    }

    /// The headers, highest first.
    pub fn headers(&self) -> &[Sealed<Header>] {
        &self.headers
    }

    /// The headers in ascending order, ready for the stash.
    pub fn into_ascending(mut self) -> Vec<Sealed<Header>> {
        self.headers.reverse();
        self.headers
    }
}

/// The staged chunks, keyed by top block number.
#[derive(Debug, Default)]
pub struct StagedQueue {
    chunks: BTreeMap<u64, LinkedHChain>,
}

impl StagedQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of staged chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Stages a chunk under its top number. A chunk already staged for
    /// that key is replaced and returned.
    pub fn insert(&mut self, chunk: LinkedHChain) -> Option<LinkedHChain> {
        self.chunks.insert(chunk.top_number(), chunk)
    }

    /// Removes and returns the chunk whose top block is `top`.
    pub fn remove(&mut self, top: u64) -> Option<LinkedHChain> {
        self.chunks.remove(&top)
    }

    /// The chunk topping at `top`, if staged.
    pub fn get(&self, top: u64) -> Option<&LinkedHChain> {
        self.chunks.get(&top)
    }

    /// Drains every staged chunk, lowest top first.
    pub fn drain(&mut self) -> Vec<LinkedHChain> {
        std::mem::take(&mut self.chunks).into_values().collect()
    }

    /// The staged `(bottom, top)` spans, ascending.
    pub fn spans(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.chunks.values().map(|c| (c.bottom_number(), c.top_number()))
    }
}
