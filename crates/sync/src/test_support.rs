//! Shared fixtures for the syncer tests.

use crate::{HeaderStash, PeerClient};
use alloy_consensus::{Header, Sealable, Sealed};
use alloy_primitives::B256;
use async_trait::async_trait;
use std::{
    collections::{BTreeMap, HashMap},
    convert::Infallible,
    sync::Arc,
};

/// A linked run of sealed headers, ascending from `start`, anchored on
/// `parent`.
pub(crate) fn header_run(start: u64, len: usize, parent: B256) -> Vec<Sealed<Header>> {
    let mut out = Vec::with_capacity(len);
    let mut parent = parent;
    for offset in 0..len {
        let number = start + offset as u64;
        let header = Header {
            number,
            parent_hash: parent,
            timestamp: number * 12,
            gas_limit: 30_000_000,
            ..Default::default()
        }
        .seal_slow();
        parent = header.seal();
        out.push(header);
    }
    out
}

/// An in-memory stash recording everything it is handed.
#[derive(Debug, Default)]
pub(crate) struct VecStash {
    by_number: BTreeMap<u64, B256>,
    hashes: HashMap<B256, u64>,
}

impl VecStash {
    /// Pre-populates the stash, as if earlier sync rounds persisted the
    /// given headers.
    pub(crate) fn seed(&mut self, headers: &[Sealed<Header>]) {
        for header in headers {
            self.by_number.insert(header.number, header.seal());
            self.hashes.insert(header.seal(), header.number);
        }
    }

    /// The stashed block numbers in ascending order.
    pub(crate) fn numbers(&self) -> Vec<u64> {
        self.by_number.keys().copied().collect()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }
}

impl HeaderStash for VecStash {
    type Error = Infallible;

    fn stash_headers(&mut self, headers: &[Sealed<Header>]) -> Result<(), Self::Error> {
        self.seed(headers);
        Ok(())
    }

    fn has_header(&self, hash: B256) -> bool {
        self.hashes.contains_key(&hash)
    }
}

/// Maximum headers a simulated peer puts in one reply, mirroring the
/// wire protocol limit.
const REPLY_CAP: u64 = 1024;

/// A peer client serving a fixed canonical chain from memory, with
/// optional misbehavior.
#[derive(Debug, Clone)]
pub(crate) struct MapClient {
    by_number: Arc<BTreeMap<u64, Sealed<Header>>>,
    by_hash: Arc<HashMap<B256, u64>>,
    lying: bool,
    stalling: bool,
}

impl MapClient {
    pub(crate) fn new(chain: Vec<Sealed<Header>>) -> Self {
        let by_number: BTreeMap<u64, Sealed<Header>> =
            chain.into_iter().map(|h| (h.number, h)).collect();
        let by_hash = by_number.values().map(|h| (h.seal(), h.number)).collect();
        Self { by_number: Arc::new(by_number), by_hash: Arc::new(by_hash), lying: false, stalling: false }
    }

    /// Forge a parent hash in every reply.
    pub(crate) fn lying(mut self) -> Self {
        self.lying = true;
        self
    }

    /// Never answer inside the zombie threshold.
    pub(crate) fn stalling(mut self) -> Self {
        self.stalling = true;
        self
    }

    fn corrupt(&self, mut reply: Vec<Header>) -> Vec<Header> {
        if self.lying && reply.len() > 1 {
            reply[1].parent_hash = B256::repeat_byte(0xbd);
        }
        reply
    }

    async fn misbehave(&self) {
        if self.stalling {
            tokio::time::sleep(core::time::Duration::from_secs(30)).await;
        }
    }
}

#[async_trait]
impl PeerClient for MapClient {
    type Error = String;

    async fn headers_by_number(
        &mut self,
        start: u64,
        count: u64,
    ) -> Result<Vec<Header>, Self::Error> {
        self.misbehave().await;
        let count = count.min(REPLY_CAP);
        let reply = (start..start + count)
            .map_while(|n| self.by_number.get(&n).map(|h| h.inner().clone()))
            .collect();
        Ok(self.corrupt(reply))
    }

    async fn headers_by_hash(
        &mut self,
        start: B256,
        count: u64,
    ) -> Result<Vec<Header>, Self::Error> {
        self.misbehave().await;
        let Some(&top) = self.by_hash.get(&start) else {
            return Ok(vec![]);
        };
        let count = count.min(REPLY_CAP);
        let bottom = top.saturating_sub(count - 1).max(
            self.by_number.keys().next().copied().unwrap_or(0),
        );
        let reply = (bottom..=top)
            .rev()
            .map_while(|n| self.by_number.get(&n).map(|h| h.inner().clone()))
            .collect();
        Ok(self.corrupt(reply))
    }
}
