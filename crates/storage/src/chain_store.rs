//! Typed persistence for headers, bodies and receipts.

use crate::{keys, KeyValueStore, ScopedTx, StoreError, StoreResult};
use alloy_consensus::{Header, ReceiptEnvelope, Sealed, TxEnvelope};
use alloy_eips::eip2718::{Decodable2718, Eip2718Error, Encodable2718};
use alloy_primitives::{Bytes, B256};
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable};
use laurel_primitives::Body;
use tracing::trace;

/// The stored form of a block body. Withdrawals never occur on the
/// pre-merge chains this client persists, so only transactions and
/// ommers are kept.
#[derive(Debug, RlpEncodable, RlpDecodable)]
struct StoredBody {
    transactions: Vec<TxEnvelope>,
    ommers: Vec<Header>,
}

/// Canonical chain persistence over any [KeyValueStore].
///
/// Headers are indexed both by hash and, through the canonical table, by
/// number. The head record is a `(number, hash)` pair maintained by the
/// importer; readers observe it only after the header behind it is on
/// disk.
#[derive(Debug)]
pub struct ChainStore<K> {
    kv: K,
}

impl<K: KeyValueStore> ChainStore<K> {
    /// Wraps a key-value backend.
    pub const fn new(kv: K) -> Self {
        Self { kv }
    }

    /// The underlying store.
    pub const fn kv(&self) -> &K {
        &self.kv
    }

    /// Mutable access to the underlying store.
    pub fn kv_mut(&mut self) -> &mut K {
        &mut self.kv
    }

    /// Consumes the wrapper, returning the backend.
    pub fn into_inner(self) -> K {
        self.kv
    }

    /// Opens a nested transaction on the backend.
    pub fn begin(&mut self) -> StoreResult<()> {
        self.kv.begin()
    }

    /// Folds the topmost transaction into its parent.
    pub fn commit(&mut self, apply_deletes: bool) -> StoreResult<()> {
        self.kv.commit(apply_deletes)
    }

    /// Discards the topmost transaction.
    pub fn dispose(&mut self) -> StoreResult<()> {
        self.kv.dispose()
    }

    /// Persists a sealed header under its hash and number indexes.
    ///
    /// The canonical number→hash record is written as well; callers that
    /// persist a non-canonical header do not exist in this client.
    pub fn put_header(&mut self, header: &Sealed<Header>) -> StoreResult<()> {
        let hash = header.seal();
        self.kv.put(keys::header_key(hash), alloy_rlp::encode(header.inner()))?;
        self.kv.put(keys::number_by_hash_key(hash), header.number.to_be_bytes().to_vec())?;
        self.kv.put(keys::canonical_key(header.number), hash.as_slice().to_vec())?;
        Ok(())
    }

    /// Reads the header stored under `hash`.
    pub fn header_by_hash(&self, hash: B256) -> StoreResult<Option<Header>> {
        let Some(raw) = self.kv.get(&keys::header_key(hash))? else {
            return Ok(None);
        };
        Ok(Some(Header::decode(&mut raw.as_slice())?))
    }

    /// Reads the canonical header at `number`.
    pub fn header_by_number(&self, number: u64) -> StoreResult<Option<Header>> {
        match self.canonical_hash(number)? {
            Some(hash) => self.header_by_hash(hash),
            None => Ok(None),
        }
    }

    /// The canonical hash at `number`, if that height is persisted.
    pub fn canonical_hash(&self, number: u64) -> StoreResult<Option<B256>> {
        let Some(raw) = self.kv.get(&keys::canonical_key(number))? else {
            return Ok(None);
        };
        if raw.len() != 32 {
            return Err(StoreError::Io(format!("canonical record has {} bytes", raw.len())));
        }
        Ok(Some(B256::from_slice(&raw)))
    }

    /// The block number recorded for `hash`.
    pub fn number_by_hash(&self, hash: B256) -> StoreResult<Option<u64>> {
        let Some(raw) = self.kv.get(&keys::number_by_hash_key(hash))? else {
            return Ok(None);
        };
        let bytes: [u8; 8] =
            raw.as_slice().try_into().map_err(|_| StoreError::Io("bad number record".into()))?;
        Ok(Some(u64::from_be_bytes(bytes)))
    }

    /// Persists a block body under the block hash.
    pub fn put_body(&mut self, hash: B256, body: &Body) -> StoreResult<()> {
        let stored = StoredBody {
            transactions: body.transactions.clone(),
            ommers: body.ommers.clone(),
        };
        self.kv.put(keys::body_key(hash), alloy_rlp::encode(&stored))
    }

    /// Reads the body stored under `hash`.
    pub fn body_by_hash(&self, hash: B256) -> StoreResult<Option<Body>> {
        let Some(raw) = self.kv.get(&keys::body_key(hash))? else {
            return Ok(None);
        };
        let stored = StoredBody::decode(&mut raw.as_slice())?;
        Ok(Some(Body {
            transactions: stored.transactions,
            ommers: stored.ommers,
            withdrawals: None,
        }))
    }

    /// Persists a receipt list (EIP-2718 leaf encoding) under the block
    /// hash.
    pub fn put_receipts(&mut self, hash: B256, receipts: &[ReceiptEnvelope]) -> StoreResult<()> {
        let blobs: Vec<Bytes> = receipts.iter().map(|r| r.encoded_2718().into()).collect();
        self.kv.put(keys::receipts_key(hash), alloy_rlp::encode(&blobs))
    }

    /// Reads the receipt list stored under `hash`.
    pub fn receipts_by_hash(&self, hash: B256) -> StoreResult<Option<Vec<ReceiptEnvelope>>> {
        let Some(raw) = self.kv.get(&keys::receipts_key(hash))? else {
            return Ok(None);
        };
        let blobs = Vec::<Bytes>::decode(&mut raw.as_slice())?;
        blobs
            .iter()
            .map(|blob| {
                ReceiptEnvelope::decode_2718(&mut blob.as_ref()).map_err(|e| match e {
                    Eip2718Error::RlpError(inner) => StoreError::Rlp(inner),
                    _ => StoreError::Rlp(alloy_rlp::Error::Custom("unknown receipt type")),
                })
            })
            .collect::<StoreResult<Vec<_>>>()
            .map(Some)
    }

    /// The canonical head as a `(number, hash)` pair.
    pub fn head(&self) -> StoreResult<Option<(u64, B256)>> {
        let Some(raw) = self.kv.get(keys::HEAD_KEY)? else {
            return Ok(None);
        };
        if raw.len() != 40 {
            return Err(StoreError::Io("bad head record".into()));
        }
        let number = u64::from_be_bytes(raw[..8].try_into().expect("checked length"));
        Ok(Some((number, B256::from_slice(&raw[8..]))))
    }

    /// Updates the canonical head record.
    pub fn set_head(&mut self, number: u64, hash: B256) -> StoreResult<()> {
        let mut raw = Vec::with_capacity(40);
        raw.extend_from_slice(&number.to_be_bytes());
        raw.extend_from_slice(hash.as_slice());
        self.kv.put(keys::HEAD_KEY.to_vec(), raw)
    }

    /// The genesis hash, when block zero is persisted.
    pub fn genesis_hash(&self) -> StoreResult<Option<B256>> {
        self.canonical_hash(0)
    }

    /// Writes a run of headers in one short auto-commit transaction.
    ///
    /// This is the syncer's stash path: header chunks that linked up with
    /// the right side of the layout are persisted without touching the
    /// head record.
    pub fn stash_headers(&mut self, headers: &[Sealed<Header>]) -> StoreResult<()> {
        if headers.is_empty() {
            return Ok(());
        }
        let mut tx = ScopedTx::begin(&mut self.kv)?;
        for header in headers {
            let hash = header.seal();
            tx.kv().put(keys::header_key(hash), alloy_rlp::encode(header.inner()))?;
            tx.kv().put(keys::number_by_hash_key(hash), header.number.to_be_bytes().to_vec())?;
            tx.kv().put(keys::canonical_key(header.number), hash.as_slice().to_vec())?;
        }
        trace!(
            target: "storage",
            count = headers.len(),
            from = headers.first().map(|h| h.number),
            "stashed headers"
        );
        tx.commit(true)
    }
}
