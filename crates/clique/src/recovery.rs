//! Seal signer recovery.
//!
//! A Clique seal is the trailing 65 bytes of the header extra-data:
//! `r (32) ‖ s (32) ‖ y-parity (1)`. The signed digest is the Keccak-256
//! hash of the RLP encoding of the header with those 65 bytes stripped.

use crate::{
    constants::{EXTRA_SEAL, INMEMORY_SIGNATURES},
    CliqueError, CliqueResult,
};
use alloy_consensus::{Header, Sealed};
use alloy_primitives::{keccak256, Address, Bytes, Signature, B256};
use lru::LruCache;
use std::num::NonZeroUsize;

/// The digest a Clique signer commits to: the header hashed with the seal
/// suffix removed from its extra-data.
pub fn seal_hash(header: &Header) -> CliqueResult<B256> {
    let extra = &header.extra_data;
    if extra.len() < EXTRA_SEAL {
        return Err(CliqueError::MissingSignature);
    }
    let mut stripped = header.clone();
    stripped.extra_data = Bytes::copy_from_slice(&extra[..extra.len() - EXTRA_SEAL]);
    Ok(keccak256(alloy_rlp::encode(&stripped)))
}

/// Recovers the address that sealed `header` from its extra-data seal.
pub fn recover_seal_signer(header: &Header) -> CliqueResult<Address> {
    let extra = &header.extra_data;
    if extra.len() < EXTRA_SEAL {
        return Err(CliqueError::MissingSignature);
    }
    let seal = &extra[extra.len() - EXTRA_SEAL..];
    if seal[64] > 1 {
        return Err(CliqueError::InvalidSeal);
    }

    let signature = Signature::from_bytes_and_parity(&seal[..64], seal[64] == 1)
        .map_err(|_| CliqueError::InvalidSeal)?;
    let digest = seal_hash(header)?;
    signature.recover_address_from_prehash(&digest).map_err(|_| CliqueError::InvalidSeal)
}

/// An LRU of recovered seal signers keyed by header hash.
///
/// Seal recovery runs secp256k1 point recovery, so every consumer that
/// touches the same headers repeatedly (snapshot application, seal
/// verification) shares one of these.
#[derive(Debug)]
pub struct SignerCache {
    cache: LruCache<B256, Address>,
}

impl Default for SignerCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SignerCache {
    /// Creates a cache sized at [INMEMORY_SIGNATURES].
    pub fn new() -> Self {
        Self { cache: LruCache::new(NonZeroUsize::new(INMEMORY_SIGNATURES).unwrap()) }
    }

    /// The signer of a sealed header, recovering and caching on miss.
    pub fn signer(&mut self, header: &Sealed<Header>) -> CliqueResult<Address> {
        let hash = header.seal();
        if let Some(signer) = self.cache.get(&hash) {
            return Ok(*signer);
        }
        let signer = recover_seal_signer(header)?;
        self.cache.put(hash, signer);
        Ok(signer)
    }

    /// The number of cached entries.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
