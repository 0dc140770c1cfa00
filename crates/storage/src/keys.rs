//! The canonical key scheme.
//!
//! Every entity lives under a single-byte prefix followed by its hash or
//! big-endian block number. The Clique snapshot prefix is distinct from
//! the header/body/receipt prefixes so engine state never collides with
//! chain data.

use alloy_primitives::B256;

/// Prefix for header-by-hash records.
pub const HEADER_PREFIX: u8 = b'h';
/// Prefix for canonical number-to-hash records.
pub const CANONICAL_PREFIX: u8 = b'n';
/// Prefix for hash-to-number records.
pub const NUMBER_PREFIX: u8 = b'H';
/// Prefix for body-by-hash records.
pub const BODY_PREFIX: u8 = b'b';
/// Prefix for receipts-by-hash records.
pub const RECEIPTS_PREFIX: u8 = b'r';
/// Prefix for persisted Clique snapshots.
pub const CLIQUE_SNAPSHOT_PREFIX: u8 = b'S';

/// Key of the canonical head record.
pub const HEAD_KEY: &[u8] = b"LastBlock";

fn hash_key(prefix: u8, hash: B256) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(prefix);
    key.extend_from_slice(hash.as_slice());
    key
}

fn number_key(prefix: u8, number: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(prefix);
    key.extend_from_slice(&number.to_be_bytes());
    key
}

/// Key of the header stored under `hash`.
pub fn header_key(hash: B256) -> Vec<u8> {
    hash_key(HEADER_PREFIX, hash)
}

/// Key of the canonical hash record for `number`.
pub fn canonical_key(number: u64) -> Vec<u8> {
    number_key(CANONICAL_PREFIX, number)
}

/// Key of the block-number record for `hash`.
pub fn number_by_hash_key(hash: B256) -> Vec<u8> {
    hash_key(NUMBER_PREFIX, hash)
}

/// Key of the body stored under `hash`.
pub fn body_key(hash: B256) -> Vec<u8> {
    hash_key(BODY_PREFIX, hash)
}

/// Key of the receipt list stored under `hash`.
pub fn receipts_key(hash: B256) -> Vec<u8> {
    hash_key(RECEIPTS_PREFIX, hash)
}

/// Key of the Clique snapshot taken at the block with `hash`.
pub fn clique_snapshot_key(hash: B256) -> Vec<u8> {
    hash_key(CLIQUE_SNAPSHOT_PREFIX, hash)
}
