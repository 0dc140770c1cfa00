//! Test helpers: deterministic signer keys and header sealing.

use crate::constants::{DIFF_IN_TURN, DIFF_NO_TURN, EXTRA_VANITY};
use alloy_consensus::{Header, Sealable, Sealed, EMPTY_OMMER_ROOT_HASH};
use alloy_primitives::{keccak256, Address, Bytes, B256, B64};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;

/// A deterministic set of signer keys, ordered by address the way a
/// Clique snapshot orders its authorized set: `address(i)` is the i-th
/// address of the sorted set and `seal(i, ..)` signs with its key.
#[derive(Debug)]
pub struct TestSigners {
    keys: Vec<PrivateKeySigner>,
}

impl TestSigners {
    /// Derives `count` keys from fixed seeds and sorts them by address.
    pub fn new(count: usize) -> Self {
        let mut keys: Vec<PrivateKeySigner> = (0..count)
            .map(|i| {
                let mut seed = [0u8; 32];
                seed[31] = i as u8 + 1;
                PrivateKeySigner::from_bytes(&B256::new(seed)).expect("fixed seed is a valid key")
            })
            .collect();
        keys.sort_by_key(|k| k.address());
        Self { keys }
    }

    /// Number of signers in the set.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// The i-th address in sorted order.
    pub fn address(&self, index: usize) -> Address {
        self.keys[index].address()
    }

    /// All addresses in sorted order.
    pub fn addresses(&self) -> Vec<Address> {
        self.keys.iter().map(|k| k.address()).collect()
    }

    /// Seals `header` with the i-th signer's key, appending the 65-byte
    /// seal to the existing extra-data.
    pub fn seal(&self, index: usize, mut header: Header) -> Sealed<Header> {
        let digest = keccak256(alloy_rlp::encode(&header));
        let signature =
            self.keys[index].sign_hash_sync(&digest).expect("in-memory signing cannot fail");

        let mut extra = header.extra_data.to_vec();
        extra.extend_from_slice(&signature.r().to_be_bytes::<32>());
        extra.extend_from_slice(&signature.s().to_be_bytes::<32>());
        extra.push(signature.v().y_parity_byte());
        header.extra_data = Bytes::from(extra);
        header.seal_slow()
    }
}

/// An unsealed Clique header casting a vote: vanity-only extra-data, the
/// given beneficiary/nonce pair, and in- or out-of-turn difficulty.
pub fn vote_header(
    number: u64,
    parent_hash: B256,
    beneficiary: Address,
    nonce: B64,
    in_turn: bool,
) -> Header {
    Header {
        parent_hash,
        ommers_hash: EMPTY_OMMER_ROOT_HASH,
        beneficiary,
        number,
        nonce,
        difficulty: if in_turn { DIFF_IN_TURN } else { DIFF_NO_TURN },
        gas_limit: 8_000_000,
        timestamp: number * 15,
        mix_hash: B256::ZERO,
        extra_data: Bytes::from(vec![0u8; EXTRA_VANITY]),
        ..Default::default()
    }
}

/// An unsealed checkpoint header publishing the full signer list in its
/// extra-data.
pub fn checkpoint_header(signers: &TestSigners, number: u64, parent_hash: B256) -> Header {
    let mut extra = vec![0u8; EXTRA_VANITY];
    for address in signers.addresses() {
        extra.extend_from_slice(address.as_slice());
    }
    Header {
        parent_hash,
        ommers_hash: EMPTY_OMMER_ROOT_HASH,
        beneficiary: Address::ZERO,
        number,
        nonce: crate::constants::NONCE_DROP,
        difficulty: DIFF_IN_TURN,
        gas_limit: 8_000_000,
        timestamp: number * 15,
        mix_hash: B256::ZERO,
        extra_data: Bytes::from(extra),
        ..Default::default()
    }
}
