//! Ordered trie roots and bloom accumulation for block commitments.

use alloy_consensus::{Header, ReceiptEnvelope, TxEnvelope, TxReceipt};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{keccak256, Bloom, B256};
use alloy_rlp::{BufMut, Encodable};
use alloy_trie::{HashBuilder, Nibbles};

/// Computes the trie root of an ordered collection with a custom leaf
/// encoder.
///
/// Index keys are RLP-encoded with the usual reshuffle (index `0` encodes
/// after `0x01..0x7f`) so that leaves are inserted in nibble order.
pub fn ordered_trie_with_encoder<T, F>(items: &[T], mut encode: F) -> HashBuilder
where
    F: FnMut(&T, &mut dyn BufMut),
{
    let mut index_buffer = Vec::new();
    let mut value_buffer = Vec::new();
    let items_len = items.len();

    let mut hb = HashBuilder::default();
    for i in 0..items_len {
        let index = adjust_index_for_rlp(i, items_len);

        index_buffer.clear();
        index.encode(&mut index_buffer);

        value_buffer.clear();
        encode(&items[index], &mut value_buffer);

        hb.add_leaf(Nibbles::unpack(&index_buffer), &value_buffer);
    }

    hb
}

/// Adjust the index of an item for rlp encoding.
const fn adjust_index_for_rlp(i: usize, len: usize) -> usize {
    if i > 0x7f {
        i
    } else if i == 0x7f || i + 1 == len {
        0
    } else {
        i + 1
    }
}

/// The `transactionsRoot` commitment over a transaction list (EIP-2718
/// leaf encoding).
pub fn calculate_transactions_root(transactions: &[TxEnvelope]) -> B256 {
    ordered_trie_with_encoder(transactions, |tx, mut buf| tx.encode_2718(&mut buf)).root()
}

/// The `receiptsRoot` commitment over a receipt list.
pub fn calculate_receipts_root(receipts: &[ReceiptEnvelope]) -> B256 {
    ordered_trie_with_encoder(receipts, |receipt, mut buf| receipt.encode_2718(&mut buf)).root()
}

/// The `ommersHash` commitment: `keccak256(rlp(uncle_headers))`.
pub fn calculate_ommers_hash(ommers: &[Header]) -> B256 {
    let mut buf = Vec::new();
    alloy_rlp::encode_list(ommers, &mut buf);
    keccak256(buf)
}

/// The block `logsBloom`: the union of every receipt's bloom.
pub fn accrued_logs_bloom(receipts: &[ReceiptEnvelope]) -> Bloom {
    let mut bloom = Bloom::ZERO;
    for receipt in receipts {
        bloom.accrue_bloom(&receipt.bloom());
    }
    bloom
}
