#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod config;
pub use config::{ChainConfig, CliqueConfig};

mod forks;
pub use forks::Fork;

mod forkid;
pub use forkid::{ForkId, ForkIdTable};

mod roots;
pub use roots::{
    accrued_logs_bloom, calculate_ommers_hash, calculate_receipts_root,
    calculate_transactions_root, ordered_trie_with_encoder,
};

/// A block body carrying standard Ethereum transaction envelopes.
pub type Body = alloy_consensus::BlockBody<alloy_consensus::TxEnvelope>;
