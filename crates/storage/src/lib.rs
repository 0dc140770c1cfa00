#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod errors;
pub use errors::{StoreError, StoreResult};

mod kv;
pub use kv::{KeyValueStore, ScopedTx};

mod mem;
pub use mem::MemoryStore;

pub mod keys;

mod chain_store;
pub use chain_store::ChainStore;
