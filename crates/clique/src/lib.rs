#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod constants;

mod errors;
pub use errors::{CliqueError, CliqueResult};

mod recovery;
pub use recovery::{recover_seal_signer, seal_hash, SignerCache};

mod snapshot;
pub use snapshot::{Snapshot, Tally, Vote};

mod engine;
pub use engine::{CliqueEngine, EngineStore};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
