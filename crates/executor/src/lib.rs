#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod errors;
pub use errors::{ExecutorError, ExecutorResult, ValidationError};

mod vm;
pub use vm::{TransactionOutcome, VmState, VmStateFactory};

mod dao;
pub use dao::apply_dao_fork;

mod rewards;
pub use rewards::{apply_block_rewards, block_reward};

mod process;
pub use process::BlockProcessor;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
