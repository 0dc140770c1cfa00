#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod errors;
pub use errors::{ChainError, ChainResult};

mod validation;
pub use validation::{expected_base_fee, validate_kinship, KinshipError};

mod import;
pub use import::{Chain, ExtraValidation};
