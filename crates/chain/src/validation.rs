//! Kinship validation: rules tying a header to its parent.

use alloy_consensus::Header;
use alloy_eips::eip1559::{BaseFeeParams, INITIAL_BASE_FEE};
use laurel_primitives::ChainConfig;
use thiserror::Error;

/// Minimum gas limit any header may carry.
const MIN_GAS_LIMIT: u64 = 5_000;

/// Maximum extra-data size outside proof-of-authority chains.
const MAX_EXTRA_DATA: usize = 32;

/// A header/parent relationship violation.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum KinshipError {
    /// The block number does not follow the parent's.
    #[error("non-sequential block number: parent {parent}, got {got}")]
    NonSequentialNumber {
        /// Parent block number.
        parent: u64,
        /// Offending block number.
        got: u64,
    },
    /// The parent hash does not match the parent's actual hash.
    #[error("parent hash mismatch: expected {expected}, got {got}")]
    ParentHash {
        /// Hash of the actual parent.
        expected: alloy_primitives::B256,
        /// Hash the header claims.
        got: alloy_primitives::B256,
    },
    /// The timestamp does not advance past the parent's.
    #[error("timestamp {got} not after parent timestamp {parent}")]
    TimestampNotIncreasing {
        /// Parent timestamp.
        parent: u64,
        /// Offending timestamp.
        got: u64,
    },
    /// More gas used than the block's own limit.
    #[error("gas used {used} exceeds gas limit {limit}")]
    GasUsedExceedsLimit {
        /// Gas used.
        used: u64,
        /// Gas limit.
        limit: u64,
    },
    /// The gas limit moved more than 1/1024 from the parent's.
    #[error("gas limit {got} out of bounds relative to parent {parent}")]
    GasLimitOutOfBounds {
        /// Parent gas limit (elasticity-adjusted on the London block).
        parent: u64,
        /// Offending gas limit.
        got: u64,
    },
    /// The gas limit fell below the protocol floor.
    #[error("gas limit {0} below minimum")]
    GasLimitBelowFloor(u64),
    /// Extra-data too long for a proof-of-work chain.
    #[error("extra data of {0} bytes exceeds the 32 byte cap")]
    ExtraDataTooLong(usize),
    /// Zero difficulty outside proof-of-authority.
    #[error("zero difficulty")]
    ZeroDifficulty,
    /// The base fee does not follow the EIP-1559 recurrence.
    #[error("base fee mismatch: expected {expected:?}, got {got:?}")]
    BaseFee {
        /// Base fee the recurrence demands (`None` before London).
        expected: Option<u64>,
        /// Base fee the header carries.
        got: Option<u64>,
    },
}

/// The base fee the EIP-1559 recurrence demands of the block following
/// `parent`. `None` before London activation.
pub fn expected_base_fee(config: &ChainConfig, parent: &Header, number: u64) -> Option<u64> {
    if !config.is_london_active(number) {
        return None;
    }
    if config.london_block == Some(number) {
        // The fork block starts the fee market at its initial value.
        return Some(INITIAL_BASE_FEE);
    }
    Some(BaseFeeParams::ethereum().next_block_base_fee(
        parent.gas_used,
        parent.gas_limit,
        parent.base_fee_per_gas.unwrap_or(INITIAL_BASE_FEE),
    ))
}

/// Validates the rules tying `header` to `parent`: numbering, hash link,
/// timestamps, gas limits and the base-fee recurrence. Difficulty policy
/// on authority chains belongs to the engine; here only the
/// proof-of-work non-zero rule applies.
pub fn validate_kinship(
    config: &ChainConfig,
    parent: &Header,
    parent_hash: alloy_primitives::B256,
    header: &Header,
) -> Result<(), KinshipError> {
    if header.number != parent.number + 1 {
        return Err(KinshipError::NonSequentialNumber {
            parent: parent.number,
            got: header.number,
        });
    }
    if header.parent_hash != parent_hash {
        return Err(KinshipError::ParentHash {
            expected: parent_hash,
            got: header.parent_hash,
        });
    }
    if header.timestamp <= parent.timestamp {
        return Err(KinshipError::TimestampNotIncreasing {
            parent: parent.timestamp,
            got: header.timestamp,
        });
    }

    if header.gas_used > header.gas_limit {
        return Err(KinshipError::GasUsedExceedsLimit {
            used: header.gas_used,
            limit: header.gas_limit,
        });
    }
    if header.gas_limit < MIN_GAS_LIMIT {
        return Err(KinshipError::GasLimitBelowFloor(header.gas_limit));
    }

    // On the London block the elasticity multiplier doubles the limit the
    // delta rule compares against.
    let parent_gas_limit = if config.london_block == Some(header.number) {
        parent.gas_limit * BaseFeeParams::ethereum().elasticity_multiplier as u64
    } else {
        parent.gas_limit
    };
    let diff = header.gas_limit.abs_diff(parent_gas_limit);
    if diff >= parent_gas_limit / 1024 {
        return Err(KinshipError::GasLimitOutOfBounds {
            parent: parent_gas_limit,
            got: header.gas_limit,
        });
    }

    if !config.is_poa() {
        if header.extra_data.len() > MAX_EXTRA_DATA {
            return Err(KinshipError::ExtraDataTooLong(header.extra_data.len()));
        }
        if config.merge_netsplit_block.map_or(true, |b| header.number < b) &&
            header.difficulty.is_zero()
        {
            return Err(KinshipError::ZeroDifficulty);
        }
    }

    let expected = expected_base_fee(config, parent, header.number);
    if expected != header.base_fee_per_gas {
        return Err(KinshipError::BaseFee { expected, got: header.base_fee_per_gas });
    }

    Ok(())
}
