//! Chain configuration: fork transition heights and consensus engine
//! parameters.

use crate::Fork;
use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

/// Clique proof-of-authority engine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CliqueConfig {
    /// Minimum number of seconds between consecutive blocks.
    pub period: u64,
    /// Number of blocks between vote resets and checkpoint headers.
    pub epoch: u64,
}

impl Default for CliqueConfig {
    fn default() -> Self {
        Self { period: 15, epoch: 30_000 }
    }
}

/// The immutable per-chain configuration.
///
/// Field names serialize in the geth genesis-config style, so a
/// `chainId`/`homesteadBlock`/… JSON document deserializes directly. A
/// `None` transition height means the fork never activates on this chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChainConfig {
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Homestead transition height.
    pub homestead_block: Option<u64>,
    /// DAO hard-fork height.
    pub dao_fork_block: Option<u64>,
    /// Whether this chain followed the DAO recovery fork. When false the
    /// DAO height is ignored entirely; there is no clamping to Homestead.
    pub dao_fork_support: bool,
    /// Account credited with the drained balances at the DAO transition.
    pub dao_fork_beneficiary: Option<Address>,
    /// Accounts drained at the DAO transition. Supplied by the genesis
    /// config document, the way OpenEthereum chain specs carry
    /// `daoHardforkAccounts`.
    pub dao_fork_accounts: Vec<Address>,
    /// EIP-150 transition height.
    pub eip150_block: Option<u64>,
    /// EIP-155/EIP-158 transition height.
    pub eip158_block: Option<u64>,
    /// Byzantium transition height.
    pub byzantium_block: Option<u64>,
    /// Constantinople transition height.
    pub constantinople_block: Option<u64>,
    /// Petersburg transition height.
    pub petersburg_block: Option<u64>,
    /// Istanbul transition height.
    pub istanbul_block: Option<u64>,
    /// Muir Glacier transition height.
    pub muir_glacier_block: Option<u64>,
    /// Berlin transition height.
    pub berlin_block: Option<u64>,
    /// London transition height.
    pub london_block: Option<u64>,
    /// Arrow Glacier transition height.
    pub arrow_glacier_block: Option<u64>,
    /// Gray Glacier transition height.
    pub gray_glacier_block: Option<u64>,
    /// The merge netsplit height. When set and reached, [Fork::Merge]
    /// overrides every other tag.
    pub merge_netsplit_block: Option<u64>,
    /// Clique engine parameters; present iff the chain is proof-of-authority.
    pub clique: Option<CliqueConfig>,
}

impl ChainConfig {
    /// Whether this chain runs the Clique proof-of-authority engine.
    pub const fn is_poa(&self) -> bool {
        self.clique.is_some()
    }

    /// The Clique epoch length, defaulting when the engine section omits it.
    pub fn epoch_length(&self) -> u64 {
        self.clique.map(|c| c.epoch).unwrap_or(30_000)
    }

    /// Resolves the active [Fork] at the given block height.
    ///
    /// Total function: walks the transition table newest-first and falls
    /// back to [Fork::Frontier].
    pub fn fork_at(&self, number: u64) -> Fork {
        let reached = |block: Option<u64>| block.is_some_and(|b| number >= b);

        if reached(self.merge_netsplit_block) {
            return Fork::Merge;
        }
        if reached(self.gray_glacier_block) {
            return Fork::GrayGlacier;
        }
        if reached(self.arrow_glacier_block) {
            return Fork::ArrowGlacier;
        }
        if reached(self.london_block) {
            return Fork::London;
        }
        if reached(self.berlin_block) {
            return Fork::Berlin;
        }
        if reached(self.muir_glacier_block) {
            return Fork::MuirGlacier;
        }
        if reached(self.istanbul_block) {
            return Fork::Istanbul;
        }
        if reached(self.petersburg_block) {
            return Fork::Petersburg;
        }
        if reached(self.constantinople_block) {
            return Fork::Constantinople;
        }
        if reached(self.byzantium_block) {
            return Fork::Byzantium;
        }
        if reached(self.eip158_block) {
            return Fork::Spurious;
        }
        if reached(self.eip150_block) {
            return Fork::Tangerine;
        }
        if self.dao_fork_support && reached(self.dao_fork_block) {
            return Fork::Dao;
        }
        if reached(self.homestead_block) {
            return Fork::Homestead;
        }
        Fork::Frontier
    }

    /// Whether London (EIP-1559) rules are active at the given height.
    pub fn is_london_active(&self, number: u64) -> bool {
        self.london_block.is_some_and(|b| number >= b)
    }

    /// Whether the given height is the DAO transition block on a chain
    /// that supports the recovery fork.
    pub fn is_dao_transition(&self, number: u64) -> bool {
        self.dao_fork_support && self.dao_fork_block == Some(number)
    }

    /// All configured fork transition heights in schedule order.
    ///
    /// The DAO height participates only when [`Self::dao_fork_support`] is
    /// set. Heights are *not* deduplicated here; the fork-id table takes
    /// care of collapsing identical transitions.
    pub fn fork_transitions(&self) -> Vec<u64> {
        let dao = self.dao_fork_support.then_some(self.dao_fork_block).flatten();
        [
            self.homestead_block,
            dao,
            self.eip150_block,
            self.eip158_block,
            self.byzantium_block,
            self.constantinople_block,
            self.petersburg_block,
            self.istanbul_block,
            self.muir_glacier_block,
            self.berlin_block,
            self.london_block,
            self.arrow_glacier_block,
            self.gray_glacier_block,
            self.merge_netsplit_block,
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// The Ethereum mainnet configuration.
    pub const fn mainnet() -> Self {
        Self {
            chain_id: 1,
            homestead_block: Some(1_150_000),
            dao_fork_block: Some(1_920_000),
            dao_fork_support: true,
            dao_fork_beneficiary: Some(address!("bf4ed7b27f1d666546e30d74d50d173d20bca754")),
            dao_fork_accounts: Vec::new(),
            eip150_block: Some(2_463_000),
            eip158_block: Some(2_675_000),
            byzantium_block: Some(4_370_000),
            constantinople_block: Some(7_280_000),
            petersburg_block: Some(7_280_000),
            istanbul_block: Some(9_069_000),
            muir_glacier_block: Some(9_200_000),
            berlin_block: Some(12_244_000),
            london_block: Some(12_965_000),
            arrow_glacier_block: Some(13_773_000),
            gray_glacier_block: Some(15_050_000),
            merge_netsplit_block: None,
            clique: None,
        }
    }

    /// The Goerli proof-of-authority testnet configuration.
    pub const fn goerli() -> Self {
        Self {
            chain_id: 5,
            homestead_block: Some(0),
            dao_fork_block: None,
            dao_fork_support: true,
            dao_fork_beneficiary: None,
            dao_fork_accounts: Vec::new(),
            eip150_block: Some(0),
            eip158_block: Some(0),
            byzantium_block: Some(0),
            constantinople_block: Some(0),
            petersburg_block: Some(0),
            istanbul_block: Some(1_561_651),
            muir_glacier_block: None,
            berlin_block: Some(4_460_644),
            london_block: Some(5_062_605),
            arrow_glacier_block: None,
            gray_glacier_block: None,
            merge_netsplit_block: None,
            clique: Some(CliqueConfig { period: 15, epoch: 30_000 }),
        }
    }
}
