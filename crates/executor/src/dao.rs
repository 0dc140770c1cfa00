//! The DAO recovery hard-fork transition.

use crate::VmState;
use laurel_primitives::ChainConfig;
use tracing::{info, warn};

/// Drains every configured DAO account into the refund contract.
///
/// The account list and beneficiary travel with the chain config, the
/// way chain-spec documents carry `daoHardforkAccounts`. Called exactly
/// once, on the configured transition block of a supporting chain.
pub fn apply_dao_fork<V: VmState>(vm: &mut V, config: &ChainConfig) {
    let Some(beneficiary) = config.dao_fork_beneficiary else {
        warn!(target: "executor", "DAO transition block reached without a configured beneficiary");
        return;
    };
    for account in &config.dao_fork_accounts {
        vm.move_balance(*account, beneficiary);
    }
    info!(
        target: "executor",
        drained = config.dao_fork_accounts.len(),
        %beneficiary,
        "applied DAO hard-fork balance moves"
    );
}
