//! Miner reward schedule for proof-of-work chains.

use crate::VmState;
use alloy_consensus::Header;
use alloy_primitives::U256;
use laurel_primitives::{Body, Fork};

const WEI_PER_ETHER: u64 = 1_000_000_000_000_000_000;

/// The base block reward under the given fork rules: 5 ETH up to
/// Byzantium, 3 ETH up to Constantinople, 2 ETH afterwards.
pub fn block_reward(fork: Fork) -> U256 {
    let ether = if fork >= Fork::Constantinople {
        2
    } else if fork >= Fork::Byzantium {
        3
    } else {
        5
    };
    U256::from(ether) * U256::from(WEI_PER_ETHER)
}

/// Credits the coinbase and uncle coinbases for one sealed block.
///
/// The coinbase earns the base reward plus `base/32` per included uncle;
/// each uncle's coinbase earns `base × (uncle_number + 8 − number) / 8`.
/// Proof-of-authority chains never call this.
pub fn apply_block_rewards<V: VmState>(vm: &mut V, fork: Fork, header: &Header, body: &Body) {
    let base = block_reward(fork);

    for uncle in &body.ommers {
        let depth_factor = (uncle.number + 8).saturating_sub(header.number);
        let uncle_reward = base * U256::from(depth_factor) / U256::from(8);
        vm.add_balance(uncle.beneficiary, uncle_reward);
    }

    let inclusion = base / U256::from(32) * U256::from(body.ommers.len());
    vm.add_balance(header.beneficiary, base + inclusion);
}
