//! The seam between the executor and the EVM subsystem.
//!
//! Transaction semantics (interpreter, fee charging, EIP-158/161 state
//! clearing, self-destructs, witness collection) belong to the VM; the
//! executor only sequences calls and checks the results against the
//! header.

use alloy_consensus::TxEnvelope;
use alloy_primitives::{Address, Log, B256, U256};
use laurel_primitives::Fork;

/// What the VM reports back for one applied transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    /// Whether execution succeeded (EIP-658 status).
    pub success: bool,
    /// Gas consumed by this transaction alone.
    pub gas_used: u64,
    /// Logs emitted during execution.
    pub logs: Vec<Log>,
    /// The intermediate state root after this transaction. Required for
    /// pre-Byzantium receipts; `None` from Byzantium onward.
    pub intermediate_root: Option<B256>,
}

/// A mutable world-state under execution.
pub trait VmState {
    /// The VM's own error type.
    type Error: core::error::Error + Send + Sync + 'static;

    /// Applies one transaction from `sender` under the given fork rules.
    fn process_transaction(
        &mut self,
        tx: &TxEnvelope,
        sender: Address,
        fork: Fork,
    ) -> Result<TransactionOutcome, Self::Error>;

    /// Credits `amount` wei to `address`, creating the account if needed.
    fn add_balance(&mut self, address: Address, amount: U256);

    /// Moves the entire balance of `from` to `to`.
    fn move_balance(&mut self, from: Address, to: Address);

    /// Flushes accumulated changes to the backing trie and returns the
    /// resulting state root. `clear_cache` drops the VM's internal
    /// account cache after the flush.
    fn persist(&mut self, clear_cache: bool) -> Result<B256, Self::Error>;
}

/// Builds a [VmState] seeded at a given state root, one per block.
pub trait VmStateFactory {
    /// The state type produced.
    type State: VmState;

    /// A fresh state rooted at `state_root`.
    fn state_at(
        &mut self,
        state_root: B256,
    ) -> Result<Self::State, <Self::State as VmState>::Error>;
}
