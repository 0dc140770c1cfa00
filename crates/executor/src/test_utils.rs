//! Test doubles for the VM seam.

use crate::{TransactionOutcome, VmState, VmStateFactory};
use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use laurel_primitives::Fork;
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

/// The error type of the test VM.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TestVmError {
    /// A scripted failure injected by a test.
    #[error("scripted vm failure: {0}")]
    Scripted(String),
}

/// A scriptable in-memory [VmState].
///
/// `persist` reports the seeded state root unless an override is set, so
/// an empty block leaves the root unchanged, exactly like a real empty
/// block over an untouched trie.
#[derive(Debug, Default)]
pub struct TestVm {
    balances: BTreeMap<Address, U256>,
    outcomes: VecDeque<TransactionOutcome>,
    state_root: B256,
    processed: usize,
    fail_persist: bool,
}

impl TestVm {
    /// A VM seeded at the given state root.
    pub fn at_root(state_root: B256) -> Self {
        Self { state_root, ..Default::default() }
    }

    /// Overrides the root `persist` reports.
    pub fn with_result_root(mut self, state_root: B256) -> Self {
        self.state_root = state_root;
        self
    }

    /// Queues a scripted outcome for the next transaction. Without a
    /// script, transactions succeed with 21 000 gas and no logs.
    pub fn script(&mut self, outcome: TransactionOutcome) {
        self.outcomes.push_back(outcome);
    }

    /// Makes `persist` fail.
    pub fn fail_persist(&mut self) {
        self.fail_persist = true;
    }

    /// The balance of `address`.
    pub fn balance(&self, address: Address) -> U256 {
        self.balances.get(&address).copied().unwrap_or_default()
    }

    /// Number of transactions processed so far.
    pub const fn processed(&self) -> usize {
        self.processed
    }
}

impl VmState for TestVm {
    type Error = TestVmError;

    fn process_transaction(
        &mut self,
        _tx: &TxEnvelope,
        _sender: Address,
        _fork: Fork,
    ) -> Result<TransactionOutcome, Self::Error> {
        self.processed += 1;
        Ok(self.outcomes.pop_front().unwrap_or(TransactionOutcome {
            success: true,
            gas_used: 21_000,
            logs: vec![],
            intermediate_root: None,
        }))
    }

    fn add_balance(&mut self, address: Address, amount: U256) {
        *self.balances.entry(address).or_default() += amount;
    }

    fn move_balance(&mut self, from: Address, to: Address) {
        let amount = self.balances.remove(&from).unwrap_or_default();
        *self.balances.entry(to).or_default() += amount;
    }

    fn persist(&mut self, _clear_cache: bool) -> Result<B256, Self::Error> {
        if self.fail_persist {
            return Err(TestVmError::Scripted("persist failed".into()));
        }
        Ok(self.state_root)
    }
}

/// A [VmStateFactory] handing out [TestVm]s, with optional per-block
/// result-root overrides keyed by the seed root.
#[derive(Debug, Default)]
pub struct TestVmFactory {
    overrides: BTreeMap<B256, B256>,
}

impl TestVmFactory {
    /// Makes the VM seeded at `seed` report `result` from `persist`,
    /// instead of echoing the seed.
    pub fn override_root(&mut self, seed: B256, result: B256) {
        self.overrides.insert(seed, result);
    }
}

impl VmStateFactory for TestVmFactory {
    type State = TestVm;

    fn state_at(&mut self, state_root: B256) -> Result<TestVm, TestVmError> {
        let result = self.overrides.get(&state_root).copied().unwrap_or(state_root);
        Ok(TestVm::at_root(state_root).with_result_root(result))
    }
}

/// A signed legacy value transfer from a deterministic key. Returns the
/// envelope and the sender address it recovers to.
pub fn signed_transfer(nonce: u64) -> (TxEnvelope, Address) {
    let mut seed = [0u8; 32];
    seed[31] = 0x53;
    let signer = PrivateKeySigner::from_bytes(&B256::new(seed)).expect("valid key");

    let tx = TxLegacy {
        chain_id: Some(1),
        nonce,
        gas_price: 1_000_000_000,
        gas_limit: 21_000,
        to: TxKind::Call(Address::repeat_byte(0x0d)),
        value: U256::from(1),
        input: Bytes::new(),
    };
    let signature = signer.sign_hash_sync(&tx.signature_hash()).expect("signing cannot fail");
    (TxEnvelope::Legacy(tx.into_signed(signature)), signer.address())
}
