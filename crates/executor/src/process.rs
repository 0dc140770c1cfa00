//! Deterministic application of `(header, body)` pairs.

use crate::{
    apply_block_rewards, apply_dao_fork, ExecutorError, ExecutorResult, TransactionOutcome,
    ValidationError, VmState,
};
use alloy_consensus::{
    Eip658Value, Header, Receipt, ReceiptEnvelope, ReceiptWithBloom, Sealed, TxEnvelope, TxType,
    EMPTY_OMMER_ROOT_HASH, EMPTY_ROOT_HASH,
};
use alloy_primitives::{Address, Log};
use laurel_clique::CliqueEngine;
use laurel_primitives::{
    accrued_logs_bloom, calculate_ommers_hash, calculate_receipts_root,
    calculate_transactions_root, Body, ChainConfig, Fork,
};
use laurel_storage::{ChainStore, KeyValueStore};
use tracing::{debug, warn};

/// The block processor: applies a block's transactions against a VM
/// state and verifies every commitment the header makes.
///
/// Idempotent given identical inputs; all persistence happens inside one
/// nested KV transaction that is disposed on any mismatch.
#[derive(Debug)]
pub struct BlockProcessor<'a> {
    config: &'a ChainConfig,
    clear_cache: bool,
}

impl<'a> BlockProcessor<'a> {
    /// Creates a processor for the given chain config.
    pub const fn new(config: &'a ChainConfig) -> Self {
        Self { config, clear_cache: false }
    }

    /// Makes [VmState::persist] drop the VM's account cache per block.
    pub const fn with_clear_cache(mut self, clear_cache: bool) -> Self {
        self.clear_cache = clear_cache;
        self
    }

    /// Processes one block inside a nested KV transaction, committing
    /// with `apply_deletes = false` on success and disposing on any
    /// failure. Returns the assembled receipts.
    pub fn process_block<K, V>(
        &self,
        store: &mut ChainStore<K>,
        clique: Option<&mut CliqueEngine>,
        vm: &mut V,
        header: &Sealed<Header>,
        body: &Body,
    ) -> ExecutorResult<Vec<ReceiptEnvelope>>
    where
        K: KeyValueStore,
        V: VmState,
    {
        store.begin()?;
        match self.execute(store, clique, vm, header, body) {
            Ok(receipts) => {
                store.commit(false)?;
                Ok(receipts)
            }
            Err(e) => {
                warn!(target: "executor", block = header.number, %e, "block execution failed");
                store.dispose()?;
                Err(e)
            }
        }
    }

    fn execute<K, V>(
        &self,
        store: &mut ChainStore<K>,
        clique: Option<&mut CliqueEngine>,
        vm: &mut V,
        header: &Sealed<Header>,
        body: &Body,
    ) -> ExecutorResult<Vec<ReceiptEnvelope>>
    where
        K: KeyValueStore,
        V: VmState,
    {
        if self.config.is_dao_transition(header.number) {
            apply_dao_fork(vm, self.config);
        }

        // The body must match the header's transaction commitment before
        // anything runs.
        if header.transactions_root == EMPTY_ROOT_HASH {
            if !body.transactions.is_empty() {
                return Err(ValidationError::UnexpectedTransactions.into());
            }
        } else {
            let got = calculate_transactions_root(&body.transactions);
            if got != header.transactions_root {
                return Err(ValidationError::TransactionsRoot {
                    expected: header.transactions_root,
                    got,
                }
                .into());
            }
        }

        let fork = self.config.fork_at(header.number);
        debug!(
            target: "executor",
            block = header.number,
            %fork,
            tx_count = body.transactions.len(),
            "executing block"
        );

        let mut cumulative_gas_used = 0u64;
        let mut receipts = Vec::with_capacity(body.transactions.len());
        for tx in &body.transactions {
            let sender = recover_sender(tx)?;
            let outcome = vm
                .process_transaction(tx, sender, fork)
                .map_err(|e| ExecutorError::Vm(e.to_string()))?;
            cumulative_gas_used += outcome.gas_used;
            receipts.push(build_receipt(tx.tx_type(), fork, cumulative_gas_used, outcome)?);
        }

        if cumulative_gas_used != header.gas_used {
            return Err(ValidationError::GasUsed {
                expected: header.gas_used,
                got: cumulative_gas_used,
            }
            .into());
        }

        let ommers_hash = calculate_ommers_hash(&body.ommers);
        if ommers_hash != header.ommers_hash {
            return Err(ValidationError::OmmersHash {
                expected: header.ommers_hash,
                got: ommers_hash,
            }
            .into());
        }
        if header.ommers_hash != EMPTY_OMMER_ROOT_HASH {
            // Uncle headers are chain data; keep them with the block.
            store.put_body(header.seal(), body)?;
        }

        if self.config.is_poa() {
            // Authority chains pay no block reward; the engine advances
            // its authorization state instead.
            if let Some(engine) = clique {
                engine.advance(store, header)?;
            }
        } else {
            apply_block_rewards(vm, fork, header, body);
        }

        let state_root =
            vm.persist(self.clear_cache).map_err(|e| ExecutorError::Vm(e.to_string()))?;
        if state_root != header.state_root {
            return Err(ValidationError::StateRoot {
                expected: header.state_root,
                got: state_root,
            }
            .into());
        }

        let receipts_root = calculate_receipts_root(&receipts);
        if receipts_root != header.receipts_root {
            return Err(ValidationError::ReceiptsRoot {
                expected: header.receipts_root,
                got: receipts_root,
            }
            .into());
        }
        let bloom = accrued_logs_bloom(&receipts);
        if bloom != header.logs_bloom {
            return Err(ValidationError::LogsBloom {
                expected: Box::new(header.logs_bloom),
                got: Box::new(bloom),
            }
            .into());
        }

        Ok(receipts)
    }
}

/// Recovers the sending address of a transaction envelope.
fn recover_sender(tx: &TxEnvelope) -> ExecutorResult<Address> {
    let recovered = match tx {
        TxEnvelope::Legacy(signed) => signed.recover_signer(),
        TxEnvelope::Eip2930(signed) => signed.recover_signer(),
        TxEnvelope::Eip1559(signed) => signed.recover_signer(),
        TxEnvelope::Eip4844(signed) => signed.recover_signer(),
        TxEnvelope::Eip7702(signed) => signed.recover_signer(),
        _ => return Err(ExecutorError::UnsupportedTransaction),
    };
    recovered.map_err(|e| ExecutorError::Signature(e.to_string()))
}

/// Assembles a typed receipt envelope for one executed transaction.
///
/// Post-Byzantium receipts carry the EIP-658 status; earlier forks embed
/// the intermediate state root the VM reported.
fn build_receipt(
    tx_type: TxType,
    fork: Fork,
    cumulative_gas_used: u64,
    outcome: TransactionOutcome,
) -> ExecutorResult<ReceiptEnvelope> {
    let status = if fork >= Fork::Byzantium {
        Eip658Value::Eip658(outcome.success)
    } else {
        Eip658Value::PostState(
            outcome.intermediate_root.ok_or(ExecutorError::MissingIntermediateRoot)?,
        )
    };
    Ok(receipt_envelope(tx_type, status, cumulative_gas_used, outcome.logs))
}

fn receipt_envelope(
    tx_type: TxType,
    status: Eip658Value,
    cumulative_gas_used: u64,
    logs: Vec<Log>,
) -> ReceiptEnvelope {
    let receipt = Receipt { status, cumulative_gas_used: u128::from(cumulative_gas_used), logs };
    let logs_bloom = receipt.bloom_slow();
    let inner = ReceiptWithBloom { receipt, logs_bloom };
    match tx_type {
        TxType::Legacy => ReceiptEnvelope::Legacy(inner),
        TxType::Eip2930 => ReceiptEnvelope::Eip2930(inner),
        TxType::Eip1559 => ReceiptEnvelope::Eip1559(inner),
        TxType::Eip4844 => ReceiptEnvelope::Eip4844(inner),
        TxType::Eip7702 => ReceiptEnvelope::Eip7702(inner),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{signed_transfer, TestVm};
    use alloy_consensus::Sealable;
    use alloy_primitives::{Bloom, B256, U256};
    use laurel_storage::MemoryStore;

    fn store() -> ChainStore<MemoryStore> {
        ChainStore::new(MemoryStore::new())
    }

    fn pow_config() -> ChainConfig {
        ChainConfig { chain_id: 1, byzantium_block: Some(0), ..Default::default() }
    }

    fn empty_body() -> Body {
        Body { transactions: vec![], ommers: vec![], withdrawals: None }
    }

    /// A header whose commitments match an empty body executed by a VM
    /// that echoes the seeded state root.
    fn empty_header(state_root: B256) -> Sealed<Header> {
        Header {
            number: 1,
            state_root,
            transactions_root: EMPTY_ROOT_HASH,
            receipts_root: EMPTY_ROOT_HASH,
            ommers_hash: EMPTY_OMMER_ROOT_HASH,
            gas_limit: 8_000_000,
            ..Default::default()
        }
        .seal_slow()
    }

    #[test]
    fn empty_block_processes_cleanly() {
        let config = pow_config();
        let root = B256::repeat_byte(0x42);
        let mut vm = TestVm::at_root(root);
        let mut store = store();

        let receipts = BlockProcessor::new(&config)
            .process_block(&mut store, None, &mut vm, &empty_header(root), &empty_body())
            .unwrap();
        assert!(receipts.is_empty());
        assert_eq!(store.kv().depth(), 0);
        // The PoW path paid the coinbase.
        assert_eq!(vm.balance(Address::ZERO), crate::block_reward(Fork::Byzantium));
    }

    #[test]
    fn transactions_produce_receipts_and_check_roots() {
        let config = pow_config();
        let root = B256::repeat_byte(0x42);
        let (tx, _sender) = signed_transfer(0);
        let transactions = vec![tx];

        // Assemble the header from the outcomes the VM will report.
        let expected_receipt = ReceiptEnvelope::Legacy(ReceiptWithBloom {
            receipt: Receipt {
                status: Eip658Value::Eip658(true),
                cumulative_gas_used: 21_000,
                logs: vec![],
            },
            logs_bloom: Bloom::ZERO,
        });
        let header = Header {
            number: 1,
            state_root: root,
            transactions_root: calculate_transactions_root(&transactions),
            receipts_root: calculate_receipts_root(std::slice::from_ref(&expected_receipt)),
            ommers_hash: EMPTY_OMMER_ROOT_HASH,
            gas_used: 21_000,
            gas_limit: 8_000_000,
            ..Default::default()
        }
        .seal_slow();

        let body = Body { transactions, ommers: vec![], withdrawals: None };
        let mut vm = TestVm::at_root(root);
        let mut store = store();

        let receipts = BlockProcessor::new(&config)
            .process_block(&mut store, None, &mut vm, &header, &body)
            .unwrap();
        assert_eq!(receipts, vec![expected_receipt]);
        assert_eq!(vm.processed(), 1);
    }

    #[test]
    fn nonempty_body_against_empty_commitment_fails() {
        let config = pow_config();
        let root = B256::ZERO;
        let (tx, _) = signed_transfer(0);
        let body = Body { transactions: vec![tx], ommers: vec![], withdrawals: None };
        let mut vm = TestVm::at_root(root);
        let mut store = store();

        let err = BlockProcessor::new(&config)
            .process_block(&mut store, None, &mut vm, &empty_header(root), &body)
            .unwrap_err();
        assert_eq!(
            err,
            ExecutorError::Validation(ValidationError::UnexpectedTransactions)
        );
        // The transaction was disposed, nothing ran.
        assert_eq!(store.kv().depth(), 0);
        assert_eq!(vm.processed(), 0);
    }

    #[test]
    fn gas_used_mismatch_is_reported() {
        let config = pow_config();
        let root = B256::ZERO;
        let (tx, _) = signed_transfer(0);
        let transactions = vec![tx];
        let header = Header {
            number: 1,
            state_root: root,
            transactions_root: calculate_transactions_root(&transactions),
            gas_used: 99_999, // VM will report 21_000
            gas_limit: 8_000_000,
            ommers_hash: EMPTY_OMMER_ROOT_HASH,
            ..Default::default()
        }
        .seal_slow();
        let body = Body { transactions, ommers: vec![], withdrawals: None };
        let mut vm = TestVm::at_root(root);
        let mut store = store();

        let err = BlockProcessor::new(&config)
            .process_block(&mut store, None, &mut vm, &header, &body)
            .unwrap_err();
        assert_eq!(
            err,
            ExecutorError::Validation(ValidationError::GasUsed { expected: 99_999, got: 21_000 })
        );
    }

    #[test]
    fn state_root_mismatch_disposes_the_transaction() {
        let config = pow_config();
        let seeded = B256::repeat_byte(0x01);
        let claimed = B256::repeat_byte(0x02);
        let mut vm = TestVm::at_root(seeded);
        let mut store = store();

        let err = BlockProcessor::new(&config)
            .process_block(&mut store, None, &mut vm, &empty_header(claimed), &empty_body())
            .unwrap_err();
        assert_eq!(
            err,
            ExecutorError::Validation(ValidationError::StateRoot {
                expected: claimed,
                got: seeded
            })
        );
        assert_eq!(store.kv().depth(), 0);
    }

    #[test]
    fn dao_transition_drains_before_execution() {
        let drained = Address::repeat_byte(0xda);
        let refund = Address::repeat_byte(0xfe);
        let config = ChainConfig {
            chain_id: 1,
            byzantium_block: Some(0),
            dao_fork_support: true,
            dao_fork_block: Some(1),
            dao_fork_beneficiary: Some(refund),
            dao_fork_accounts: vec![drained],
            ..Default::default()
        };
        let root = B256::repeat_byte(0x42);
        let mut vm = TestVm::at_root(root);
        vm.add_balance(drained, U256::from(1000));
        let mut store = store();

        BlockProcessor::new(&config)
            .process_block(&mut store, None, &mut vm, &empty_header(root), &empty_body())
            .unwrap();
        assert_eq!(vm.balance(drained), U256::ZERO);
        assert_eq!(vm.balance(refund), U256::from(1000));
    }

    #[test]
    fn poa_blocks_advance_the_engine_and_pay_no_reward() {
        use laurel_clique::{
            constants::NONCE_DROP,
            test_utils::{checkpoint_header, vote_header, TestSigners},
            CliqueEngine,
        };
        use laurel_primitives::CliqueConfig;

        let signers = TestSigners::new(3);
        let clique_params = CliqueConfig { period: 15, epoch: 30_000 };
        let config = ChainConfig {
            chain_id: 5,
            byzantium_block: Some(0),
            clique: Some(clique_params),
            ..Default::default()
        };

        let mut store = store();
        let genesis = signers.seal(0, checkpoint_header(&signers, 0, B256::ZERO));
        store.put_header(&genesis).unwrap();

        let root = B256::repeat_byte(0x07);
        let mut block = vote_header(1, genesis.seal(), Address::ZERO, NONCE_DROP, true);
        block.state_root = root;
        block.transactions_root = EMPTY_ROOT_HASH;
        block.receipts_root = EMPTY_ROOT_HASH;
        block.logs_bloom = Bloom::ZERO;
        let block = signers.seal(1, block);

        let mut engine = CliqueEngine::new(clique_params);
        let mut vm = TestVm::at_root(root);
        BlockProcessor::new(&config)
            .process_block(&mut store, Some(&mut engine), &mut vm, &block, &empty_body())
            .unwrap();

        assert_eq!(engine.tip().map(|s| s.number), Some(1));
        // Authority chains mint nothing.
        assert_eq!(vm.balance(Address::ZERO), U256::ZERO);
    }

    #[test]
    fn pre_byzantium_receipts_need_the_intermediate_root() {
        // No Byzantium activation: receipts embed intermediate roots.
        let config = ChainConfig { chain_id: 1, ..Default::default() };
        let root = B256::ZERO;
        let (tx, _) = signed_transfer(0);
        let transactions = vec![tx];
        let header = Header {
            number: 1,
            state_root: root,
            transactions_root: calculate_transactions_root(&transactions),
            gas_used: 21_000,
            gas_limit: 8_000_000,
            ommers_hash: EMPTY_OMMER_ROOT_HASH,
            ..Default::default()
        }
        .seal_slow();
        let body = Body { transactions, ommers: vec![], withdrawals: None };

        // The default test VM reports no intermediate root.
        let mut vm = TestVm::at_root(root);
        let mut store = store();
        let err = BlockProcessor::new(&config)
            .process_block(&mut store, None, &mut vm, &header, &body)
            .unwrap_err();
        assert_eq!(err, ExecutorError::MissingIntermediateRoot);
    }
}
