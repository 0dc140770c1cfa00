//! The chain context and the transactional block importer.

use crate::{validate_kinship, ChainError, ChainResult};
use alloy_consensus::{Header, Sealed};
use alloy_primitives::B256;
use core::time::Duration;
use laurel_clique::CliqueEngine;
use laurel_executor::{BlockProcessor, VmStateFactory};
use laurel_primitives::{Body, ChainConfig, ForkId, ForkIdTable};
use laurel_storage::{ChainStore, KeyValueStore};
use tracing::{error, info};

/// How much extra validation the importer runs on top of execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtraValidation {
    /// Execution only.
    Off,
    /// Kinship validation on proof-of-work chains; authority chains rely
    /// on execution alone.
    PowOnly,
    /// Kinship validation everywhere plus engine verification on
    /// authority chains.
    #[default]
    PowAndPoa,
}

/// Cooperative yield between blocks so the reactor can interleave.
const PER_BLOCK_YIELD: Duration = Duration::from_millis(10);

/// The per-instance chain context: configuration, fork-id table, store,
/// consensus engine and VM factory, plus the canonical head pointer.
#[derive(Debug)]
pub struct Chain<K, F>
where
    K: KeyValueStore,
    F: VmStateFactory,
{
    config: ChainConfig,
    fork_ids: ForkIdTable,
    store: ChainStore<K>,
    clique: Option<CliqueEngine>,
    vm: F,
    extra_validation: ExtraValidation,
    verify_from: u64,
    genesis_hash: B256,
    current_block: (u64, B256),
}

impl<K, F> Chain<K, F>
where
    K: KeyValueStore,
    F: VmStateFactory,
{
    /// Builds a chain context over a store that already holds a genesis
    /// block.
    pub fn new(config: ChainConfig, store: ChainStore<K>, vm: F) -> ChainResult<Self> {
        let genesis_hash = store.genesis_hash()?.ok_or(ChainError::GenesisMissing)?;
        let current_block = store.head()?.unwrap_or((0, genesis_hash));
        let fork_ids = ForkIdTable::new(genesis_hash, &config);
        let clique = config.clique.map(CliqueEngine::new);
        Ok(Self {
            config,
            fork_ids,
            store,
            clique,
            vm,
            extra_validation: ExtraValidation::default(),
            verify_from: 0,
            genesis_hash,
            current_block,
        })
    }

    /// Selects the extra-validation mode.
    pub fn with_extra_validation(mut self, mode: ExtraValidation) -> Self {
        self.extra_validation = mode;
        self
    }

    /// Skips extra validation below the given height (headers below it
    /// were validated during header sync).
    pub fn with_verify_from(mut self, verify_from: u64) -> Self {
        self.verify_from = verify_from;
        self
    }

    /// The chain configuration.
    pub const fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// The genesis hash the context was anchored on.
    pub const fn genesis_hash(&self) -> B256 {
        self.genesis_hash
    }

    /// The canonical head `(number, hash)` observed by readers.
    pub const fn current_block(&self) -> (u64, B256) {
        self.current_block
    }

    /// The EIP-2124 fork id at the given head height.
    pub fn fork_id(&self, head: u64) -> ForkId {
        self.fork_ids.fork_id(head)
    }

    /// The underlying chain store.
    pub const fn store(&self) -> &ChainStore<K> {
        &self.store
    }

    /// Mutable access to the underlying chain store.
    pub fn store_mut(&mut self) -> &mut ChainStore<K> {
        &mut self.store
    }

    /// The Clique engine, on authority chains.
    pub const fn clique(&self) -> Option<&CliqueEngine> {
        self.clique.as_ref()
    }

    /// Persists already-validated headers without executing bodies; the
    /// syncer's stash path.
    pub fn stash_headers(&mut self, headers: &[Sealed<Header>]) -> ChainResult<()> {
        self.store.stash_headers(headers)?;
        Ok(())
    }

    /// Executes and persists a batch of blocks atomically.
    ///
    /// The whole batch runs under one KV transaction with the engine
    /// snapshot saved up front. Blocks apply strictly in order; the head
    /// pointer moves only after each header is persisted. On the first
    /// failing block the transaction is disposed, the snapshot restored,
    /// and that block's error returned.
    pub async fn persist_blocks(
        &mut self,
        headers: &[Sealed<Header>],
        bodies: &[Body],
    ) -> ChainResult<()> {
        if headers.is_empty() && bodies.is_empty() {
            return Ok(());
        }
        if headers.len() != bodies.len() {
            return Err(ChainError::LengthMismatch {
                headers: headers.len(),
                bodies: bodies.len(),
            });
        }

        self.store.begin()?;
        let saved_snapshot = self.clique.as_ref().map(CliqueEngine::save_state);

        match self.persist_batch(headers, bodies).await {
            Ok(()) => {
                self.store.commit(true)?;
                info!(
                    target: "importer",
                    blocks = headers.len(),
                    head = self.current_block.0,
                    "batch committed"
                );
                Ok(())
            }
            Err(e) => {
                self.store.dispose()?;
                if let (Some(engine), Some(saved)) = (self.clique.as_mut(), saved_snapshot) {
                    engine.restore_state(saved);
                }
                self.current_block = self.store.head()?.unwrap_or((0, self.genesis_hash));
                Err(e)
            }
        }
    }

    async fn persist_batch(
        &mut self,
        headers: &[Sealed<Header>],
        bodies: &[Body],
    ) -> ChainResult<()> {
        let first = &headers[0];
        let mut parent = match self.store.header_by_hash(first.parent_hash)? {
            Some(h) => Sealed::new_unchecked(h, first.parent_hash),
            None => return Err(ChainError::UnknownParent(first.parent_hash)),
        };

        for (index, (header, body)) in headers.iter().zip(bodies).enumerate() {
            if let Err(e) = self.persist_one(&parent, header, body).await {
                error!(
                    target: "importer",
                    index,
                    block = header.number,
                    %e,
                    "block import failed"
                );
                return Err(e);
            }
            parent = header.clone();

            // Execution is CPU-bound; release the reactor between blocks.
            tokio::time::sleep(PER_BLOCK_YIELD).await;
        }
        Ok(())
    }

    async fn persist_one(
        &mut self,
        parent: &Sealed<Header>,
        header: &Sealed<Header>,
        body: &Body,
    ) -> ChainResult<()> {
        let mut vm_state =
            self.vm.state_at(parent.state_root).map_err(|e| ChainError::Vm(e.to_string()))?;

        let processor = BlockProcessor::new(&self.config);
        let receipts = processor.process_block(
            &mut self.store,
            self.clique.as_mut(),
            &mut vm_state,
            header,
            body,
        )?;

        let run_extra = match self.extra_validation {
            ExtraValidation::Off => false,
            ExtraValidation::PowOnly => !self.config.is_poa(),
            ExtraValidation::PowAndPoa => true,
        } && header.number >= self.verify_from;
        if run_extra {
            validate_kinship(&self.config, parent.inner(), parent.seal(), header)?;
            if self.config.is_poa() {
                if let Some(engine) = self.clique.as_mut() {
                    engine.verify_header(&mut self.store, header, std::slice::from_ref(parent))?;
                }
            }
        }

        self.store.put_header(header)?;
        self.store.put_body(header.seal(), body)?;
        self.store.put_receipts(header.seal(), &receipts)?;
        self.store.set_head(header.number, header.seal())?;
        // The header is on disk (within the batch transaction) before the
        // pointer moves, so concurrent readers never observe a head
        // without its header.
        self.current_block = (header.number, header.seal());
        Ok(())
    }
}
