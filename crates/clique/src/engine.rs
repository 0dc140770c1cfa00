//! The Clique engine: snapshot management and header verification.

use crate::{
    constants::{
        CHECKPOINT_INTERVAL, DIFF_IN_TURN, DIFF_NO_TURN, EXTRA_SEAL, EXTRA_VANITY,
        INMEMORY_SNAPSHOTS, NONCE_AUTH, NONCE_DROP,
    },
    snapshot::checkpoint_signers,
    CliqueError, CliqueResult, SignerCache, Snapshot,
};
use alloy_consensus::{Header, Sealable, Sealed, EMPTY_OMMER_ROOT_HASH};
use alloy_primitives::{Address, B256};
use laurel_primitives::CliqueConfig;
use laurel_storage::{ChainStore, KeyValueStore, StoreResult};
use lru::LruCache;
use std::num::NonZeroUsize;
use tracing::{debug, info, warn};

/// Storage access the engine needs: parent headers for the snapshot walk
/// and the raw store for checkpoint blobs.
pub trait EngineStore {
    /// The header stored under `hash`.
    fn header_by_hash(&self, hash: B256) -> StoreResult<Option<Header>>;
    /// The canonical header at `number`.
    fn header_by_number(&self, number: u64) -> StoreResult<Option<Header>>;
    /// The underlying key-value store.
    fn kv(&mut self) -> &mut dyn KeyValueStore;
}

impl<K: KeyValueStore> EngineStore for ChainStore<K> {
    fn header_by_hash(&self, hash: B256) -> StoreResult<Option<Header>> {
        Self::header_by_hash(self, hash)
    }

    fn header_by_number(&self, number: u64) -> StoreResult<Option<Header>> {
        Self::header_by_number(self, number)
    }

    fn kv(&mut self) -> &mut dyn KeyValueStore {
        self.kv_mut()
    }
}

/// The Clique proof-of-authority engine.
///
/// Holds the LRU of recent snapshots, the shared seal-signer cache, and
/// the live tip snapshot that the importer advances block by block.
/// Snapshot operations are serialized by `&mut self`; per-batch rollback
/// goes through [CliqueEngine::save_state] / [CliqueEngine::restore_state].
#[derive(Debug)]
pub struct CliqueEngine {
    config: CliqueConfig,
    recent_snaps: LruCache<B256, Snapshot>,
    signatures: SignerCache,
    tip: Option<Snapshot>,
    strict_checkpoints: bool,
}

impl CliqueEngine {
    /// Creates an engine for the given Clique parameters.
    pub fn new(config: CliqueConfig) -> Self {
        Self {
            config,
            recent_snaps: LruCache::new(NonZeroUsize::new(INMEMORY_SNAPSHOTS).unwrap()),
            signatures: SignerCache::new(),
            tip: None,
            strict_checkpoints: false,
        }
    }

    /// Makes checkpoint persistence failures fatal instead of logged.
    pub const fn with_strict_checkpoints(mut self, strict: bool) -> Self {
        self.strict_checkpoints = strict;
        self
    }

    /// The configured epoch length.
    pub const fn epoch(&self) -> u64 {
        self.config.epoch
    }

    /// The configured block period in seconds.
    pub const fn period(&self) -> u64 {
        self.config.period
    }

    /// The live tip snapshot, if one has been established.
    pub const fn tip(&self) -> Option<&Snapshot> {
        self.tip.as_ref()
    }

    /// A cheap copy of the tip state, taken before a batch so a failed
    /// import can roll the engine back.
    pub fn save_state(&self) -> Option<Snapshot> {
        self.tip.clone()
    }

    /// Restores tip state saved by [CliqueEngine::save_state].
    pub fn restore_state(&mut self, saved: Option<Snapshot>) {
        self.tip = saved;
    }

    /// Advances the tip snapshot through one header, establishing the tip
    /// from the header's parent when it is not already positioned there.
    pub fn advance<S: EngineStore>(
        &mut self,
        store: &mut S,
        header: &Sealed<Header>,
    ) -> CliqueResult<()> {
        if header.number == 0 {
            return Err(CliqueError::InvalidVotingChain);
        }

        let positioned = self
            .tip
            .as_ref()
            .is_some_and(|t| t.number + 1 == header.number && t.hash == header.parent_hash);
        if !positioned {
            let snap = self.snapshot(store, header.number - 1, header.parent_hash, &[])?;
            self.tip = Some(snap);
        }

        let mut tip = self.tip.take().expect("tip positioned above");
        tip.apply(std::slice::from_ref(header), &mut self.signatures, self.config.epoch)?;
        if tip.number % CHECKPOINT_INTERVAL == 0 {
            self.checkpoint(store.kv(), &tip)?;
        }
        self.recent_snaps.put(tip.hash, tip.clone());
        self.tip = Some(tip);
        Ok(())
    }

    /// The authorization snapshot at `(number, hash)`.
    ///
    /// Walks backwards collecting headers until it hits a cached
    /// snapshot, an on-disk checkpoint blob, or a genesis/bootstrap
    /// checkpoint header, then replays the collected headers forward.
    /// `parents` supplies not-yet-persisted ancestors, consumed from the
    /// back.
    pub fn snapshot<S: EngineStore>(
        &mut self,
        store: &mut S,
        number: u64,
        hash: B256,
        parents: &[Sealed<Header>],
    ) -> CliqueResult<Snapshot> {
        let mut headers: Vec<Sealed<Header>> = Vec::new();
        let mut cursor = (number, hash);
        let mut parents_left = parents.len();

        let mut snap = loop {
            let (number, hash) = cursor;

            if let Some(snap) = self.recent_snaps.get(&hash) {
                break snap.clone();
            }

            if number % CHECKPOINT_INTERVAL == 0 {
                if let Some(snap) = Snapshot::load(&*store.kv(), hash)? {
                    debug!(target: "clique", number, %hash, "loaded checkpoint snapshot");
                    break snap;
                }
            }

            // Genesis, or a checkpoint block whose ancestry is not
            // available, bootstraps from the published signer list.
            let epoch = self.config.epoch;
            let is_bootstrap_checkpoint = epoch > 0 &&
                number % epoch == 0 &&
                parents_left == 0 &&
                store.header_by_number(number.saturating_sub(1))?.is_none();
            if number == 0 || is_bootstrap_checkpoint {
                let checkpoint = find_header(store, parents, parents_left, number, hash)?;
                let snap = Snapshot::from_checkpoint_header(&checkpoint)?;
                self.checkpoint(store.kv(), &snap)?;
                info!(
                    target: "clique",
                    number,
                    signers = snap.signers.len(),
                    "established checkpoint authorization state"
                );
                break snap;
            }

            // Keep walking: take the header for the cursor and move to
            // its parent.
            let header = if parents_left > 0 {
                let candidate = &parents[parents_left - 1];
                if candidate.seal() != hash || candidate.number != number {
                    return Err(CliqueError::UnknownAncestor(hash));
                }
                parents_left -= 1;
                candidate.clone()
            } else {
                match store.header_by_hash(hash)? {
                    Some(h) if h.number == number => h.seal_slow(),
                    _ => return Err(CliqueError::UnknownAncestor(hash)),
                }
            };
            cursor = (number - 1, header.parent_hash);
            headers.push(header);
        };

        // Replay the collected headers on top of the found state.
        headers.reverse();
        let replayed = !headers.is_empty();
        snap.apply(&headers, &mut self.signatures, self.config.epoch)?;
        self.recent_snaps.put(snap.hash, snap.clone());

        if replayed && snap.number % CHECKPOINT_INTERVAL == 0 {
            self.checkpoint(store.kv(), &snap)?;
        }
        Ok(snap)
    }

    /// Verifies a sealed header: shape rules first, then the rules that
    /// cascade from the parent and the authorization snapshot.
    pub fn verify_header<S: EngineStore>(
        &mut self,
        store: &mut S,
        header: &Sealed<Header>,
        parents: &[Sealed<Header>],
    ) -> CliqueResult<()> {
        let number = header.number;
        let checkpoint = self.config.epoch > 0 && number % self.config.epoch == 0;

        // Checkpoint blocks publish the signer list and carry no vote.
        if checkpoint && header.beneficiary != Address::ZERO {
            return Err(CliqueError::InvalidCheckpointBeneficiary);
        }
        if header.nonce != NONCE_AUTH && header.nonce != NONCE_DROP {
            return Err(CliqueError::InvalidVote);
        }
        if checkpoint && header.nonce != NONCE_DROP {
            return Err(CliqueError::InvalidCheckpointVote);
        }

        let extra = &header.extra_data;
        if extra.len() < EXTRA_VANITY {
            return Err(CliqueError::MissingVanity);
        }
        if extra.len() < EXTRA_VANITY + EXTRA_SEAL {
            return Err(CliqueError::MissingSignature);
        }
        let signers_bytes = extra.len() - EXTRA_VANITY - EXTRA_SEAL;
        if !checkpoint && signers_bytes != 0 {
            return Err(CliqueError::ExtraSigners);
        }
        if checkpoint && signers_bytes % Address::len_bytes() != 0 {
            return Err(CliqueError::InvalidCheckpointSigners);
        }

        if header.mix_hash != B256::ZERO {
            return Err(CliqueError::InvalidMixDigest);
        }
        if header.ommers_hash != EMPTY_OMMER_ROOT_HASH {
            return Err(CliqueError::InvalidUncleHash);
        }
        if number > 0 && header.difficulty != DIFF_IN_TURN && header.difficulty != DIFF_NO_TURN {
            return Err(CliqueError::InvalidDifficulty);
        }

        if number == 0 {
            return Ok(());
        }

        // Cascading rules need the parent.
        let parent = find_header(store, parents, parents.len(), number - 1, header.parent_hash)?;
        if parent.timestamp + self.config.period > header.timestamp {
            return Err(CliqueError::InvalidTimestamp);
        }

        let snap = self.snapshot(store, number - 1, header.parent_hash, parents)?;
        if checkpoint {
            let published = checkpoint_signers(header)?;
            if published != snap.signers() {
                return Err(CliqueError::InvalidCheckpointSigners);
            }
        }
        self.verify_seal(&snap, header)
    }

    /// Verifies that the seal was produced by an authorized signer,
    /// outside its recent-signer window, with the difficulty matching its
    /// turn.
    pub fn verify_seal(&mut self, snap: &Snapshot, header: &Sealed<Header>) -> CliqueResult<()> {
        let number = header.number;
        let signer = self.signatures.signer(header)?;

        if !snap.signers.contains(&signer) {
            return Err(CliqueError::UnauthorizedSigner(signer));
        }
        for (&seen, &recent) in &snap.recents {
            if recent == signer {
                let limit = snap.recents_limit();
                if number < limit || seen > number - limit {
                    return Err(CliqueError::RecentlySigned(signer));
                }
            }
        }

        let in_turn = snap.in_turn(number, signer);
        if in_turn && header.difficulty != DIFF_IN_TURN {
            return Err(CliqueError::WrongDifficulty);
        }
        if !in_turn && header.difficulty != DIFF_NO_TURN {
            return Err(CliqueError::WrongDifficulty);
        }
        Ok(())
    }

    /// Persists `snap`, honoring the checkpoint policy: failures are
    /// logged and absorbed unless strict mode is on.
    fn checkpoint(&self, kv: &mut dyn KeyValueStore, snap: &Snapshot) -> CliqueResult<()> {
        match snap.store(kv) {
            Ok(()) => {
                debug!(target: "clique", number = snap.number, hash = %snap.hash, "stored snapshot");
                Ok(())
            }
            Err(e) if self.strict_checkpoints => Err(e),
            Err(e) => {
                warn!(target: "clique", number = snap.number, %e, "snapshot store failed; next checkpoint will retry");
                Ok(())
            }
        }
    }
}

/// Finds the header at `(number, hash)` among the in-flight parents
/// (topmost `available` entries considered) or the persisted chain.
fn find_header<S: EngineStore>(
    store: &S,
    parents: &[Sealed<Header>],
    available: usize,
    number: u64,
    hash: B256,
) -> CliqueResult<Sealed<Header>> {
    for parent in parents[..available].iter().rev() {
        if parent.seal() == hash && parent.number == number {
            return Ok(parent.clone());
        }
    }
    match store.header_by_hash(hash)? {
        Some(h) if h.number == number => Ok(h.seal_slow()),
        _ => Err(CliqueError::UnknownAncestor(hash)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{checkpoint_header, vote_header, TestSigners};
    use laurel_storage::MemoryStore;

    fn engine(epoch: u64) -> CliqueEngine {
        CliqueEngine::new(CliqueConfig { period: 15, epoch })
    }

    /// A chain of sealed headers over an in-memory store.
    #[derive(Debug, Default)]
    struct TestChain {
        kv: MemoryStore,
        headers: Vec<Sealed<Header>>,
    }

    impl TestChain {
        fn push(&mut self, header: Sealed<Header>) {
            self.headers.push(header);
        }

        fn tip(&self) -> &Sealed<Header> {
            self.headers.last().expect("non-empty chain")
        }
    }

    impl EngineStore for TestChain {
        fn header_by_hash(&self, hash: B256) -> StoreResult<Option<Header>> {
            Ok(self.headers.iter().find(|h| h.seal() == hash).map(|h| h.inner().clone()))
        }

        fn header_by_number(&self, number: u64) -> StoreResult<Option<Header>> {
            Ok(self.headers.iter().find(|h| h.number == number).map(|h| h.inner().clone()))
        }

        fn kv(&mut self) -> &mut dyn KeyValueStore {
            &mut self.kv
        }
    }

    /// Builds a Clique chain of `len` in-turn blocks over a genesis
    /// checkpoint.
    fn build_chain(signers: &TestSigners, len: u64) -> TestChain {
        let mut chain = TestChain::default();
        let genesis = signers.seal(0, checkpoint_header(signers, 0, B256::ZERO));
        let mut parent = genesis.seal();
        chain.push(genesis);

        for number in 1..=len {
            let index = (number % signers.len() as u64) as usize;
            let header =
                signers.seal(index, vote_header(number, parent, Address::ZERO, NONCE_DROP, true));
            parent = header.seal();
            chain.push(header);
        }
        chain
    }

    #[test]
    fn snapshot_walks_back_to_genesis_and_replays() {
        let signers = TestSigners::new(3);
        let mut chain = build_chain(&signers, 6);
        let mut engine = engine(30_000);

        let tip = chain.tip().clone();
        let snap = engine.snapshot(&mut chain, tip.number, tip.seal(), &[]).unwrap();
        assert_eq!(snap.number, 6);
        assert_eq!(snap.hash, tip.seal());
        assert_eq!(snap.signers(), signers.addresses());

        // The genesis bootstrap snapshot was persisted.
        let genesis_hash = chain.headers[0].seal();
        assert!(Snapshot::load(&chain.kv, genesis_hash).unwrap().is_some());
    }

    #[test]
    fn snapshot_is_served_from_the_cache_after_a_walk() {
        let signers = TestSigners::new(3);
        let mut chain = build_chain(&signers, 4);
        let mut engine = engine(30_000);

        let tip = chain.tip().clone();
        let first = engine.snapshot(&mut chain, tip.number, tip.seal(), &[]).unwrap();
        // Second resolution hits the LRU even with an empty chain view.
        let mut empty = TestChain::default();
        let second = engine.snapshot(&mut empty, tip.number, tip.seal(), &[]).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn missing_ancestry_is_an_unknown_ancestor() {
        let mut engine = engine(30_000);
        let mut empty = TestChain::default();
        let missing = B256::repeat_byte(0x3f);
        assert_eq!(
            engine.snapshot(&mut empty, 9, missing, &[]),
            Err(CliqueError::UnknownAncestor(missing))
        );
    }

    #[test]
    fn verify_header_accepts_a_well_formed_chain() {
        let signers = TestSigners::new(3);
        let mut chain = build_chain(&signers, 5);
        let mut engine = engine(30_000);

        let headers = chain.headers[1..].to_vec();
        for header in &headers {
            engine.verify_header(&mut chain, header, &[]).unwrap();
        }
    }

    #[test]
    fn verify_header_shape_rules() {
        let signers = TestSigners::new(3);
        let mut chain = build_chain(&signers, 2);
        let mut engine = engine(30_000);
        let parent = chain.tip().seal();

        // No vanity prefix at all.
        let mut bare = vote_header(3, parent, Address::ZERO, NONCE_DROP, true);
        bare.extra_data = alloy_primitives::Bytes::from(vec![0u8; 10]);
        assert_eq!(
            engine.verify_header(&mut chain, &bare.seal_slow(), &[]),
            Err(CliqueError::MissingVanity)
        );

        // Vanity present but seal suffix missing.
        let mut unsealed = vote_header(3, parent, Address::ZERO, NONCE_DROP, true);
        unsealed.extra_data = alloy_primitives::Bytes::from(vec![0u8; EXTRA_VANITY + 10]);
        assert_eq!(
            engine.verify_header(&mut chain, &unsealed.seal_slow(), &[]),
            Err(CliqueError::MissingSignature)
        );

        // Signer list outside a checkpoint block.
        let listed = signers.seal(0, checkpoint_header(&signers, 3, parent));
        assert_eq!(
            engine.verify_header(&mut chain, &listed, &[]),
            Err(CliqueError::ExtraSigners)
        );

        // Non-zero mix digest.
        let mut mixed = vote_header(3, parent, Address::ZERO, NONCE_DROP, true);
        mixed.mix_hash = B256::repeat_byte(1);
        let mixed = signers.seal(0, mixed);
        assert_eq!(
            engine.verify_header(&mut chain, &mixed, &[]),
            Err(CliqueError::InvalidMixDigest)
        );

        // Nonce that is neither vote.
        let mut nonced = vote_header(3, parent, Address::ZERO, NONCE_DROP, true);
        nonced.nonce = alloy_primitives::B64::new([1, 2, 3, 4, 5, 6, 7, 8]);
        let nonced = signers.seal(0, nonced);
        assert_eq!(
            engine.verify_header(&mut chain, &nonced, &[]),
            Err(CliqueError::InvalidVote)
        );
    }

    #[test]
    fn verify_header_enforces_the_period() {
        let signers = TestSigners::new(3);
        let mut chain = build_chain(&signers, 2);
        let mut engine = engine(30_000);

        let tip = chain.tip().clone();
        let mut hasty = vote_header(3, tip.seal(), Address::ZERO, NONCE_DROP, true);
        hasty.timestamp = tip.timestamp + 1; // period is 15
        let index = (3 % signers.len() as u64) as usize;
        let hasty = signers.seal(index, hasty);
        assert_eq!(
            engine.verify_header(&mut chain, &hasty, &[]),
            Err(CliqueError::InvalidTimestamp)
        );
    }

    #[test]
    fn verify_seal_rejects_wrong_turn_difficulty() {
        let signers = TestSigners::new(3);
        let mut chain = build_chain(&signers, 2);
        let mut engine = engine(30_000);

        let tip = chain.tip().clone();
        let in_turn_index = (3 % signers.len() as u64) as usize;
        // The in-turn signer claims out-of-turn difficulty.
        let lying = signers
            .seal(in_turn_index, vote_header(3, tip.seal(), Address::ZERO, NONCE_DROP, false));
        assert_eq!(
            engine.verify_header(&mut chain, &lying, &[]),
            Err(CliqueError::WrongDifficulty)
        );
    }

    #[test]
    fn epoch_header_must_republish_the_authorized_set() {
        let signers = TestSigners::new(3);
        // Epoch of 4: block 4 is a checkpoint.
        let mut chain = build_chain(&signers, 3);
        let mut engine = engine(4);

        let tip = chain.tip().clone();
        let index = (4 % signers.len() as u64) as usize;

        let good = signers.seal(index, checkpoint_header(&signers, 4, tip.seal()));
        engine.verify_header(&mut chain, &good, &[]).unwrap();

        // A checkpoint publishing the wrong set fails.
        let wrong_set = TestSigners::new(4);
        let bad = signers.seal(index, checkpoint_header(&wrong_set, 4, tip.seal()));
        assert_eq!(
            engine.verify_header(&mut chain, &bad, &[]),
            Err(CliqueError::InvalidCheckpointSigners)
        );
    }

    #[test]
    fn advance_tracks_the_tip_and_supports_rollback() {
        let signers = TestSigners::new(3);
        let mut chain = build_chain(&signers, 4);
        let mut engine = engine(30_000);

        // Advance through blocks 1..=3.
        let headers = chain.headers.clone();
        for header in &headers[1..4] {
            engine.advance(&mut chain, header).unwrap();
        }
        let saved = engine.save_state();
        assert_eq!(saved.as_ref().map(|s| s.number), Some(3));

        engine.advance(&mut chain, &headers[4]).unwrap();
        assert_eq!(engine.tip().map(|s| s.number), Some(4));

        engine.restore_state(saved);
        assert_eq!(engine.tip().map(|s| s.number), Some(3));
    }

    #[test]
    fn unknown_parents_in_verify_are_reported() {
        let signers = TestSigners::new(3);
        let mut engine = engine(30_000);
        let mut empty = TestChain::default();

        let orphan = signers
            .seal(0, vote_header(5, B256::repeat_byte(0x11), Address::ZERO, NONCE_DROP, true));
        assert!(matches!(
            engine.verify_header(&mut empty, &orphan, &[]),
            Err(CliqueError::UnknownAncestor(_))
        ));
    }
}
