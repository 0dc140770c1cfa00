//! The per-block authorization snapshot and its voting state machine.

use crate::{
    constants::{EXTRA_SEAL, EXTRA_VANITY, NONCE_AUTH, NONCE_DROP},
    CliqueError, CliqueResult, SignerCache,
};
use alloy_consensus::{Header, Sealed};
use alloy_primitives::{Address, B256};
use laurel_storage::{keys, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A single open authorization proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// The authorized signer that cast this vote.
    pub signer: Address,
    /// The block number the vote was cast in.
    pub block_number: u64,
    /// The account the vote is about.
    pub address: Address,
    /// Whether to authorize or drop the account.
    pub authorize: bool,
}

/// The running tally for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    /// The direction of the proposal. Votes in the opposite direction are
    /// invalid while the candidate's membership is unchanged.
    pub authorize: bool,
    /// Number of votes cast so far.
    pub votes: usize,
}

/// The authorization state of the chain at one `(number, hash)`.
///
/// `recents` maps sealing block numbers to their signers and is bounded to
/// the most recent `⌊len(signers)/2⌋` entries, which is the spam
/// protection keeping any signer from sealing twice in a short window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Block number this snapshot was computed at (inclusive).
    pub number: u64,
    /// Block hash this snapshot was computed at.
    pub hash: B256,
    /// The sorted set of authorized signers.
    pub signers: BTreeSet<Address>,
    /// Recent sealing block number → signer.
    pub recents: BTreeMap<u64, Address>,
    /// Open votes, in casting order.
    pub votes: Vec<Vote>,
    /// Running tally per candidate.
    pub tally: BTreeMap<Address, Tally>,
}

impl Snapshot {
    /// Creates a fresh snapshot with the given authorized set and no open
    /// votes.
    pub fn new(number: u64, hash: B256, signers: impl IntoIterator<Item = Address>) -> Self {
        Self {
            number,
            hash,
            signers: signers.into_iter().collect(),
            recents: BTreeMap::new(),
            votes: Vec::new(),
            tally: BTreeMap::new(),
        }
    }

    /// Builds the snapshot published by a genesis or checkpoint header,
    /// whose extra-data carries the full signer list.
    pub fn from_checkpoint_header(header: &Sealed<Header>) -> CliqueResult<Self> {
        let signers = checkpoint_signers(header)?;
        Ok(Self::new(header.number, header.seal(), signers))
    }

    /// The authorized signers in sorted order.
    pub fn signers(&self) -> Vec<Address> {
        self.signers.iter().copied().collect()
    }

    /// Position of `signer` in the sorted authorized set.
    pub fn signer_index(&self, signer: Address) -> Option<usize> {
        self.signers.iter().position(|s| *s == signer)
    }

    /// Whether `signer` is the in-turn sealer at `number`.
    pub fn in_turn(&self, number: u64, signer: Address) -> bool {
        match self.signer_index(signer) {
            Some(index) => !self.signers.is_empty() && number % self.signers.len() as u64 == index as u64,
            None => false,
        }
    }

    /// Size of the recent-signer window: a signer may seal again only
    /// after `⌊len(signers)/2⌋ + 1` blocks.
    pub fn recents_limit(&self) -> u64 {
        self.signers.len() as u64 / 2 + 1
    }

    /// Whether a vote about `address` in the given direction makes sense
    /// against the current authorized set.
    fn valid_vote(&self, address: Address, authorize: bool) -> bool {
        if authorize {
            !self.signers.contains(&address)
        } else {
            self.signers.contains(&address)
        }
    }

    /// Counts a vote into the tally. Returns false for no-op votes.
    fn cast(&mut self, address: Address, authorize: bool) -> bool {
        if !self.valid_vote(address, authorize) {
            return false;
        }
        self.tally
            .entry(address)
            .and_modify(|t| t.votes += 1)
            .or_insert(Tally { authorize, votes: 1 });
        true
    }

    /// Removes a previously counted vote from the tally.
    fn uncast(&mut self, address: Address, authorize: bool) -> bool {
        let Some(tally) = self.tally.get_mut(&address) else {
            return false;
        };
        if tally.authorize != authorize {
            return false;
        }
        if tally.votes > 1 {
            tally.votes -= 1;
        } else {
            self.tally.remove(&address);
        }
        true
    }

    /// Advances the snapshot through a contiguous run of sealed headers.
    ///
    /// The first header must extend the snapshot and the run must be
    /// strictly contiguous, otherwise [CliqueError::InvalidVotingChain] is
    /// returned and the snapshot is left partially advanced; callers that
    /// need rollback clone first (the snapshot is small by design).
    pub fn apply(
        &mut self,
        headers: &[Sealed<Header>],
        signatures: &mut SignerCache,
        epoch: u64,
    ) -> CliqueResult<()> {
        if headers.is_empty() {
            return Ok(());
        }
        for pair in headers.windows(2) {
            if pair[1].number != pair[0].number + 1 {
                return Err(CliqueError::InvalidVotingChain);
            }
        }
        if headers[0].number != self.number + 1 {
            return Err(CliqueError::InvalidVotingChain);
        }

        for header in headers {
            let number = header.number;

            // Epoch blocks flush every open vote.
            if epoch > 0 && number % epoch == 0 {
                self.votes.clear();
                self.tally.clear();
            }

            // Make room in the recent-signer window.
            let limit = self.recents_limit();
            if number >= limit {
                self.recents.remove(&(number - limit));
            }

            let signer = signatures.signer(header)?;
            if !self.signers.contains(&signer) {
                return Err(CliqueError::UnauthorizedSigner(signer));
            }
            if self.recents.values().any(|recent| *recent == signer) {
                return Err(CliqueError::RecentlySigned(signer));
            }
            self.recents.insert(number, signer);

            // A signer gets one open vote per candidate; a new one
            // replaces the old.
            if let Some(pos) = self
                .votes
                .iter()
                .position(|v| v.signer == signer && v.address == header.beneficiary)
            {
                let old = self.votes.remove(pos);
                self.uncast(old.address, old.authorize);
            }

            let authorize = if header.nonce == NONCE_AUTH {
                true
            } else if header.nonce == NONCE_DROP {
                false
            } else {
                return Err(CliqueError::InvalidVote);
            };
            if self.cast(header.beneficiary, authorize) {
                self.votes.push(Vote {
                    signer,
                    block_number: number,
                    address: header.beneficiary,
                    authorize,
                });
            }

            // A strict majority mutates the authorized set.
            let majority = self
                .tally
                .get(&header.beneficiary)
                .is_some_and(|t| t.votes > self.signers.len() / 2);
            if majority {
                let tally = self.tally[&header.beneficiary];
                if tally.authorize {
                    self.signers.insert(header.beneficiary);
                } else {
                    self.signers.remove(&header.beneficiary);

                    // The window shrank; one stale entry may linger.
                    let limit = self.recents_limit();
                    if number >= limit {
                        self.recents.remove(&(number - limit));
                    }

                    // Votes cast by the dropped signer are void.
                    let mut i = 0;
                    while i < self.votes.len() {
                        if self.votes[i].signer == header.beneficiary {
                            let void = self.votes.remove(i);
                            self.uncast(void.address, void.authorize);
                        } else {
                            i += 1;
                        }
                    }
                }

                // Votes about the changed account are settled.
                self.votes.retain(|v| v.address != header.beneficiary);
                self.tally.remove(&header.beneficiary);

                debug!(
                    target: "clique",
                    block = number,
                    account = %header.beneficiary,
                    authorized = tally.authorize,
                    "authorization changed"
                );
            }
        }

        let last = &headers[headers.len() - 1];
        self.number = last.number;
        self.hash = last.seal();
        Ok(())
    }

    /// Persists this snapshot as a blob under its block hash.
    pub fn store<K: KeyValueStore + ?Sized>(&self, kv: &mut K) -> CliqueResult<()> {
        let blob =
            serde_json::to_vec(self).map_err(|e| CliqueError::SnapshotStore(e.to_string()))?;
        kv.put(keys::clique_snapshot_key(self.hash), blob)
            .map_err(|e| CliqueError::SnapshotStore(e.to_string()))
    }

    /// Loads the snapshot persisted under `hash`, if any.
    pub fn load<K: KeyValueStore + ?Sized>(kv: &K, hash: B256) -> CliqueResult<Option<Self>> {
        let Some(blob) = kv
            .get(&keys::clique_snapshot_key(hash))
            .map_err(|e| CliqueError::SnapshotLoad(e.to_string()))?
        else {
            return Ok(None);
        };
        let snap: Self =
            serde_json::from_slice(&blob).map_err(|e| CliqueError::SnapshotLoad(e.to_string()))?;
        Ok(Some(snap))
    }
}

/// Extracts the signer list from a genesis/checkpoint header's extra-data:
/// `vanity (32) ‖ signers (20 × N) ‖ seal (65)`.
pub(crate) fn checkpoint_signers(header: &Header) -> CliqueResult<Vec<Address>> {
    let extra = &header.extra_data;
    if extra.len() < EXTRA_VANITY {
        return Err(CliqueError::MissingVanity);
    }
    if extra.len() < EXTRA_VANITY + EXTRA_SEAL {
        return Err(CliqueError::MissingSignature);
    }
    let section = &extra[EXTRA_VANITY..extra.len() - EXTRA_SEAL];
    if section.is_empty() || section.len() % Address::len_bytes() != 0 {
        return Err(CliqueError::InvalidCheckpointSigners);
    }
    Ok(section.chunks_exact(Address::len_bytes()).map(Address::from_slice).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{vote_header, TestSigners};
    use laurel_storage::MemoryStore;

    fn apply_one(
        snap: &mut Snapshot,
        signatures: &mut SignerCache,
        header: Sealed<Header>,
    ) -> CliqueResult<()> {
        snap.apply(&[header], signatures, 30_000)
    }

    #[test]
    fn five_in_turn_seals_rotate_the_recents_window() {
        // Scenario: five signers seal blocks 1..=5 in turn with no votes.
        let signers = TestSigners::new(5);
        let mut snap = Snapshot::new(0, B256::ZERO, signers.addresses());
        let mut cache = SignerCache::new();

        let mut parent = B256::ZERO;
        for number in 1..=5u64 {
            let index = snap
                .signers()
                .iter()
                .position(|s| snap.in_turn(number, *s))
                .expect("one signer is in turn");
            let header = signers.seal(
                index,
                vote_header(number, parent, Address::ZERO, NONCE_DROP, true),
            );
            parent = header.seal();
            apply_one(&mut snap, &mut cache, header).unwrap();
        }

        assert_eq!(snap.number, 5);
        assert_eq!(snap.hash, parent);
        assert_eq!(snap.signers(), signers.addresses());
        // recents hold the trailing window: limit is 5/2+1 = 3, so blocks
        // 3, 4, 5 remain.
        assert_eq!(snap.recents.len(), 3);
        assert_eq!(snap.recents.keys().copied().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert!(snap.votes.is_empty());
        assert!(snap.tally.is_empty());
    }

    #[test]
    fn majority_authorizes_a_new_signer() {
        // Scenario: A, B and C vote a sixth signer in; the third vote
        // reaches 3/5 majority.
        let signers = TestSigners::new(5);
        let candidate = Address::repeat_byte(0xee);
        let mut snap = Snapshot::new(5, B256::ZERO, signers.addresses());
        let mut cache = SignerCache::new();

        let order = [0usize, 1, 2];
        let mut parent = snap.hash;
        for (offset, sealer) in order.iter().enumerate() {
            let number = 6 + offset as u64;
            let header =
                signers.seal(*sealer, vote_header(number, parent, candidate, NONCE_AUTH, false));
            parent = header.seal();
            apply_one(&mut snap, &mut cache, header).unwrap();

            if number < 8 {
                assert_eq!(snap.tally[&candidate].votes, offset + 1);
                assert!(!snap.signers.contains(&candidate));
            }
        }

        assert!(snap.signers.contains(&candidate));
        assert_eq!(snap.signers.len(), 6);
        assert!(snap.votes.iter().all(|v| v.address != candidate));
        assert!(!snap.tally.contains_key(&candidate));
    }

    #[test]
    fn majority_drops_a_signer_and_voids_its_votes() {
        let signers = TestSigners::new(4);
        let victim = signers.address(3);
        let mut snap = Snapshot::new(0, B256::ZERO, signers.addresses());
        let mut cache = SignerCache::new();

        // The victim proposes some unrelated account first.
        let bystander = Address::repeat_byte(0x77);
        let mut parent = B256::ZERO;
        let h1 = signers.seal(3, vote_header(1, parent, bystander, NONCE_AUTH, false));
        parent = h1.seal();
        apply_one(&mut snap, &mut cache, h1).unwrap();
        assert_eq!(snap.tally[&bystander].votes, 1);

        // Three of four vote the victim out: majority needs > 2.
        for (offset, sealer) in [0usize, 1, 2].iter().enumerate() {
            let header = signers
                .seal(*sealer, vote_header(2 + offset as u64, parent, victim, NONCE_DROP, false));
            parent = header.seal();
            apply_one(&mut snap, &mut cache, header).unwrap();
        }

        assert!(!snap.signers.contains(&victim));
        assert_eq!(snap.signers.len(), 3);
        // The dropped signer's open proposal is voided with it.
        assert!(!snap.tally.contains_key(&bystander));
        assert!(snap.votes.is_empty());
    }

    #[test]
    fn unauthorized_and_recent_signers_are_rejected() {
        let signers = TestSigners::new(3);
        let outsider = TestSigners::new(4); // superset keys, index 3 is new
        let mut snap = Snapshot::new(0, B256::ZERO, signers.addresses());
        let mut cache = SignerCache::new();

        let h1 = signers.seal(0, vote_header(1, B256::ZERO, Address::ZERO, NONCE_DROP, false));
        let h1_hash = h1.seal();
        apply_one(&mut snap, &mut cache, h1).unwrap();

        // Same signer again inside the window of 3/2+1 = 2 blocks.
        let again = signers.seal(0, vote_header(2, h1_hash, Address::ZERO, NONCE_DROP, false));
        assert!(matches!(
            apply_one(&mut snap.clone(), &mut cache, again),
            Err(CliqueError::RecentlySigned(_))
        ));

        // An address outside the authorized set.
        let stranger_index = outsider
            .addresses()
            .iter()
            .position(|a| !signers.addresses().contains(a))
            .unwrap();
        let stranger =
            outsider.seal(stranger_index, vote_header(2, h1_hash, Address::ZERO, NONCE_DROP, false));
        assert!(matches!(
            apply_one(&mut snap, &mut cache, stranger),
            Err(CliqueError::UnauthorizedSigner(_))
        ));
    }

    #[test]
    fn epoch_blocks_flush_open_votes() {
        let signers = TestSigners::new(3);
        let candidate = Address::repeat_byte(0x55);
        let mut snap = Snapshot::new(8, B256::ZERO, signers.addresses());
        let mut cache = SignerCache::new();

        let h9 = signers.seal(0, vote_header(9, B256::ZERO, candidate, NONCE_AUTH, false));
        let h9_hash = h9.seal();
        snap.apply(&[h9], &mut cache, 10).unwrap();
        assert_eq!(snap.votes.len(), 1);

        // Block 10 is an epoch boundary under epoch = 10.
        let h10 = signers.seal(1, vote_header(10, h9_hash, Address::ZERO, NONCE_DROP, true));
        snap.apply(&[h10], &mut cache, 10).unwrap();
        assert!(snap.votes.is_empty());
        assert!(snap.tally.is_empty());
    }

    #[test]
    fn non_contiguous_batches_are_rejected() {
        let signers = TestSigners::new(2);
        let mut snap = Snapshot::new(0, B256::ZERO, signers.addresses());
        let mut cache = SignerCache::new();

        let h5 = signers.seal(0, vote_header(5, B256::ZERO, Address::ZERO, NONCE_DROP, false));
        assert_eq!(
            snap.apply(&[h5], &mut cache, 30_000),
            Err(CliqueError::InvalidVotingChain)
        );

        let h1 = signers.seal(0, vote_header(1, B256::ZERO, Address::ZERO, NONCE_DROP, false));
        let h3 = signers.seal(1, vote_header(3, h1.seal(), Address::ZERO, NONCE_DROP, false));
        assert_eq!(
            snap.apply(&[h1, h3], &mut cache, 30_000),
            Err(CliqueError::InvalidVotingChain)
        );
    }

    #[test]
    fn invalid_nonce_is_an_invalid_vote() {
        let signers = TestSigners::new(2);
        let mut snap = Snapshot::new(0, B256::ZERO, signers.addresses());
        let mut cache = SignerCache::new();

        let bad_nonce = alloy_primitives::B64::new([0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 0]);
        let header =
            signers.seal(0, vote_header(1, B256::ZERO, Address::ZERO, bad_nonce, false));
        assert_eq!(snap.apply(&[header], &mut cache, 30_000), Err(CliqueError::InvalidVote));
    }

    #[test]
    fn split_application_equals_whole_application() {
        let signers = TestSigners::new(5);
        let candidate = Address::repeat_byte(0x99);
        let base = Snapshot::new(0, B256::ZERO, signers.addresses());
        let mut cache = SignerCache::new();

        let mut headers = Vec::new();
        let mut parent = B256::ZERO;
        for number in 1..=4u64 {
            let sealer = (number as usize - 1) % 5;
            let (target, nonce) = if number % 2 == 0 {
                (candidate, NONCE_AUTH)
            } else {
                (Address::ZERO, NONCE_DROP)
            };
            let header = signers.seal(sealer, vote_header(number, parent, target, nonce, false));
            parent = header.seal();
            headers.push(header);
        }

        let mut whole = base.clone();
        whole.apply(&headers, &mut cache, 30_000).unwrap();

        let mut split = base;
        split.apply(&headers[..2], &mut cache, 30_000).unwrap();
        split.apply(&headers[2..], &mut cache, 30_000).unwrap();

        assert_eq!(whole, split);
    }

    #[test]
    fn snapshot_round_trips_through_the_store() {
        let signers = TestSigners::new(3);
        let mut snap = Snapshot::new(12, B256::repeat_byte(3), signers.addresses());
        snap.recents.insert(11, signers.address(0));
        snap.votes.push(Vote {
            signer: signers.address(1),
            block_number: 12,
            address: Address::repeat_byte(9),
            authorize: true,
        });
        snap.tally
            .insert(Address::repeat_byte(9), Tally { authorize: true, votes: 1 });

        let mut kv = MemoryStore::new();
        snap.store(&mut kv).unwrap();
        let loaded = Snapshot::load(&kv, snap.hash).unwrap().unwrap();
        assert_eq!(loaded, snap);
        assert_eq!(Snapshot::load(&kv, B256::ZERO).unwrap(), None);
    }

    #[test]
    fn checkpoint_extra_data_parses_signer_section() {
        let signers = TestSigners::new(3);
        let header = signers.seal(
            0,
            crate::test_utils::checkpoint_header(&signers, 0, B256::ZERO),
        );
        let snap = Snapshot::from_checkpoint_header(&header).unwrap();
        assert_eq!(snap.signers(), signers.addresses());

        let torn = Header {
            extra_data: alloy_primitives::Bytes::from(vec![0u8; EXTRA_VANITY + EXTRA_SEAL + 7]),
            ..Default::default()
        };
        assert_eq!(
            checkpoint_signers(&torn),
            Err(CliqueError::InvalidCheckpointSigners)
        );
    }
}
