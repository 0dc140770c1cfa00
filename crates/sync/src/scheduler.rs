//! The cooperative scheduler driving peer workers through the active
//! pass.

use crate::{
    constants::{STAGED_QUEUE_LWM, WORKER_IDLE_WAIT},
    BeaconHead, HeaderStash, HeaderSyncPass, PassControl, Peer, PeerClient, SyncPass, SyncState,
};
use alloy_primitives::B256;
use std::sync::Arc;
use tracing::info;

/// Everything the passes operate on: shared sync state, the peer set,
/// the beacon slot, and the header stash.
#[derive(Debug)]
pub struct SyncContext<C, S>
where
    C: PeerClient,
    S: HeaderStash,
{
    /// The shared syncer state.
    pub state: SyncState,
    /// The peer set; indexes are stable for a scheduler's lifetime.
    pub peers: Vec<Peer<C>>,
    /// The beacon-finalized head slot fed from outside.
    pub beacon: Arc<BeaconHead>,
    /// Where linked header runs are persisted.
    pub stash: S,
    /// Whether the next round runs the serialized pool pass first.
    pub pool_mode: bool,
    /// Cleared from outside to halt the loop after the current round.
    pub daemon: bool,
}

/// The single-threaded cooperative scheduler.
///
/// One pass is active at a time; [SyncScheduler::switch_pass] releases
/// the old pass and sets up the new one, which is where a snapshot-sync
/// pass would attach.
pub struct SyncScheduler<C, S>
where
    C: PeerClient + Send,
    S: HeaderStash + Send,
{
    ctx: SyncContext<C, S>,
    pass: Box<dyn SyncPass<C, S>>,
}

impl<C, S> core::fmt::Debug for SyncScheduler<C, S>
where
    C: PeerClient + Send + core::fmt::Debug,
    S: HeaderStash + Send + core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SyncScheduler").field("ctx", &self.ctx).finish_non_exhaustive()
    }
}

impl<C, S> SyncScheduler<C, S>
where
    C: PeerClient + Send,
    S: HeaderStash + Send,
{
    /// A scheduler over a pristine layout with the header pass active.
    pub fn new(genesis_hash: B256, stash: S) -> Self {
        Self {
            ctx: SyncContext {
                state: SyncState::new(genesis_hash),
                peers: Vec::new(),
                beacon: Arc::new(BeaconHead::new()),
                stash,
                pool_mode: false,
                daemon: true,
            },
            pass: Box::new(HeaderSyncPass),
        }
    }

    /// Registers a peer and returns its id.
    pub fn add_peer(&mut self, client: C) -> u64 {
        let id = self.ctx.peers.len() as u64;
        self.ctx.peers.push(Peer::new(id, client));
        id
    }

    /// The beacon slot handle to wire into the RPC layer.
    pub fn beacon_hook(&self) -> Arc<BeaconHead> {
        Arc::clone(&self.ctx.beacon)
    }

    /// The scheduling context.
    pub const fn context(&self) -> &SyncContext<C, S> {
        &self.ctx
    }

    /// Mutable access to the scheduling context.
    pub fn context_mut(&mut self) -> &mut SyncContext<C, S> {
        &mut self.ctx
    }

    /// Swaps the active pass: release the old, set up the new.
    pub fn switch_pass(&mut self, mut pass: Box<dyn SyncPass<C, S>>) {
        self.pass.release(&mut self.ctx);
        pass.setup(&mut self.ctx);
        self.pass = pass;
    }

    /// One scheduling round: daemon tick, optional pool pass, then one
    /// step per running peer. While a backtrack is armed only the first
    /// running peer steps.
    pub async fn run_once(&mut self) -> PassControl {
        if self.pass.daemon(&mut self.ctx).await == PassControl::Halt {
            return PassControl::Halt;
        }

        if self.ctx.pool_mode {
            if self.pass.pool(&mut self.ctx).await == PassControl::Halt {
                return PassControl::Halt;
            }
            self.ctx.pool_mode = false;
        }

        let mut any_progress = false;
        for index in 0..self.ctx.peers.len() {
            if !self.pass.start(&mut self.ctx, index) {
                continue;
            }
            let control = if self.ctx.peers[index].multi_ok {
                self.pass.multi(&mut self.ctx, index).await
            } else {
                self.pass.single(&mut self.ctx, index).await
            };
            match control {
                PassControl::Continue => any_progress = true,
                PassControl::Idle => {}
                PassControl::Halt => return PassControl::Halt,
            }
            if self.ctx.state.backtrack.is_some() {
                // Re-org recovery is a single-peer affair.
                break;
            }
        }

        self.ctx.pool_mode = self.ctx.state.staged.len() >= STAGED_QUEUE_LWM;

        if any_progress {
            PassControl::Continue
        } else {
            PassControl::Idle
        }
    }

    /// Drives rounds until halted from outside, sleeping through idle
    /// rounds. Header sync being "complete" is ephemeral on a live
    /// chain, so completion alone does not stop the loop.
    pub async fn run(&mut self) {
        loop {
            match self.run_once().await {
                PassControl::Halt => break,
                PassControl::Idle => {
                    if self.ctx.state.header_sync_complete() {
                        info!(
                            target: "sync",
                            base = self.ctx.state.layout.base,
                            "header chain complete; waiting for a new finalized head"
                        );
                    }
                    tokio::time::sleep(WORKER_IDLE_WAIT).await;
                }
                PassControl::Continue => {}
            }
            if !self.ctx.daemon {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{header_run, MapClient, VecStash};
    use crate::PeerState;
    use alloy_consensus::{Header, Sealed};

    fn network(len: usize) -> (Vec<Sealed<Header>>, MapClient) {
        let genesis = B256::repeat_byte(1);
        let run = header_run(1, len, genesis);
        (run.clone(), MapClient::new(run))
    }

    async fn drive<C, S>(scheduler: &mut SyncScheduler<C, S>, rounds: usize)
    where
        C: PeerClient + Send,
        S: HeaderStash + Send,
    {
        for _ in 0..rounds {
            let _ = scheduler.run_once().await;
            if scheduler.ctx.state.header_sync_complete() &&
                scheduler.ctx.state.backtrack.is_none()
            {
                break;
            }
        }
    }

    #[tokio::test]
    async fn two_peers_sync_the_whole_header_chain() {
        let genesis = B256::repeat_byte(1);
        let (run, client) = network(3000);

        let mut scheduler = SyncScheduler::new(genesis, VecStash::default());
        scheduler.add_peer(client.clone());
        scheduler.add_peer(client);

        scheduler.beacon_hook().on_new_beacon_head(run[2999].clone());
        drive(&mut scheduler, 64).await;

        let ctx = scheduler.context();
        assert!(ctx.state.header_sync_complete());
        assert_eq!(ctx.stash.numbers(), (1..=3000).collect::<Vec<_>>());
        assert_eq!(ctx.state.stats.stashed_headers, 3000);
        assert!(ctx.state.unprocessed.is_empty());
        assert!(ctx.state.staged.is_empty());
    }

    #[tokio::test]
    async fn lying_peer_is_zombified_and_its_range_refetched() {
        let genesis = B256::repeat_byte(1);
        let (run, client) = network(600);

        let mut scheduler = SyncScheduler::new(genesis, VecStash::default());
        // Peer 0 forges a parent hash in its first reply.
        scheduler.add_peer(client.clone().lying());
        scheduler.add_peer(client);

        scheduler.beacon_hook().on_new_beacon_head(run[599].clone());
        drive(&mut scheduler, 64).await;

        let ctx = scheduler.context();
        assert_eq!(ctx.peers[0].state, PeerState::Zombie);
        assert!(ctx.state.header_sync_complete());
        assert_eq!(ctx.stash.numbers(), (1..=600).collect::<Vec<_>>());
        assert!(ctx.state.stats.bad_batches >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_peer_trips_the_zombie_threshold() {
        let genesis = B256::repeat_byte(1);
        let (run, client) = network(100);

        let mut scheduler = SyncScheduler::new(genesis, VecStash::default());
        scheduler.add_peer(client.clone().stalling());
        scheduler.add_peer(client);

        scheduler.beacon_hook().on_new_beacon_head(run[99].clone());
        drive(&mut scheduler, 16).await;

        let ctx = scheduler.context();
        assert_eq!(ctx.peers[0].state, PeerState::Zombie);
        assert!(ctx.state.header_sync_complete());
    }

    #[tokio::test]
    async fn a_new_finalized_head_reopens_the_layout() {
        let genesis = B256::repeat_byte(1);
        let (run, client) = network(400);

        let mut scheduler = SyncScheduler::new(genesis, VecStash::default());
        scheduler.add_peer(client);

        scheduler.beacon_hook().on_new_beacon_head(run[199].clone());
        drive(&mut scheduler, 32).await;
        assert!(scheduler.context().state.header_sync_complete());
        assert_eq!(scheduler.context().stash.numbers().len(), 200);

        scheduler.beacon_hook().on_new_beacon_head(run[399].clone());
        drive(&mut scheduler, 32).await;
        let ctx = scheduler.context();
        assert!(ctx.state.header_sync_complete());
        assert_eq!(ctx.stash.numbers(), (1..=400).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn backtrack_walks_to_a_known_ancestor() {
        let genesis = B256::repeat_byte(1);
        let (run, client) = network(300);

        let mut scheduler = SyncScheduler::new(genesis, VecStash::default());
        scheduler.add_peer(client);
        // Blocks up to 250 are already persisted.
        scheduler.context_mut().stash.seed(&run[..250]);

        // An import failure with an unknown parent arms backtracking
        // from block 260's parent.
        let recovery = scheduler
            .context_mut()
            .state
            .report_import_failure(&run[259], false);
        assert_eq!(recovery, crate::ImportRecovery::BacktrackArmed);

        drive(&mut scheduler, 16).await;
        let ctx = scheduler.context();
        assert!(ctx.state.backtrack.is_none());
        // The branch below the failure point was restashed down to the
        // persisted region.
        assert!(ctx.stash.has_header(run[258].seal()));
    }
}
