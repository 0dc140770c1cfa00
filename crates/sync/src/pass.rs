//! Sync passes: the function table a pass exposes to the scheduler.

use crate::{
    constants::{FETCH_HEADERS_REQUEST, FETCH_HEADERS_ZOMBIE_THRESHOLD},
    FetchRequest, HeaderStash, LinkedHChain, PeerClient, PeerState, StageOutcome, SyncContext,
};
use alloy_primitives::B256;
use async_trait::async_trait;
use tracing::{error, info, warn};

/// What a pass invocation tells the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassControl {
    /// Work was done; keep scheduling.
    Continue,
    /// Nothing to do right now.
    Idle,
    /// Stop the sync loop.
    Halt,
}

/// One synchronization pass as a table of entry points.
///
/// The scheduler owns exactly one active pass and dispatches into it;
/// swapping passes calls `release` on the old and `setup` on the new.
/// `single` runs a peer exclusively, `multi` runs peers that declared
/// `multi_ok`, `pool` is the serialized whole-state pass, and `daemon`
/// is the background housekeeping tick.
#[async_trait]
pub trait SyncPass<C, S>: Send
where
    C: PeerClient + Send,
    S: HeaderStash + Send,
{
    /// Prepares pass-local state when the pass becomes active.
    fn setup(&mut self, _ctx: &mut SyncContext<C, S>) {}

    /// Tears pass-local state down before a switch.
    fn release(&mut self, _ctx: &mut SyncContext<C, S>) {}

    /// Whether the given peer may participate.
    fn start(&mut self, ctx: &mut SyncContext<C, S>, peer: usize) -> bool {
        ctx.peers[peer].is_running()
    }

    /// Retires a peer from this pass.
    fn stop(&mut self, ctx: &mut SyncContext<C, S>, peer: usize) {
        ctx.peers[peer].state = PeerState::Stopped;
    }

    /// Exclusive single-peer step.
    async fn single(&mut self, ctx: &mut SyncContext<C, S>, peer: usize) -> PassControl;

    /// Parallel-eligible per-peer step.
    async fn multi(&mut self, ctx: &mut SyncContext<C, S>, peer: usize) -> PassControl;

    /// Serialized whole-state step.
    async fn pool(&mut self, ctx: &mut SyncContext<C, S>) -> PassControl;

    /// Background housekeeping step.
    async fn daemon(&mut self, ctx: &mut SyncContext<C, S>) -> PassControl;
}

/// The header-chain download pass.
#[derive(Debug, Default)]
pub struct HeaderSyncPass;

impl HeaderSyncPass {
    /// One worker iteration: drain the beacon slot, then either
    /// backtrack, fetch-validate-stage, or report idle.
    async fn worker<C, S>(ctx: &mut SyncContext<C, S>, index: usize) -> PassControl
    where
        C: PeerClient + Send,
        S: HeaderStash + Send,
    {
        if let Some(head) = ctx.beacon.take_changed() {
            ctx.state.update_beacon(&head);
        }

        if let Some(from) = ctx.state.backtrack {
            return Self::backtrack_step(ctx, index, from).await;
        }

        if ctx.state.unprocessed.is_empty() {
            return PassControl::Idle;
        }
        let Some(request) = ctx.state.reserve() else {
            return PassControl::Idle;
        };

        let reply = Self::fetch(ctx, index, &request).await;
        let chunk = match reply {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(
                    target: "sync",
                    peer = ctx.peers[index].id,
                    lo = request.lo,
                    hi = request.hi,
                    %e,
                    "bad header batch; zombifying peer"
                );
                ctx.state.bad_batch(request.lo, request.hi);
                ctx.peers[index].zombify();
                return PassControl::Continue;
            }
        };

        // Give back whatever part of the reservation the reply did not
        // cover.
        match request.anchor {
            Some(_) if chunk.bottom_number() > request.lo => {
                ctx.state.release(request.lo, chunk.bottom_number() - 1);
            }
            None if chunk.top_number() < request.hi => {
                ctx.state.release(chunk.top_number() + 1, request.hi);
            }
            _ => {}
        }
        ctx.peers[index].fetched_headers += chunk.len() as u64;

        if ctx.state.stage(chunk) == StageOutcome::FlushedHwm {
            return PassControl::Continue;
        }
        match ctx.state.process_staged(&mut ctx.stash) {
            Ok(_) => PassControl::Continue,
            Err(e) => {
                error!(target: "sync", %e, "stash rejected a linked run");
                PassControl::Halt
            }
        }
    }

    /// Issues the wire request for a reservation and validates the
    /// reply into a chunk.
    async fn fetch<C, S>(
        ctx: &mut SyncContext<C, S>,
        index: usize,
        request: &FetchRequest,
    ) -> Result<LinkedHChain, crate::SyncError>
    where
        C: PeerClient + Send,
        S: HeaderStash + Send,
    {
        let client = &mut ctx.peers[index].client;
        let wire = async {
            match request.anchor {
                Some(anchor) => client.headers_by_hash(anchor, request.count()).await,
                None => client.headers_by_number(request.lo, request.count()).await,
            }
        };
        let reply = tokio::time::timeout(FETCH_HEADERS_ZOMBIE_THRESHOLD, wire)
            .await
            .map_err(|_| crate::SyncError::Timeout)?
            .map_err(|e| crate::SyncError::Network(e.to_string()))?;

        let chunk = LinkedHChain::from_reply(reply)?;

        // The reply must actually cover the end of the reservation it
        // was asked for.
        let attached = match request.anchor {
            Some(anchor) => chunk.top_hash() == anchor && chunk.top_number() == request.hi,
            None => chunk.bottom_number() == request.lo && chunk.top_number() <= request.hi,
        };
        if !attached {
            return Err(crate::SyncError::WrongAnchor);
        }
        Ok(chunk)
    }

    /// One step of single-peer reorg backtracking: fetch the branch
    /// below `from`, stash it, and stop once a persisted ancestor is
    /// reached.
    async fn backtrack_step<C, S>(
        ctx: &mut SyncContext<C, S>,
        index: usize,
        from: B256,
    ) -> PassControl
    where
        C: PeerClient + Send,
        S: HeaderStash + Send,
    {
        let client = &mut ctx.peers[index].client;
        let reply = tokio::time::timeout(
            FETCH_HEADERS_ZOMBIE_THRESHOLD,
            client.headers_by_hash(from, FETCH_HEADERS_REQUEST),
        )
        .await;

        let chunk = match reply {
            Ok(Ok(headers)) => match LinkedHChain::from_reply(headers) {
                Ok(chunk) if chunk.top_hash() == from => chunk,
                _ => {
                    ctx.peers[index].zombify();
                    return PassControl::Continue;
                }
            },
            _ => {
                ctx.peers[index].zombify();
                return PassControl::Continue;
            }
        };

        let parent = chunk.parent_hash();
        let ascending = chunk.into_ascending();

        // Anything below the first unknown header is already canonical;
        // only the branch above it needs restashing.
        let split = ascending
            .iter()
            .position(|h| !ctx.stash.has_header(h.seal()))
            .unwrap_or(ascending.len());
        let connected = split > 0 || ctx.stash.has_header(parent);

        if let Err(e) = ctx.stash.stash_headers(&ascending[split..]) {
            error!(target: "sync", %e, "stash rejected backtracked headers");
            return PassControl::Halt;
        }

        if connected {
            info!(
                target: "sync",
                restashed = ascending.len() - split,
                "backtrack reconnected with a known ancestor"
            );
            ctx.state.backtrack = None;
        } else {
            ctx.state.backtrack = Some(parent);
        }
        PassControl::Continue
    }
}

#[async_trait]
impl<C, S> SyncPass<C, S> for HeaderSyncPass
where
    C: PeerClient + Send,
    S: HeaderStash + Send,
{
    async fn single(&mut self, ctx: &mut SyncContext<C, S>, peer: usize) -> PassControl {
        Self::worker(ctx, peer).await
    }

    async fn multi(&mut self, ctx: &mut SyncContext<C, S>, peer: usize) -> PassControl {
        Self::worker(ctx, peer).await
    }

    async fn pool(&mut self, ctx: &mut SyncContext<C, S>) -> PassControl {
        let before = ctx.state.staged.len();
        match ctx.state.process_staged(&mut ctx.stash) {
            Ok(stashed) if stashed > 0 || ctx.state.staged.len() < before => PassControl::Continue,
            Ok(_) => PassControl::Idle,
            Err(e) => {
                error!(target: "sync", %e, "stash rejected a linked run");
                PassControl::Halt
            }
        }
    }

    async fn daemon(&mut self, ctx: &mut SyncContext<C, S>) -> PassControl {
        if !ctx.daemon {
            return PassControl::Halt;
        }
        if let Some(head) = ctx.beacon.take_changed() {
            ctx.state.update_beacon(&head);
        }

        let stats = ctx.state.stats;
        tracing::debug!(
            target: "sync",
            base = ctx.state.layout.base,
            least = ctx.state.layout.least,
            finalized = ctx.state.layout.final_number,
            unprocessed = ctx.state.unprocessed.total(),
            staged = ctx.state.staged.len(),
            stashed = stats.stashed_headers,
            bad_batches = stats.bad_batches,
            "sync tick"
        );
        #[cfg(feature = "metrics")]
        crate::metrics::update(&ctx.state);

        PassControl::Continue
    }
}
