//! The externally fed finalized-head slot.

use alloy_consensus::{Header, Sealed};
use alloy_primitives::B256;
use std::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct Slot {
    header: Option<Sealed<Header>>,
    changed: bool,
}

/// The injection point for beacon-finalized heads.
///
/// The RPC layer calls [BeaconHead::on_new_beacon_head] from outside;
/// the syncer's daemon drains it with [BeaconHead::take_changed].
/// Updates are idempotent and monotone in block number, so replayed or
/// stale announcements are absorbed here.
#[derive(Debug, Default)]
pub struct BeaconHead {
    slot: Mutex<Slot>,
}

impl BeaconHead {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a finalized header if it is newer than the current one.
    pub fn on_new_beacon_head(&self, header: Sealed<Header>) {
        let mut slot = self.slot.lock().expect("beacon slot poisoned");
        let newer = slot.header.as_ref().map_or(true, |h| header.number > h.number);
        if newer {
            debug!(target: "sync", number = header.number, hash = %header.seal(), "new beacon head");
            slot.header = Some(header);
            slot.changed = true;
        }
    }

    /// The current finalized header, when the slot holds a fresh one;
    /// clears the changed marker.
    pub fn take_changed(&self) -> Option<Sealed<Header>> {
        let mut slot = self.slot.lock().expect("beacon slot poisoned");
        if !slot.changed {
            return None;
        }
        slot.changed = false;
        slot.header.clone()
    }

    /// The current finalized `(number, hash)`, changed or not.
    pub fn current(&self) -> Option<(u64, B256)> {
        let slot = self.slot.lock().expect("beacon slot poisoned");
        slot.header.as_ref().map(|h| (h.number, h.seal()))
    }
}
