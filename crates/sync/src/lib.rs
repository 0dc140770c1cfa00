#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod constants;

mod errors;
pub use errors::{SyncError, SyncResult};

mod traits;
pub use traits::{HeaderStash, PeerClient};

mod intervals;
pub use intervals::BlockRangeSet;

mod chunk;
pub use chunk::{LinkedHChain, StagedQueue};

mod layout;
pub use layout::SyncLayout;

mod beacon;
pub use beacon::BeaconHead;

mod peer;
pub use peer::{Peer, PeerState};

mod state;
pub use state::{FetchRequest, ImportRecovery, StageOutcome, SyncState, SyncStats};

mod pass;
pub use pass::{HeaderSyncPass, PassControl, SyncPass};

mod scheduler;
pub use scheduler::{SyncContext, SyncScheduler};

#[cfg(feature = "metrics")]
pub mod metrics;

#[cfg(test)]
mod test_support;
