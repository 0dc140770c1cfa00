//! Tuning constants for the header syncer.

use core::time::Duration;

/// Maximum headers in one fetch request (and in one wire reply).
pub const FETCH_HEADERS_REQUEST: u64 = 1024;

/// Upper bound on an opportunistically expanded reservation, filled
/// across several passes.
pub const FETCH_HEADERS_OPPORTUNISTIC: u64 = 8 * 1024;

/// How long a header request may stall before the peer is zombified.
pub const FETCH_HEADERS_ZOMBIE_THRESHOLD: Duration = Duration::from_secs(2);

/// Sleep applied by a worker that finds nothing to do.
pub const WORKER_IDLE_WAIT: Duration = Duration::from_secs(1);

/// Staged-queue length beyond which everything is flushed and refetched.
pub const STAGED_QUEUE_HWM: usize = 40;

/// Staged-queue length that triggers a serialized pool merge pass.
pub const STAGED_QUEUE_LWM: usize = 24;

/// Interval between daemon housekeeping ticks.
pub const DAEMON_TICK: Duration = Duration::from_secs(1);
