//! Scheduling counters.

use serde::{Deserialize, Serialize};

/// Monotonic counters describing scheduler activity.
///
/// The scheduler only increments; the embedder snapshots and exports
/// them through whatever reporting pipeline it runs.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    /// Atoms reported completed, for any reason.
    pub atoms_completed: u64,
    /// Atoms handed to the hardware.
    pub atoms_dispatched: u64,
    /// Atoms failed without dispatch because a dependency failed.
    pub dependency_failures: u64,
    /// Soft stops requested to make room for a higher-priority atom.
    pub preemption_soft_stops: u64,
    /// Soft stops requested on tick expiry.
    pub tick_preemptions: u64,
    /// Atoms hard-stopped by hang recovery or teardown.
    pub hard_stops: u64,
    /// Protected-mode transitions, in either direction.
    pub mode_switches: u64,
    /// Semaphore waits that exceeded their deadline.
    pub semaphore_timeouts: u64,
    /// Atoms dropped by connection cancellation.
    pub atoms_canceled: u64,
}
