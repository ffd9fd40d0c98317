//! Deterministic jittered back-off slots for the registration retry loop.
//!
//! Many freshly provisioned nodes often start registering at the same
//! moment (a fleet rollout, a site coming back from an outage). Each node
//! derives its per-attempt back-off from its own external id, so repeated
//! runs of one node back off on a stable schedule while different nodes
//! desynchronize from each other. The slot function is pure — the actual
//! suspension is a separate, interruptible effect owned by the caller.

use std::time::Duration;

use xxhash_rust::xxh3::xxh3_64;

/// Seeded jitter source producing whole-second back-off slots in
/// `1..=slot_count`.
#[derive(Debug, Clone)]
pub struct RandomTimeSlot {
    seed: String,
    slot_count: u32,
}

impl RandomTimeSlot {
    pub fn new(seed: impl Into<String>, slot_count: u32) -> Self {
        Self {
            seed: seed.into(),
            slot_count: slot_count.max(1),
        }
    }

    /// The back-off slot for the given attempt index.
    pub fn slot_for_attempt(&self, attempt: u64) -> u32 {
        let hash = xxh3_64(format!("{}:{}", self.seed, attempt).as_bytes());
        (hash % u64::from(self.slot_count)) as u32 + 1
    }

    /// The back-off duration for the given attempt index, in whole
    /// seconds.
    pub fn duration_for_attempt(&self, attempt: u64) -> Duration {
        Duration::from_secs(u64::from(self.slot_for_attempt(attempt)))
    }
}
