//! Counters for the registration subsystem.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters, shared via `Arc` between the coordinator and client.
#[derive(Debug, Default)]
pub struct RegistrationMetrics {
    /// Nodes admitted by this authority since startup.
    nodes_registered: AtomicU64,
    /// Client-side join round trips attempted.
    join_attempts: AtomicU64,
    /// Candidates redirected to a delegated authority.
    redirects: AtomicU64,
    /// Candidates queued for operator approval.
    queued_requests: AtomicU64,
}

impl RegistrationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_nodes_registered(&self, count: u64) {
        self.nodes_registered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn incr_join_attempts(&self) {
        self.join_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_redirects(&self) {
        self.redirects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_queued_requests(&self) {
        self.queued_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot current values for reporting.
    pub fn snapshot(&self) -> RegistrationMetricsSnapshot {
        RegistrationMetricsSnapshot {
            nodes_registered: self.nodes_registered.load(Ordering::Relaxed),
            join_attempts: self.join_attempts.load(Ordering::Relaxed),
            redirects: self.redirects.load(Ordering::Relaxed),
            queued_requests: self.queued_requests.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`RegistrationMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationMetricsSnapshot {
    pub nodes_registered: u64,
    pub join_attempts: u64,
    pub redirects: u64,
    pub queued_requests: u64,
}
