//! Storage Engine Metrics
//!
//! Lock-free counters describing how transfers were admitted and which path
//! they took to obtain a destination slot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Storage engine counters
#[derive(Debug, Default)]
pub struct StorageMetrics {
    /// Requests that passed validation
    admitted: AtomicU64,
    /// Requests rejected with a `TransferError`
    rejected: AtomicU64,
    /// Transfers whose `perform` returned and were committed
    completed: AtomicU64,
    /// Destination slots taken from unused capacity
    free_grants: AtomicU64,
    /// Destination slots claimed from a releasing owner
    releasing_claims: AtomicU64,
    /// Transfers that had to wait in a device queue
    queued_waits: AtomicU64,
    /// Source slots handed directly to a queued successor
    vacate_handoffs: AtomicU64,
    /// Cycles of moves resolved at once
    cycles_closed: AtomicU64,
    /// Queued transfers released by cycle closing
    cycle_participants: AtomicU64,
}

impl StorageMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_free_grant(&self) {
        self.free_grants.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_releasing_claim(&self) {
        self.releasing_claims.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_queued_wait(&self) {
        self.queued_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_vacate_handoff(&self) {
        self.vacate_handoffs.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a closed cycle with `participants` queued transfers in it
    pub(crate) fn record_cycle(&self, participants: usize) {
        self.cycles_closed.fetch_add(1, Ordering::Relaxed);
        self.cycle_participants
            .fetch_add(participants as u64, Ordering::Relaxed);
    }

    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn cycles_closed(&self) -> u64 {
        self.cycles_closed.load(Ordering::Relaxed)
    }

    /// Take a snapshot of current metrics
    pub fn snapshot(&self) -> StorageMetricsSnapshot {
        StorageMetricsSnapshot {
            admitted: self.admitted(),
            rejected: self.rejected(),
            completed: self.completed(),
            free_grants: self.free_grants.load(Ordering::Relaxed),
            releasing_claims: self.releasing_claims.load(Ordering::Relaxed),
            queued_waits: self.queued_waits.load(Ordering::Relaxed),
            vacate_handoffs: self.vacate_handoffs.load(Ordering::Relaxed),
            cycles_closed: self.cycles_closed(),
            cycle_participants: self.cycle_participants.load(Ordering::Relaxed),
        }
    }
}

/// Serializable metrics for monitoring/display
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageMetricsSnapshot {
    pub admitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub free_grants: u64,
    pub releasing_claims: u64,
    pub queued_waits: u64,
    pub vacate_handoffs: u64,
    pub cycles_closed: u64,
    pub cycle_participants: u64,
}

impl StorageMetricsSnapshot {
    /// Admitted transfers that have not committed yet
    pub fn in_progress(&self) -> u64 {
        self.admitted.saturating_sub(self.completed)
    }
}
