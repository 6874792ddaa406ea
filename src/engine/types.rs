//! Public types for the sync engine.

use std::fmt;

/// Process-wide sync state, as rendered by the banner and indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStatus {
    /// Mirrors the connectivity monitor
    pub is_online: bool,
    /// True only while a drain pass runs
    pub is_syncing: bool,
    /// Size of the pending-operation queue, quarantined entries included
    pub pending_count: usize,
}

impl SyncStatus {
    /// Whether to show the "N items pending sync / Sync Now" prompt.
    #[must_use]
    pub fn should_offer_sync(&self) -> bool {
        self.pending_count > 0 && self.is_online && !self.is_syncing
    }
}

/// Why a drain request did not start a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Offline,
    AlreadySyncing,
    Unauthenticated,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offline => write!(f, "offline"),
            Self::AlreadySyncing => write!(f, "already syncing"),
            Self::Unauthenticated => write!(f, "no authenticated user"),
        }
    }
}

/// Tally of one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    /// Active operations picked up by the pass
    pub total: usize,
    pub replayed: usize,
    /// Failed but still active
    pub failed: usize,
    /// Failed and moved to quarantine during this pass
    pub quarantined: usize,
    pub batches: usize,
}

impl DrainReport {
    /// Check if every operation replayed
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.quarantined == 0
    }
}

impl fmt::Display for DrainReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} replayed, {} failed, {} quarantined of {} in {} batches",
            self.replayed, self.failed, self.quarantined, self.total, self.batches
        )
    }
}

/// Result of a drain request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    Skipped(SkipReason),
    Completed(DrainReport),
    /// The queue could not be read; nothing was replayed
    Aborted(String),
}

impl DrainOutcome {
    #[must_use]
    pub fn report(&self) -> Option<&DrainReport> {
        match self {
            Self::Completed(report) => Some(report),
            _ => None,
        }
    }
}

/// Where a `save_for_offline` write went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Written to the remote store and mirrored locally
    Applied { id: String },
    /// Written locally and queued for replay
    Deferred { id: String, operation_id: i64 },
    /// Offline and the local store refused the write
    Rejected { reason: String },
}

impl SaveOutcome {
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Applied { id } | Self::Deferred { id, .. } => Some(id),
            Self::Rejected { .. } => None,
        }
    }

    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred { .. })
    }
}

/// Engine counters since construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncStats {
    pub passes_started: u64,
    pub operations_replayed: u64,
    pub operations_failed: u64,
    pub operations_quarantined: u64,
}

/// Per-operation replay result (internal use)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ReplayResult {
    Replayed,
    Failed,
    Quarantined,
}
