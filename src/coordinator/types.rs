// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the sync coordinator.

/// Why a requested pass did not run. Not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another pass holds the guard
    AlreadySyncing,
    /// Connectivity monitor reports offline
    Offline,
    /// Nothing is waiting to be delivered
    NothingPending,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadySyncing => "already_syncing",
            Self::Offline => "offline",
            Self::NothingPending => "nothing_pending",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate result of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records the pass tried to deliver
    pub attempted: usize,
    /// Records accepted by the remote side and marked synced
    pub synced: usize,
    /// Records left unsynced for the next pass
    pub failed: usize,
    /// Pass-level failure (e.g. the unsynced list could not be read)
    pub error: Option<String>,
}

impl SyncReport {
    /// Check if every attempted record synced and the pass itself ran
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.error.is_none()
    }
}

/// What a call to [`super::SyncCoordinator::run_pass`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Skipped(SkipReason),
    Completed(SyncReport),
}

impl SyncOutcome {
    /// The report, if the pass ran.
    #[must_use]
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped(_) => None,
        }
    }

    /// Records synced by this call (0 when skipped).
    #[must_use]
    pub fn synced(&self) -> usize {
        self.report().map_or(0, |r| r.synced)
    }

    #[must_use]
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skipped(reason) => write!(f, "Skipped({})", reason),
            Self::Completed(r) => write!(f, "Completed(synced={}, failed={})", r.synced, r.failed),
        }
    }
}
