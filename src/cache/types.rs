// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the cache facade.

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::coordinator::SyncOutcome;
use crate::record::IdentifiedRecord;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum CacheError {
    /// The action did not persist
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("configuration error: {0}")]
    Config(String),
}

/// User-facing, non-fatal notices for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Saved while online; a pass is on its way
    Saved,
    /// Saved while offline; will sync on reconnect
    SavedOffline,
    Removed,
    BackOnline,
    WentOffline,
    Synced { count: usize },
    /// Some records stay queued for a later pass
    SyncFailed { failed: usize },
    StorageUnavailable(String),
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Saved => write!(f, "Plant saved"),
            Self::SavedOffline => write!(f, "Plant saved offline, will sync when online"),
            Self::Removed => write!(f, "Plant removed from history"),
            Self::BackOnline => write!(f, "Back online, syncing data"),
            Self::WentOffline => write!(f, "You are offline, changes will be saved locally"),
            Self::Synced { count } => write!(f, "Synced {} plant(s)", count),
            Self::SyncFailed { failed } => {
                write!(f, "Failed to sync {} plant(s), will retry later", failed)
            }
            Self::StorageUnavailable(reason) => write!(f, "Local storage unavailable: {}", reason),
        }
    }
}

/// Snapshot of cache state for UI binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStatus {
    pub online: bool,
    pub syncing: bool,
    pub total: usize,
    pub unsynced: usize,
}

/// Result of [`super::PlantCache::save`].
#[derive(Debug)]
pub struct SavedRecord {
    pub record: IdentifiedRecord,
    /// The pass kicked off by this save, if any. Await it or drop it;
    /// dropping does not cancel the pass.
    pub sync_task: Option<JoinHandle<SyncOutcome>>,
}
