// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync coordinator.
//!
//! Reconciles unsynced records with the remote acceptance service, one pass
//! at a time.
//!
//! # Pass
//!
//! ```text
//! try-acquire guard ─busy─▶ Skipped(AlreadySyncing)
//!        │
//!     online? ──no──▶ Skipped(Offline)
//!        │
//!  list_unsynced ──empty──▶ Skipped(NothingPending)
//!        │
//!  for each record (sequential):
//!     deliver ──ok──▶ mark_synced
//!        └──err──▶ leave queued
//!        │
//!  release guard → publish SyncReport
//! ```
//!
//! A pass requested while another is running is dropped, not queued. The
//! next reconnect or explicit trigger picks up whatever is still unsynced.

mod types;

pub use types::{SkipReason, SyncOutcome, SyncReport};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::connectivity::ConnectivityMonitor;
use crate::remote::RemoteSink;
use crate::storage::RecordStore;

const REPORT_CAPACITY: usize = 16;

/// Coordinator counters for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorStats {
    /// Passes that ran to completion since startup
    pub passes_completed: u64,
    /// Records marked synced since startup
    pub total_synced: u64,
    /// Deliveries that failed since startup
    pub total_failed: u64,
    /// Whether a pass is in flight right now
    pub syncing: bool,
}

pub struct SyncCoordinator {
    store: Arc<dyn RecordStore>,
    remote: Arc<dyn RemoteSink>,
    monitor: ConnectivityMonitor,
    /// Pass guard
    syncing: AtomicBool,
    /// Mirror of the guard for UI binding
    syncing_tx: watch::Sender<bool>,
    reports: broadcast::Sender<SyncReport>,
    passes_completed: AtomicU64,
    total_synced: AtomicU64,
    total_failed: AtomicU64,
}

impl SyncCoordinator {
    pub fn new(
        store: Arc<dyn RecordStore>,
        remote: Arc<dyn RemoteSink>,
        monitor: ConnectivityMonitor,
    ) -> Self {
        let (syncing_tx, _) = watch::channel(false);
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        Self {
            store,
            remote,
            monitor,
            syncing: AtomicBool::new(false),
            syncing_tx,
            reports,
            passes_completed: AtomicU64::new(0),
            total_synced: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
        }
    }

    /// Run one sync pass. Never fails: per-record and pass-level problems
    /// end up in the returned report.
    #[tracing::instrument(skip(self))]
    pub async fn run_pass(&self) -> SyncOutcome {
        if self.syncing.swap(true, Ordering::AcqRel) {
            debug!("Sync pass already in flight, dropping request");
            return Self::skipped(SkipReason::AlreadySyncing);
        }
        let guard = PassGuard::new(&self.syncing, &self.syncing_tx);

        if !self.monitor.is_online() {
            debug!("Offline, not contacting remote");
            return Self::skipped(SkipReason::Offline);
        }

        let started = Instant::now();
        let pending = match self.store.list_unsynced().await {
            Ok(pending) => pending,
            Err(e) => {
                error!(error = %e, "Could not read unsynced records");
                crate::metrics::record_storage_error("list_unsynced");
                drop(guard);
                return self.finish(
                    SyncReport {
                        error: Some(e.to_string()),
                        ..Default::default()
                    },
                    started,
                );
            }
        };

        if pending.is_empty() {
            return Self::skipped(SkipReason::NothingPending);
        }

        info!(pending = pending.len(), "Starting sync pass");
        let mut report = SyncReport {
            attempted: pending.len(),
            ..Default::default()
        };

        for record in &pending {
            if let Err(e) = self.remote.deliver(record).await {
                warn!(id = %record.id, error = %e, "Delivery failed, record stays queued");
                crate::metrics::record_delivery_failure(e.kind());
                report.failed += 1;
                continue;
            }
            crate::metrics::record_delivery_success();

            // The remote accept is the only signal we trust for the flip
            match self.store.mark_synced(&record.id).await {
                Ok(true) => {
                    debug!(id = %record.id, "Record synced");
                    report.synced += 1;
                }
                Ok(false) => {
                    debug!(id = %record.id, "Record removed locally after remote accepted it");
                    report.synced += 1;
                }
                Err(e) => {
                    // Redelivered next pass; remote upsert makes that safe
                    warn!(id = %record.id, error = %e, "Accepted record could not be marked synced");
                    crate::metrics::record_storage_error("mark_synced");
                    report.failed += 1;
                }
            }
        }

        drop(guard);
        self.finish(report, started)
    }

    fn skipped(reason: SkipReason) -> SyncOutcome {
        crate::metrics::record_pass_skipped(reason.as_str());
        SyncOutcome::Skipped(reason)
    }

    fn finish(&self, report: SyncReport, started: Instant) -> SyncOutcome {
        let elapsed = started.elapsed();
        self.passes_completed.fetch_add(1, Ordering::Relaxed);
        self.total_synced.fetch_add(report.synced as u64, Ordering::Relaxed);
        self.total_failed.fetch_add(report.failed as u64, Ordering::Relaxed);
        crate::metrics::record_pass_completed(report.synced, report.failed, elapsed);

        if report.is_success() {
            info!(synced = report.synced, elapsed = ?elapsed, "Sync pass complete");
        } else {
            warn!(
                synced = report.synced,
                failed = report.failed,
                error = ?report.error,
                "Sync pass finished with failures"
            );
        }

        // No subscribers is fine
        let _ = self.reports.send(report.clone());
        SyncOutcome::Completed(report)
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// Level view of the in-flight flag.
    pub fn watch_syncing(&self) -> watch::Receiver<bool> {
        self.syncing_tx.subscribe()
    }

    /// Reports of completed passes.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncReport> {
        self.reports.subscribe()
    }

    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            passes_completed: self.passes_completed.load(Ordering::Relaxed),
            total_synced: self.total_synced.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            syncing: self.is_syncing(),
        }
    }
}

/// RAII guard that releases the pass flag.
struct PassGuard<'a> {
    flag: &'a AtomicBool,
    status: &'a watch::Sender<bool>,
}

impl<'a> PassGuard<'a> {
    fn new(flag: &'a AtomicBool, status: &'a watch::Sender<bool>) -> Self {
        status.send_replace(true);
        Self { flag, status }
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
        self.status.send_replace(false);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use crate::record::IdentifiedRecord;
    use crate::remote::{DeliveryError, RemoteSink};

    /// Remote double: rejects configured display names, counts calls, and
    /// can hold deliveries until released.
    #[derive(Default)]
    pub struct ScriptedRemote {
        pub reject_names: Mutex<HashSet<String>>,
        pub delivered: Mutex<Vec<String>>,
        pub calls: AtomicUsize,
        pub gate: Option<(Notify, Notify)>,
    }

    impl ScriptedRemote {
        pub fn rejecting(names: &[&str]) -> Self {
            Self {
                reject_names: Mutex::new(names.iter().map(|n| n.to_string()).collect()),
                ..Default::default()
            }
        }

        /// Each delivery signals `started` then waits on `release`.
        pub fn gated() -> Self {
            Self {
                gate: Some((Notify::new(), Notify::new())),
                ..Default::default()
            }
        }

        pub async fn wait_started(&self) {
            if let Some((started, _)) = &self.gate {
                started.notified().await;
            }
        }

        pub fn release(&self) {
            if let Some((_, release)) = &self.gate {
                release.notify_one();
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RemoteSink for ScriptedRemote {
        async fn deliver(&self, record: &IdentifiedRecord) -> Result<(), DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some((started, release)) = &self.gate {
                started.notify_one();
                release.notified().await;
            }
            if self.reject_names.lock().contains(&record.display_name) {
                return Err(DeliveryError::Rejected("422 Unprocessable Entity".into()));
            }
            self.delivered.lock().push(record.id.clone());
            Ok(())
        }
    }
}
