// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cache facade.
//!
//! [`PlantCache`] is the only surface presentation code should touch. It
//! combines the record store, the connectivity monitor and the sync
//! coordinator, and keeps an in-memory mirror of the store for cheap reads.
//!
//! The mirror is rebuilt from the store after every mutation (and after
//! every pass), never patched in place, so it cannot drift from what is
//! actually persisted.
//!
//! # Lifecycle
//!
//! ```text
//! new/open → start (load mirror, listen for reconnects) → ... → close
//! ```

mod types;

pub use types::{CacheError, CacheStatus, Notice, SavedRecord};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::catalog::CatalogLookup;
use crate::config::{CacheConfig, DEFAULT_DB_PATH};
use crate::connectivity::{spawn_health_probe, ConnectivityEvent, ConnectivityMonitor};
use crate::coordinator::{CoordinatorStats, SyncCoordinator, SyncOutcome, SyncReport};
use crate::metrics::LatencyTimer;
use crate::record::{IdentifiedRecord, RecordDraft};
use crate::remote::{HttpRemote, RemoteSink};
use crate::storage::{RecordStore, SqliteRecordStore, StorageError};

const NOTICE_CAPACITY: usize = 32;

/// Everything a background pass needs, detached from the facade's lifetime.
#[derive(Clone)]
struct SyncDriver {
    coordinator: Arc<SyncCoordinator>,
    store: Arc<dyn RecordStore>,
    mirror: Arc<RwLock<Vec<IdentifiedRecord>>>,
    /// Serializes snapshot + swap so an older snapshot never lands last
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
    notices: broadcast::Sender<Notice>,
}

impl SyncDriver {
    async fn run(&self) -> SyncOutcome {
        let outcome = self.coordinator.run_pass().await;

        if let SyncOutcome::Completed(report) = &outcome {
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "Mirror refresh after sync pass failed");
            }
            self.announce(report);
        }
        outcome
    }

    fn announce(&self, report: &SyncReport) {
        if report.synced > 0 {
            self.notify(Notice::Synced { count: report.synced });
        }
        if report.failed > 0 || report.error.is_some() {
            self.notify(Notice::SyncFailed { failed: report.failed });
        }
    }

    async fn refresh(&self) -> Result<(), StorageError> {
        let _serial = self.refresh_lock.lock().await;
        let records = self.store.list_all().await?;
        let unsynced = records.iter().filter(|r| !r.synced).count();
        *self.mirror.write() = records;
        crate::metrics::set_unsynced_records(unsynced);
        Ok(())
    }

    fn notify(&self, notice: Notice) {
        debug!(%notice, "Notice");
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }
}

/// Offline-first cache of identification records.
pub struct PlantCache {
    config: CacheConfig,
    store: Arc<dyn RecordStore>,
    remote: Arc<dyn RemoteSink>,
    monitor: ConnectivityMonitor,
    driver: SyncDriver,
    catalog: Option<Arc<dyn CatalogLookup>>,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl PlantCache {
    /// Assemble a cache from explicitly constructed parts.
    ///
    /// The cache starts with an empty mirror; call [`start`](Self::start)
    /// to load it and begin listening for reconnects.
    pub fn new(
        store: Arc<dyn RecordStore>,
        remote: Arc<dyn RemoteSink>,
        monitor: ConnectivityMonitor,
        config: CacheConfig,
    ) -> Self {
        let coordinator = Arc::new(SyncCoordinator::new(
            store.clone(),
            remote.clone(),
            monitor.clone(),
        ));
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        Self {
            config,
            driver: SyncDriver {
                coordinator,
                store: store.clone(),
                mirror: Arc::new(RwLock::new(Vec::new())),
                refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
                notices,
            },
            store,
            remote,
            monitor,
            catalog: None,
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Open the SQLite store and HTTP remote described by `config`.
    ///
    /// `initially_online` is the platform's reachability signal at startup.
    pub async fn open(config: CacheConfig, initially_online: bool) -> Result<Self, CacheError> {
        let remote_url = config
            .remote_url
            .clone()
            .ok_or_else(|| CacheError::Config("remote_url is required".to_string()))?;
        let remote = HttpRemote::new(remote_url, config.remote_token.clone(), config.delivery_timeout())
            .map_err(|e| CacheError::Config(e.to_string()))?;

        let db_path = config.db_path.clone().unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let store = SqliteRecordStore::open_with(&db_path, config.compress_payloads).await?;

        Ok(Self::new(
            Arc::new(store),
            Arc::new(remote),
            ConnectivityMonitor::new(initially_online),
            config,
        ))
    }

    /// Resolve `reference_id` for drafts that don't carry one.
    #[must_use]
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogLookup>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Load the mirror, start background listeners and, when online, kick
    /// an initial pass for records left over from a previous run.
    ///
    /// Calling it again is a no-op returning `Ok(None)`.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<Option<JoinHandle<SyncOutcome>>, CacheError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(None);
        }

        if let Err(e) = self.driver.refresh().await {
            self.started.store(false, Ordering::Release);
            return Err(self.storage_failure("start", e));
        }

        let mut tasks = self.tasks.lock();
        tasks.push(self.spawn_connectivity_listener());
        if let Some(interval) = self.config.probe_interval() {
            info!(interval = ?interval, "Starting remote health probe");
            tasks.push(spawn_health_probe(
                self.monitor.clone(),
                self.remote.clone(),
                interval,
                self.config.offline_after_failures,
            ));
        }
        drop(tasks);

        let pending = self.unsynced_count();
        info!(records = self.driver.mirror.read().len(), pending, online = self.is_online(), "Plant cache started");

        Ok((pending > 0 && self.is_online()).then(|| self.spawn_sync()))
    }

    fn spawn_connectivity_listener(&self) -> JoinHandle<()> {
        // Subscribe before spawning so no transition is missed
        let mut events = self.monitor.subscribe();
        let driver = self.driver.clone();
        let sync_on_reconnect = self.config.sync_on_reconnect;

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ConnectivityEvent::BecameOnline => {
                        driver.notify(Notice::BackOnline);
                        if sync_on_reconnect {
                            let outcome = driver.run().await;
                            debug!(%outcome, "Reconnect pass finished");
                        }
                    }
                    ConnectivityEvent::BecameOffline => driver.notify(Notice::WentOffline),
                }
            }
        })
    }

    fn spawn_sync(&self) -> JoinHandle<SyncOutcome> {
        let driver = self.driver.clone();
        tokio::spawn(async move { driver.run().await })
    }

    fn storage_failure(&self, operation: &str, e: StorageError) -> CacheError {
        error!(operation, error = %e, "Storage failure");
        crate::metrics::record_storage_error(operation);
        crate::metrics::record_operation(operation, "error");
        self.driver.notify(Notice::StorageUnavailable(e.to_string()));
        CacheError::Storage(e)
    }

    /// Persist a new identification.
    ///
    /// The record is durable before any network attempt. When online (and
    /// `sync_on_save` is set) a pass is spawned; its handle is returned in
    /// [`SavedRecord::sync_task`].
    #[tracing::instrument(skip(self, draft), fields(display_name = %draft.display_name))]
    pub async fn save(&self, mut draft: RecordDraft) -> Result<SavedRecord, CacheError> {
        let _timer = LatencyTimer::new("save");
        draft.validate().map_err(CacheError::InvalidRecord)?;

        if draft.reference_id.is_none() {
            if let Some(catalog) = &self.catalog {
                draft.reference_id = catalog
                    .match_identification(&draft.display_name, &draft.scientific_name)
                    .map(|entry| entry.id);
            }
        }

        let record = IdentifiedRecord::from_draft(draft);
        if let Err(e) = self.store.put(&record).await {
            return Err(self.storage_failure("save", e));
        }
        crate::metrics::record_operation("save", "success");
        info!(id = %record.id, reference = ?record.reference_id, "Record saved");

        if let Err(e) = self.driver.refresh().await {
            warn!(error = %e, "Mirror refresh after save failed");
        }

        let online = self.is_online();
        self.driver.notify(if online { Notice::Saved } else { Notice::SavedOffline });

        let sync_task = (online && self.config.sync_on_save).then(|| self.spawn_sync());
        Ok(SavedRecord { record, sync_task })
    }

    /// Delete a record. Unknown ids are not an error.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, id: &str) -> Result<(), CacheError> {
        if let Err(e) = self.store.delete(id).await {
            return Err(self.storage_failure("remove", e));
        }
        crate::metrics::record_operation("remove", "success");

        if let Err(e) = self.driver.refresh().await {
            warn!(error = %e, "Mirror refresh after remove failed");
        }
        self.driver.notify(Notice::Removed);
        Ok(())
    }

    /// Run a pass now and wait for it. Dropped (not queued) if one is running.
    pub async fn trigger_sync(&self) -> SyncOutcome {
        self.driver.run().await
    }

    /// Reload the mirror from the store.
    pub async fn refresh(&self) -> Result<(), CacheError> {
        self.driver
            .refresh()
            .await
            .map_err(|e| self.storage_failure("refresh", e))
    }

    /// All records, newest first, as of the last mirror rebuild.
    #[must_use]
    pub fn records(&self) -> Vec<IdentifiedRecord> {
        self.driver.mirror.read().clone()
    }

    #[must_use]
    pub fn unsynced_count(&self) -> usize {
        self.driver.mirror.read().iter().filter(|r| !r.synced).count()
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.monitor.is_online()
    }

    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.driver.coordinator.is_syncing()
    }

    #[must_use]
    pub fn status(&self) -> CacheStatus {
        let mirror = self.driver.mirror.read();
        CacheStatus {
            online: self.is_online(),
            syncing: self.is_syncing(),
            total: mirror.len(),
            unsynced: mirror.iter().filter(|r| !r.synced).count(),
        }
    }

    /// The monitor the host feeds its reachability signal into.
    pub fn monitor(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    pub fn watch_online(&self) -> watch::Receiver<bool> {
        self.monitor.watch()
    }

    pub fn watch_syncing(&self) -> watch::Receiver<bool> {
        self.driver.coordinator.watch_syncing()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.driver.notices.subscribe()
    }

    pub fn subscribe_reports(&self) -> broadcast::Receiver<SyncReport> {
        self.driver.coordinator.subscribe()
    }

    #[must_use]
    pub fn sync_stats(&self) -> CoordinatorStats {
        self.driver.coordinator.stats()
    }

    /// Stop background tasks, wait for an in-flight pass to finish, then
    /// close the store.
    pub async fn close(&self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let mut syncing = self.watch_syncing();
        let busy = *syncing.borrow();
        if busy {
            debug!("Waiting for in-flight sync pass before closing");
        }
        // Sender lives in the coordinator we hold, so this only ends on `false`
        let _ = syncing.wait_for(|busy| !*busy).await;

        self.store.close().await;
        self.started.store(false, Ordering::Release);
        info!("Plant cache closed");
    }
}
