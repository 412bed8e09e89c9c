//! # Plant Cache
//!
//! Offline-first local cache for plant identification records, with
//! sequential reconciliation against a remote acceptance service.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PlantCache (facade)                     │
//! │  • save / remove / records / status                        │
//! │  • Mirror of the store, rebuilt after every mutation       │
//! │  • User-facing notices                                     │
//! └─────────────────────────────────────────────────────────────┘
//!          │                    │                     │
//!          ▼                    ▼                     ▼
//! ┌────────────────┐  ┌────────────────────┐  ┌──────────────────┐
//! │  RecordStore   │  │  SyncCoordinator   │  │ ConnectivityMon. │
//! │  SQLite (WAL)  │◀─│  one pass at once  │◀─│ edge events      │
//! │  or in-memory  │  │  remote accept →   │  │ optional health  │
//! │                │  │  mark synced       │  │ probe            │
//! └────────────────┘  └────────────────────┘  └──────────────────┘
//!                               │
//!                               ▼
//!                      ┌──────────────────┐
//!                      │   RemoteSink     │
//!                      │   (HTTP JSON)    │
//!                      └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plant_cache::{CacheConfig, PlantCache, RecordDraft};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CacheConfig {
//!         db_path: Some("./plants.db".into()),
//!         remote_url: Some("https://api.example.org/v1".into()),
//!         ..Default::default()
//!     };
//!
//!     let cache = PlantCache::open(config, false).await.expect("Failed to open");
//!     cache.start().await.expect("Failed to start");
//!
//!     // Durable immediately, synced once connectivity returns
//!     let draft = RecordDraft::new("Tulasi", "Ocimum tenuiflorum", 0.93, "data:image/jpeg;base64,...");
//!     let saved = cache.save(draft).await.expect("Failed to save");
//!     println!("Saved {} (synced: {})", saved.record.id, saved.record.synced);
//!
//!     // Host reports reachability; the transition kicks a pass
//!     cache.monitor().set_online(true);
//!
//!     cache.close().await;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`cache`]: The [`PlantCache`] facade
//! - [`record`]: Record model, ids and creation timestamps
//! - [`storage`]: Record stores (SQLite, in-memory)
//! - [`coordinator`]: Sync passes against the remote
//! - [`connectivity`]: Online/offline state and transition events
//! - [`remote`]: Remote acceptance service client
//! - [`catalog`]: Reference catalog lookup
//! - [`resilience`]: Retry logic for the local store

pub mod config;
pub mod record;
pub mod storage;
pub mod compression;
pub mod resilience;
pub mod remote;
pub mod connectivity;
pub mod coordinator;
pub mod cache;
pub mod catalog;
pub mod metrics;

pub use config::CacheConfig;
pub use cache::{PlantCache, CacheError, CacheStatus, Notice, SavedRecord};
pub use record::{IdentifiedRecord, RecordDraft};
pub use storage::{RecordStore, StorageError, InMemoryRecordStore, SqliteRecordStore};
pub use connectivity::{ConnectivityMonitor, ConnectivityEvent, ConnectivitySubscription, ReachabilityChecker};
pub use coordinator::{SyncCoordinator, CoordinatorStats, SyncOutcome, SyncReport, SkipReason};
pub use remote::{RemoteSink, DeliveryError, HttpRemote};
pub use catalog::{CatalogEntry, CatalogLookup, StaticCatalog};
pub use resilience::retry::RetryConfig;
pub use metrics::LatencyTimer;
