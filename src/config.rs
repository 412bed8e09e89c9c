// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the plant cache.
//!
//! # Example
//!
//! ```
//! use plant_cache::CacheConfig;
//!
//! // Minimal config (uses defaults)
//! let config = CacheConfig::default();
//! assert!(config.sync_on_save);
//! assert_eq!(config.delivery_timeout_ms, 10_000);
//!
//! // Full config
//! let config = CacheConfig {
//!     db_path: Some("./plants.db".into()),
//!     remote_url: Some("https://api.example.org/v1".into()),
//!     probe_interval_ms: 15_000,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;
use std::time::Duration;

/// Configuration for [`crate::PlantCache`].
///
/// All fields have defaults. [`crate::PlantCache::open`] needs `remote_url`;
/// `db_path` falls back to `./plant_cache.db`.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// SQLite file holding the records
    #[serde(default)]
    pub db_path: Option<String>,

    /// Base URL of the remote acceptance service
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Bearer token sent with each delivery
    #[serde(default)]
    pub remote_token: Option<String>,

    /// Per-delivery transport timeout
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    /// Kick a pass after each save while online
    #[serde(default = "default_true")]
    pub sync_on_save: bool,

    /// Kick a pass on every offline→online transition
    #[serde(default = "default_true")]
    pub sync_on_reconnect: bool,

    /// Remote health probe interval (0 = disabled, host drives connectivity)
    #[serde(default)]
    pub probe_interval_ms: u64,

    /// Consecutive failed probes before the device is considered offline
    #[serde(default = "default_offline_after_failures")]
    pub offline_after_failures: u64,

    /// Compress stored image payloads (needs the `compression` feature)
    #[serde(default)]
    pub compress_payloads: bool,
}

fn default_delivery_timeout_ms() -> u64 { 10_000 }
fn default_true() -> bool { true }
fn default_offline_after_failures() -> u64 { 3 }

pub(crate) const DEFAULT_DB_PATH: &str = "./plant_cache.db";

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            remote_url: None,
            remote_token: None,
            delivery_timeout_ms: default_delivery_timeout_ms(),
            sync_on_save: true,
            sync_on_reconnect: true,
            probe_interval_ms: 0,
            offline_after_failures: default_offline_after_failures(),
            compress_payloads: false,
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Probe interval, `None` when probing is disabled.
    #[must_use]
    pub fn probe_interval(&self) -> Option<Duration> {
        (self.probe_interval_ms > 0).then(|| Duration::from_millis(self.probe_interval_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_uses_defaults() {
        let config: CacheConfig = serde_json::from_str("{}").unwrap();
        assert!(config.db_path.is_none());
        assert!(config.sync_on_save);
        assert!(config.sync_on_reconnect);
        assert_eq!(config.delivery_timeout_ms, 10_000);
        assert_eq!(config.offline_after_failures, 3);
        assert!(config.probe_interval().is_none());
    }

    #[test]
    fn test_deserialize_overrides() {
        let config: CacheConfig = serde_json::from_str(
            r#"{"db_path": "/data/plants.db", "sync_on_save": false, "probe_interval_ms": 5000}"#,
        )
        .unwrap();
        assert_eq!(config.db_path.as_deref(), Some("/data/plants.db"));
        assert!(!config.sync_on_save);
        assert_eq!(config.probe_interval(), Some(Duration::from_secs(5)));
    }
}
