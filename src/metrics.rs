// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for plant-cache.
//!
//! Uses the `metrics` crate for backend-agnostic collection. The host app
//! picks the exporter (Prometheus, OTEL, a debug overlay, ...).
//!
//! # Metric Naming Convention
//! - `plant_cache_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: save, remove, refresh, sync
//! - `status`: success, error, skipped
//! - `reason`: rejected, unreachable, timeout, already_syncing, offline, nothing_pending

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a facade operation outcome
pub fn record_operation(operation: &str, status: &str) {
    counter!(
        "plant_cache_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "plant_cache_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a delivery accepted by the remote side
pub fn record_delivery_success() {
    counter!("plant_cache_deliveries_total", "status" => "success").increment(1);
}

/// Record a failed delivery, by failure kind
pub fn record_delivery_failure(reason: &str) {
    counter!(
        "plant_cache_deliveries_total",
        "status" => "error",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a pass that did not run
pub fn record_pass_skipped(reason: &str) {
    counter!(
        "plant_cache_sync_passes_total",
        "status" => "skipped",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record a completed pass
pub fn record_pass_completed(synced: usize, failed: usize, duration: Duration) {
    let status = if failed == 0 { "success" } else { "partial" };
    counter!("plant_cache_sync_passes_total", "status" => status).increment(1);
    counter!("plant_cache_records_synced_total").increment(synced as u64);
    histogram!("plant_cache_sync_pass_seconds").record(duration.as_secs_f64());
}

/// Set number of records awaiting sync
pub fn set_unsynced_records(count: usize) {
    gauge!("plant_cache_unsynced_records").set(count as f64);
}

/// Set connectivity (1 = online, 0 = offline)
pub fn set_online(online: bool) {
    gauge!("plant_cache_online").set(if online { 1.0 } else { 0.0 });
}

/// Record a storage failure
pub fn record_storage_error(operation: &str) {
    counter!(
        "plant_cache_storage_errors_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record payload corruption detection
pub fn record_corruption() {
    counter!("plant_cache_corruption_detected_total").increment(1);
}

/// Records elapsed time for an operation when dropped.
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // No recorder installed: these only check the calls don't panic.

    #[test]
    fn test_counters() {
        record_operation("save", "success");
        record_delivery_success();
        record_delivery_failure("rejected");
        record_pass_skipped("offline");
        record_storage_error("save");
        record_corruption();
    }

    #[test]
    fn test_pass_and_gauges() {
        record_pass_completed(2, 1, Duration::from_millis(40));
        set_unsynced_records(1);
        set_online(true);
    }

    #[test]
    fn test_latency_timer() {
        let _timer = LatencyTimer::new("save");
        std::thread::sleep(Duration::from_millis(1));
    }
}
