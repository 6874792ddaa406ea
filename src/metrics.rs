// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the offline sync core.
//!
//! Uses the `metrics` crate for backend-agnostic collection. The host app
//! picks the exporter.
//!
//! # Metric Naming Convention
//! - `offline_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `kind`: request, pledge, message, user (operation kinds) or table names
//! - `outcome`: success, failure, quarantined, skipped

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record the outcome of replaying one pending operation
pub fn record_replay(kind: &str, outcome: &str) {
    counter!(
        "offline_sync_replays_total",
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record an operation moving to quarantine
pub fn record_quarantined(kind: &str) {
    counter!(
        "offline_sync_quarantined_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Set current pending-operation queue size
pub fn set_pending_operations(count: usize) {
    gauge!("offline_sync_pending_operations").set(count as f64);
}

/// Set connectivity (1 = online, 0 = offline)
pub fn set_online(online: bool) {
    gauge!("offline_sync_online").set(if online { 1.0 } else { 0.0 });
}

/// Record a finished (or skipped) drain pass
pub fn record_drain_pass(outcome: &str, duration: Duration) {
    counter!(
        "offline_sync_drain_passes_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!("offline_sync_drain_pass_seconds").record(duration.as_secs_f64());
}

/// Record size of one replay batch
pub fn record_batch_size(count: usize) {
    histogram!("offline_sync_batch_size").record(count as f64);
}

/// Record where a save landed: applied, deferred, rejected
pub fn record_save(kind: &str, path: &str) {
    counter!(
        "offline_sync_saves_total",
        "kind" => kind.to_string(),
        "path" => path.to_string()
    )
    .increment(1);
}

/// Record where a cache refresh was served from: remote, local_fallback, error
pub fn record_refresh(table: &str, source: &str) {
    counter!(
        "offline_sync_refreshes_total",
        "table" => table.to_string(),
        "source" => source.to_string()
    )
    .increment(1);
}

/// Record an error with category for alerting
pub fn record_error(component: &str, operation: &str) {
    counter!(
        "offline_sync_errors_total",
        "component" => component.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(component: &str, operation: &str, duration: Duration) {
    histogram!(
        "offline_sync_operation_seconds",
        "component" => component.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// RAII timer that records latency on drop.
pub struct LatencyTimer {
    component: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(component: &'static str, operation: &'static str) -> Self {
        Self {
            component,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.component, self.operation, self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    // These verify the API doesn't panic without a recorder installed.

    #[test]
    fn test_counters_and_gauges() {
        record_replay("request", "success");
        record_replay("message", "failure");
        record_quarantined("pledge");
        record_save("user", "deferred");
        record_refresh("requests", "local_fallback");
        record_error("local_store", "enqueue");
        set_pending_operations(3);
        set_online(false);
    }

    #[test]
    fn test_histograms() {
        record_drain_pass("completed", Duration::from_millis(12));
        record_batch_size(10);
        record_latency("remote", "add_document", Duration::from_micros(800));
    }

    #[test]
    fn test_latency_timer() {
        {
            let _timer = LatencyTimer::new("drain", "pass");
            std::thread::sleep(Duration::from_micros(10));
        }
    }

    #[test]
    fn test_replay_counter_visible_to_recorder() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            record_replay("request", "success");
            record_replay("request", "success");
        });

        let total: u64 = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter(|(key, _, _, _)| key.key().name() == "offline_sync_replays_total")
            .map(|(_, _, _, value)| match value {
                DebugValue::Counter(n) => n,
                _ => 0,
            })
            .sum();
        assert_eq!(total, 2);
    }
}
