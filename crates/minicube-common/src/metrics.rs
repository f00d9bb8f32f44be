//! Metrics and observability for MiniCube
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::must_use_candidate)]

use metrics::{counter, gauge, histogram};
use std::time::Instant;

// ============================================================================
// Cube Metrics
// ============================================================================

/// Record a fact table build
pub fn record_build(rows: u64, index_entries: u64, duration_ms: u64) {
    counter!("minicube_builds_total").increment(1);
    counter!("minicube_rows_loaded_total").increment(rows);
    gauge!("minicube_index_entries").set(index_entries as f64);
    histogram!("minicube_build_duration_ms").record(duration_ms as f64);
}

/// Record query executed
pub fn record_query(query_type: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    counter!("minicube_queries_total",
        "type" => query_type.to_string(),
        "status" => status.to_string()
    ).increment(1);
}

/// Record query latency
pub fn record_query_latency(query_type: &str, latency_ms: f64) {
    histogram!("minicube_query_duration_ms", "type" => query_type.to_string()).record(latency_ms);
}

/// Record rows scanned
pub fn record_rows_scanned(count: u64) {
    counter!("minicube_rows_scanned_total").increment(count);
}

// ============================================================================
// Cluster Metrics
// ============================================================================

/// Record a scatter/gather round
pub fn record_dispatch(targets: usize, failures: usize, latency_ms: f64) {
    counter!("minicube_dispatch_total").increment(1);
    counter!("minicube_dispatch_targets_total").increment(targets as u64);
    counter!("minicube_dispatch_failures_total").increment(failures as u64);
    histogram!("minicube_dispatch_duration_ms").record(latency_ms);
}

/// Record an assignment transition
pub fn record_assignment(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!("minicube_assignments_total", "status" => status.to_string()).increment(1);
}

/// Timer guard for automatic latency recording
pub struct LatencyTimer {
    start: Instant,
    metric_name: String,
}

impl LatencyTimer {
    #[must_use]
    pub fn new(metric_name: &str) -> Self {
        Self {
            start: Instant::now(),
            metric_name: metric_name.to_string(),
        }
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_query_latency(&self.metric_name, self.elapsed_ms());
    }
}
