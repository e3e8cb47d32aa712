//! Prometheus metrics collection for cf-ddns
//!
//! A one-shot job has no endpoint to scrape, so the registry is exported to a
//! file for the node-exporter textfile collector at the end of each cycle.

use std::path::Path;

use anyhow::{Context as _, Result};
use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

use crate::secrets::write_file_with_mode;

//==============================================================================
// Metrics
//==============================================================================

lazy_static! {
    /// Reconciled records by outcome (unchanged, created, updated, skipped, failed)
    pub static ref RECORDS_TOTAL: CounterVec = register_counter_vec!(
        "cf_ddns_records_total",
        "Reconciled records by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Failed public address lookups by family
    pub static ref LOOKUP_FAILURES_TOTAL: CounterVec = register_counter_vec!(
        "cf_ddns_lookup_failures_total",
        "Failed public address lookups",
        &["family"]
    )
    .unwrap();

    /// Provider request duration histogram
    pub static ref PROVIDER_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "cf_ddns_provider_request_duration_seconds",
        "Provider request duration in seconds",
        &["operation"]
    )
    .unwrap();

    /// Unix time at which the last cycle finished
    pub static ref LAST_RUN_TIMESTAMP_SECONDS: Gauge = register_gauge!(
        "cf_ddns_last_run_timestamp_seconds",
        "Unix time at which the last reconciliation cycle finished"
    )
    .unwrap();

    /// Records that failed or were skipped in the last cycle
    pub static ref LAST_RUN_FAILURES: Gauge = register_gauge!(
        "cf_ddns_last_run_failures",
        "Records that failed or were skipped in the last cycle"
    )
    .unwrap();
}

//==============================================================================
// Public Functions
//==============================================================================

/// Counts one record outcome
pub fn record_outcome(outcome: &str) {
    RECORDS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Counts one failed address lookup
pub fn record_lookup_failure(family: &str) {
    LOOKUP_FAILURES_TOTAL.with_label_values(&[family]).inc();
}

/// Starts a timer for one provider call; observed on drop
pub fn start_provider_timer(operation: &str) -> HistogramTimer {
    PROVIDER_REQUEST_DURATION_SECONDS
        .with_label_values(&[operation])
        .start_timer()
}

/// Marks the end of a cycle
pub fn finish_cycle(failures: usize) {
    LAST_RUN_TIMESTAMP_SECONDS.set(Utc::now().timestamp() as f64);
    LAST_RUN_FAILURES.set(failures as f64);
}

/// Collects all metrics and returns them as text
pub fn gather_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("encode metrics")?;
    String::from_utf8(buffer).context("metrics are not valid UTF-8")
}

/// Writes the exposition text to `path` atomically
///
/// The text goes to `<path>.tmp` first and is renamed into place, so the
/// collector never reads a half-written file.
pub fn write_textfile(path: &Path) -> Result<()> {
    let text = gather_metrics()?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    write_file_with_mode(&tmp, text.as_bytes(), 0o644)?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move metrics into {}", path.display()))
}

//==============================================================================
// Types
//==============================================================================

/// Histogram timer for measuring duration
pub type HistogramTimer = prometheus::HistogramTimer;

//==============================================================================
// Tests
//==============================================================================
