//! Metrics collection and Prometheus export.
//!
//! Installs the Prometheus recorder and records conversion outcomes.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// Global handle to the Prometheus recorder.
pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics recorder.
///
/// Call once at startup before any metrics are recorded; later calls are no-ops.
pub fn init_metrics() {
    METRICS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    });
}

/// Get the current metrics in Prometheus text format.
pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized".to_string())
}

/// Record the outcome of one conversion request.
///
/// `outcome` is one of `success`, `fallback`, `error`.
pub fn record_conversion(backend: &str, outcome: &'static str, elapsed: Duration) {
    let labels = [
        ("backend", backend.to_string()),
        ("outcome", outcome.to_string()),
    ];
    metrics::counter!("conversions_total", &labels).increment(1);
    metrics::histogram!("conversion_duration_seconds", &labels).record(elapsed.as_secs_f64());
}

/// Count retries that dropped picture description.
pub fn record_vlm_retry(backend: &str) {
    metrics::counter!("conversion_vlm_retries_total", "backend" => backend.to_string())
        .increment(1);
}
