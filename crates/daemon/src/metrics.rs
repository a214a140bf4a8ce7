//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the ground station daemon:
//! - HTTP request metrics (latency, counts)
//! - Planner and task status (collected dynamically)
//! - Everything the core library records (observations, decodes, processes)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "groundstation_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("groundstation_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

// =============================================================================
// Scheduling Metrics
// =============================================================================

/// Pass windows claimed and not yet finished.
pub static PENDING_PASSES: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "groundstation_pending_passes",
        "Pass windows scheduled or in progress",
    )
    .unwrap()
});

/// Whether each resilient task is latched fatal (1) or not (0).
pub static TASK_DISABLED: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "groundstation_task_disabled",
            "Resilient task disabled by a fatal error",
        ),
        &["task"],
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();

    // Scheduling
    registry.register(Box::new(PENDING_PASSES.clone())).unwrap();
    registry.register(Box::new(TASK_DISABLED.clone())).unwrap();

    // Core metrics (observations, decoders, tasks, processes)
    for metric in groundstation_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so the gauges reflect the planner and tasks as
/// they are right now.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    PENDING_PASSES.set(state.planner().work().pending().len() as i64);

    for task in state.task_statuses() {
        TASK_DISABLED
            .with_label_values(&[task.name.as_str()])
            .set(i64::from(task.fatal));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/test", "200"])
            .inc();

        let output = encode_metrics();
        assert!(output.contains("groundstation_http_requests_total"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_registry_contains_core_metrics() {
        // Prometheus only outputs vectors that have at least one child
        PENDING_PASSES.set(0);
        TASK_DISABLED.with_label_values(&["ddns"]).set(0);
        groundstation_core::metrics::TASK_INVOCATIONS
            .with_label_values(&["ddns", "completed"])
            .inc();
        groundstation_core::metrics::CAPTURE_BYTES.inc_by(0);

        let output = encode_metrics();

        assert!(output.contains("groundstation_pending_passes"));
        assert!(output.contains("groundstation_task_disabled"));
        assert!(output.contains("groundstation_task_invocations_total"));
        assert!(output.contains("groundstation_capture_bytes_total"));
    }
}
