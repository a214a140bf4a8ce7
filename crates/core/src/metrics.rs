//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Observations (captures, decodes, decoded records)
//! - Resilient tasks (invocations by outcome)
//! - External processes (spawns, forced kills)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Observation Metrics
// =============================================================================

/// Observations by final state.
pub static OBSERVATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "groundstation_observations_total",
            "Total observations by final state",
        ),
        &["satellite", "state"], // "decoded", "failed"
    )
    .unwrap()
});

/// Decoded records by decoder mode. Never reset.
pub static DECODED_RECORDS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "groundstation_decoded_records_total",
            "Total records decoded from captured passes",
        ),
        &["mode"],
    )
    .unwrap()
});

/// Decode duration in seconds.
pub static DECODE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "groundstation_decode_duration_seconds",
            "Duration of the decode step",
        )
        .buckets(vec![0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
        &["mode", "result"], // "ok", "empty", "failed"
    )
    .unwrap()
});

/// Bytes copied from the tuner into the conversion stage.
pub static CAPTURE_BYTES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "groundstation_capture_bytes_total",
        "Total bytes piped between capture stages",
    )
    .unwrap()
});

// =============================================================================
// Task Metrics
// =============================================================================

/// Resilient task invocations by outcome.
pub static TASK_INVOCATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "groundstation_task_invocations_total",
            "Total resilient task invocations",
        ),
        &["task", "outcome"], // "completed", "failed", "backing_off", "disabled"
    )
    .unwrap()
});

// =============================================================================
// Process Metrics
// =============================================================================

/// Child processes that ignored SIGTERM and had to be killed.
pub static PROCESS_FORCE_KILLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "groundstation_process_force_kills_total",
            "Child processes killed after the teardown timeout",
        ),
        &["program"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Observations
        Box::new(OBSERVATIONS_TOTAL.clone()),
        Box::new(DECODED_RECORDS.clone()),
        Box::new(DECODE_DURATION.clone()),
        Box::new(CAPTURE_BYTES.clone()),
        // Tasks
        Box::new(TASK_INVOCATIONS.clone()),
        // Processes
        Box::new(PROCESS_FORCE_KILLS.clone()),
    ]
}
