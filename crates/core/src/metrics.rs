//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Job lifecycle (submissions, completions, failures, cancellations)
//! - Polling scheduler (poll attempts, quota waits, retries)
//! - Remote generation operations (durations, credential signals)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Job lifecycle
// =============================================================================

/// Jobs submitted total.
pub static JOBS_SUBMITTED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("spotnik_jobs_submitted_total", "Total jobs submitted").unwrap()
});

/// Jobs completed total.
pub static JOBS_COMPLETED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "spotnik_jobs_completed_total",
        "Total jobs completed successfully",
    )
    .unwrap()
});

/// Jobs failed total.
pub static JOBS_FAILED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("spotnik_jobs_failed_total", "Total jobs failed").unwrap());

/// Jobs cancelled total.
pub static JOBS_CANCELLED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("spotnik_jobs_cancelled_total", "Total jobs cancelled").unwrap()
});

/// Manual retries total.
pub static JOBS_RETRIED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "spotnik_jobs_retried_total",
        "Total manual retries of failed jobs",
    )
    .unwrap()
});

// =============================================================================
// Polling scheduler
// =============================================================================

/// Poll attempts total by operation kind.
pub static POLL_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("spotnik_poll_attempts_total", "Total poll attempts"),
        &["kind"], // "video_generation", "voice_synthesis"
    )
    .unwrap()
});

/// Retry decisions total by failure class.
pub static RETRIES_SCHEDULED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "spotnik_retries_scheduled_total",
            "Total retries granted by the backoff policy",
        ),
        &["class"], // "transient", "quota_exceeded"
    )
    .unwrap()
});

/// Quota wait transitions total.
pub static QUOTA_WAITS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "spotnik_quota_waits_total",
        "Total transitions into the quota wait state",
    )
    .unwrap()
});

/// Poll ceiling hits total.
pub static POLL_CEILING_HITS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "spotnik_poll_ceiling_hits_total",
        "Total operations abandoned at the poll attempt ceiling",
    )
    .unwrap()
});

// =============================================================================
// Remote operations
// =============================================================================

/// Operations started total by kind and result.
pub static OPERATIONS_STARTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "spotnik_operations_started_total",
            "Total remote operation start attempts",
        ),
        &["kind", "result"], // result: "success", "error"
    )
    .unwrap()
});

/// End-to-end operation duration in seconds, by kind and result.
pub static OPERATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "spotnik_operation_duration_seconds",
            "Duration from operation start to terminal poll",
        )
        .buckets(vec![5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0]),
        &["kind", "result"],
    )
    .unwrap()
});

/// Credential refresh signals total.
pub static CREDENTIAL_REFRESH_SIGNALS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "spotnik_credential_refresh_signals_total",
        "Total permanent-failure notifications sent to the credential collaborator",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Job lifecycle
        Box::new(JOBS_SUBMITTED.clone()),
        Box::new(JOBS_COMPLETED.clone()),
        Box::new(JOBS_FAILED.clone()),
        Box::new(JOBS_CANCELLED.clone()),
        Box::new(JOBS_RETRIED.clone()),
        // Polling scheduler
        Box::new(POLL_ATTEMPTS.clone()),
        Box::new(RETRIES_SCHEDULED.clone()),
        Box::new(QUOTA_WAITS.clone()),
        Box::new(POLL_CEILING_HITS.clone()),
        // Remote operations
        Box::new(OPERATIONS_STARTED.clone()),
        Box::new(OPERATION_DURATION.clone()),
        Box::new(CREDENTIAL_REFRESH_SIGNALS.clone()),
    ]
}
