//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the Spotnik server:
//! - WebSocket connection metrics
//! - Job counts by status (collected dynamically)
//! - Orchestrator status (collected dynamically)
//! - Core orchestration metrics (registered from spotnik-core)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

use spotnik_core::{JobStatus, JobStore};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "spotnik_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "spotnik_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("spotnik_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// WebSocket lag events (when a client falls behind).
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "spotnik_ws_lag_events_total",
        "WebSocket lag events (client fell behind)",
    )
    .unwrap()
});

// =============================================================================
// Job and orchestrator gauges (collected dynamically)
// =============================================================================

/// Jobs by current status.
pub static JOBS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("spotnik_jobs_by_status", "Current job count by status"),
        &["status"],
    )
    .unwrap()
});

/// Orchestrator running state (1 = running, 0 = stopped).
pub static ORCHESTRATOR_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "spotnik_orchestrator_running",
        "Whether the orchestrator is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Active poll loops gauge.
pub static POLL_LOOPS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "spotnik_poll_loops_active",
        "Number of currently active poll loops",
    )
    .unwrap()
});

// =============================================================================
// Registration
// =============================================================================

fn register_metrics(registry: &Registry) {
    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_MESSAGES_SENT.clone()))
        .unwrap();
    registry.register(Box::new(WS_LAG_EVENTS.clone())).unwrap();

    // Jobs and orchestrator
    registry.register(Box::new(JOBS_BY_STATUS.clone())).unwrap();
    registry
        .register(Box::new(ORCHESTRATOR_RUNNING.clone()))
        .unwrap();
    registry
        .register(Box::new(POLL_LOOPS_ACTIVE.clone()))
        .unwrap();

    // Core metrics (job lifecycle, polling, remote operations)
    for metric in spotnik_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Collect dynamic metrics from current application state.
///
/// Called before encoding so gauges carry current values from the store and
/// the orchestrator.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.orchestrator().status().await;
    ORCHESTRATOR_RUNNING.set(if status.running { 1 } else { 0 });
    POLL_LOOPS_ACTIVE.set(status.active_poll_loops as i64);

    let store = state.store();
    for status in [
        JobStatus::Pending,
        JobStatus::Initiating,
        JobStatus::Polling,
        JobStatus::QuotaWait,
        JobStatus::Completed,
        JobStatus::Failed,
    ] {
        JOBS_BY_STATUS
            .with_label_values(&[status.as_str()])
            .set(store.count_status(status) as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics_returns_prometheus_format() {
        WS_CONNECTIONS_TOTAL.inc();
        JOBS_BY_STATUS.with_label_values(&["pending"]).set(0);

        let output = encode_metrics();
        assert!(output.contains("spotnik_ws_connections_total"));
        assert!(output.contains("spotnik_jobs_by_status"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }
}
