//! Prometheus metrics for the agent swarm
//!
//! Process-wide counters describing what the workers wrote (or failed to
//! write). Served as text at `GET /metrics`.

use crate::telemetry::{LogicBranch, NodeType};
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    /// Counter: events appended, by stage and branch
    pub static ref EVENTS: IntCounterVec = register_int_counter_vec!(
        "wistec_events_total",
        "Telemetry events appended by stage and branch",
        &["node_type", "logic_branch"]
    )
    .expect("Failed to create events metric");

    /// Counter: token burn appended, by stage
    pub static ref TOKEN_BURN: IntCounterVec = register_int_counter_vec!(
        "wistec_token_burn_total",
        "Simulated token burn appended by stage",
        &["node_type"]
    )
    .expect("Failed to create token_burn metric");

    /// Counter: inserts that failed and were dropped
    pub static ref WRITE_FAILURES: IntCounter = register_int_counter!(
        "wistec_write_failures_total",
        "Telemetry inserts that failed"
    )
    .expect("Failed to create write_failures metric");

    /// Counter: completed work cycles by outcome
    pub static ref CYCLES: IntCounterVec = register_int_counter_vec!(
        "wistec_cycles_total",
        "Completed work cycles by outcome",
        &["outcome"]
    )
    .expect("Failed to create cycles metric");

    /// Gauge: workers currently running
    pub static ref ACTIVE_WORKERS: IntGauge = register_int_gauge!(
        "wistec_active_workers",
        "Number of running agent workers"
    )
    .expect("Failed to create active_workers metric");
}

/// Record a successful append
pub fn record_event(node_type: NodeType, logic_branch: LogicBranch, token_burn: u32) {
    EVENTS
        .with_label_values(&[node_type.as_str(), logic_branch.as_str()])
        .inc();
    TOKEN_BURN
        .with_label_values(&[node_type.as_str()])
        .inc_by(u64::from(token_burn));
}

/// Record a dropped append
pub fn record_write_failure() {
    WRITE_FAILURES.inc();
}

/// Record a finished cycle ("success" or "healed")
pub fn record_cycle(outcome: &str) {
    CYCLES.with_label_values(&[outcome]).inc();
}

pub fn worker_started() {
    ACTIVE_WORKERS.inc();
}

pub fn worker_stopped() {
    ACTIVE_WORKERS.dec();
}

/// Encode all metrics as Prometheus text format
pub fn encode_metrics() -> crate::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| crate::WistecError::Other(format!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| crate::WistecError::Other(format!("Metrics are not UTF-8: {}", e)))
}
