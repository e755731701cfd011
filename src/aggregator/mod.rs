//! Telemetry aggregation
//!
//! Rolls the raw event log up into dashboard statistics on demand. Nothing
//! is cached or refreshed in the background: every call opens a fresh
//! read-only handle and queries the table.

mod telemetry_report;

pub use telemetry_report::{
    Aggregator, AggregatorConfig, TelemetryReport, TokenStats, DEFAULT_RECENT_LIMIT,
    DEFAULT_TOP_AGENTS, DEFAULT_WINDOW_MINUTES,
};
