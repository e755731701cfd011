//! Telemetry report built from the event store

use crate::store::{AgentStat, EventStore, NodeTypeStat};
use crate::telemetry::TelemetryEvent;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Events returned in the recent feed
pub const DEFAULT_RECENT_LIMIT: usize = 50;

/// Agents returned in the per-agent breakdown
pub const DEFAULT_TOP_AGENTS: usize = 10;

/// Trailing window for the recent burn and rate
pub const DEFAULT_WINDOW_MINUTES: i64 = 5;

/// Global token burn figures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenStats {
    /// Sum of positive burns
    pub total: i64,
    /// Rounded mean of positive burns
    pub avg: i64,
    /// Largest single burn
    pub max: i64,
    /// Burn inside the trailing window
    pub recent: i64,
    /// `recent` per minute, rounded
    pub rate: i64,
}

/// Everything the dashboard needs from the event log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryReport {
    /// Most recent events, newest first
    pub telemetry: Vec<TelemetryEvent>,
    pub token_stats: TokenStats,
    pub agent_stats: Vec<AgentStat>,
    pub node_type_stats: Vec<NodeTypeStat>,
}

impl TelemetryReport {
    /// True when no event has been recorded
    pub fn is_empty(&self) -> bool {
        self.telemetry.is_empty()
    }
}

/// Aggregator configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    pub recent_limit: usize,
    pub top_agents: usize,
    pub window_minutes: i64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            recent_limit: DEFAULT_RECENT_LIMIT,
            top_agents: DEFAULT_TOP_AGENTS,
            window_minutes: DEFAULT_WINDOW_MINUTES,
        }
    }
}

/// Read path over the shared telemetry database
#[derive(Debug, Clone)]
pub struct Aggregator {
    path: PathBuf,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, AggregatorConfig::default())
    }

    pub fn with_config(path: impl Into<PathBuf>, config: AggregatorConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    /// Trailing window for `recent` and `rate` in whole minutes
    ///
    /// Values below one are raised to one so the rate stays defined.
    pub fn with_window(mut self, minutes: i64) -> Self {
        self.config.window_minutes = minutes.max(1);
        self
    }

    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.config.recent_limit = limit;
        self
    }

    pub fn with_top_agents(mut self, top_n: usize) -> Self {
        self.config.top_agents = top_n;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Build a report as of now
    pub fn collect(&self) -> Result<TelemetryReport> {
        self.collect_at(Utc::now())
    }

    /// Build a report with the trailing window ending at `now`
    ///
    /// A missing database file is [`WistecError::StoreNotFound`](crate::WistecError::StoreNotFound);
    /// a database whose event table was never created yields the empty
    /// report.
    pub fn collect_at(&self, now: DateTime<Utc>) -> Result<TelemetryReport> {
        let store = EventStore::open_read_only(&self.path)?;

        if !store.table_exists()? {
            tracing::debug!(path = %self.path.display(), "Telemetry table not created yet");
            return Ok(TelemetryReport::default());
        }

        let telemetry = store.recent_events(self.config.recent_limit)?;
        let burn = store.token_stats()?;

        let window_minutes = self.config.window_minutes.max(1);
        let recent = store.recent_window_sum(now - Duration::minutes(window_minutes), now)?;
        let rate = (recent as f64 / window_minutes as f64).round() as i64;

        let report = TelemetryReport {
            telemetry,
            token_stats: TokenStats {
                total: burn.total,
                avg: burn.avg,
                max: burn.max,
                recent,
                rate,
            },
            agent_stats: store.by_agent(self.config.top_agents)?,
            node_type_stats: store.by_node_type()?,
        };

        tracing::debug!(
            events = report.telemetry.len(),
            total = report.token_stats.total,
            recent = report.token_stats.recent,
            "Telemetry aggregated"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{LogicBranch, NewEvent, NodeType};
    use crate::WistecError;
    use chrono::TimeZone;
    use tempfile::NamedTempFile;

    fn seeded_store() -> (NamedTempFile, DateTime<Utc>) {
        let temp_file = NamedTempFile::new().unwrap();
        let store = EventStore::open(temp_file.path()).unwrap();
        store.ensure_schema().unwrap();

        let base = Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap();
        let rows = [
            (NodeType::Analysis, LogicBranch::Normal, 100),
            (NodeType::Execution, LogicBranch::Normal, 300),
            (NodeType::Completion, LogicBranch::Normal, 0),
        ];
        for (i, (node, branch, burn)) in rows.into_iter().enumerate() {
            let event = NewEvent::new("A1", "b1", node, branch, burn)
                .at(base + Duration::seconds(i as i64));
            store.append(&event).unwrap();
        }
        (temp_file, base)
    }

    #[test]
    fn test_missing_store() {
        let result = Aggregator::new("/nonexistent/beads.db").collect();
        assert!(matches!(result, Err(WistecError::StoreNotFound(_))));
    }

    #[test]
    fn test_table_not_created() {
        let temp_file = NamedTempFile::new().unwrap();
        let report = Aggregator::new(temp_file.path()).collect().unwrap();
        assert_eq!(report, TelemetryReport::default());
        assert!(report.is_empty());
    }

    #[test]
    fn test_empty_table() {
        let temp_file = NamedTempFile::new().unwrap();
        EventStore::open(temp_file.path())
            .unwrap()
            .ensure_schema()
            .unwrap();

        let report = Aggregator::new(temp_file.path()).collect().unwrap();
        assert_eq!(report.token_stats, TokenStats::default());
        assert!(report.agent_stats.is_empty());
        assert!(report.node_type_stats.is_empty());
    }

    #[test]
    fn test_report_figures() {
        let (temp, base) = seeded_store();
        let now = base + Duration::minutes(1);

        let report = Aggregator::new(temp.path()).collect_at(now).unwrap();
        assert_eq!(
            report.token_stats,
            TokenStats {
                total: 400,
                avg: 200,
                max: 300,
                recent: 400,
                rate: 80,
            }
        );

        let ids: Vec<i64> = report.telemetry.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
        assert_eq!(report.agent_stats.len(), 1);
        assert_eq!(report.agent_stats[0].total_tokens, 400);
        assert_eq!(report.node_type_stats[0].node_type, "Execution");
    }

    #[test]
    fn test_window_before_events() {
        let (temp, base) = seeded_store();
        let report = Aggregator::new(temp.path())
            .collect_at(base - Duration::hours(1))
            .unwrap();
        assert_eq!(report.token_stats.recent, 0);
        assert_eq!(report.token_stats.rate, 0);
        assert_eq!(report.token_stats.total, 400);
    }

    #[test]
    fn test_custom_limits() {
        let (temp, base) = seeded_store();
        let report = Aggregator::new(temp.path())
            .with_recent_limit(2)
            .with_top_agents(0)
            .with_window(2)
            .collect_at(base + Duration::seconds(30))
            .unwrap();
        assert_eq!(report.telemetry.len(), 2);
        assert!(report.agent_stats.is_empty());
        assert_eq!(report.token_stats.rate, 200);
    }

    #[test]
    fn test_window_in_whole_minutes() {
        let aggregator = Aggregator::new("beads.db").with_window(3);
        assert_eq!(aggregator.config().window_minutes, 3);

        let floored = Aggregator::new("beads.db").with_window(0);
        assert_eq!(floored.config().window_minutes, 1);
    }

    #[test]
    fn test_window_rate_uses_configured_minutes() {
        let (temp, base) = seeded_store();
        let report = Aggregator::new(temp.path())
            .with_window(3)
            .collect_at(base + Duration::minutes(1))
            .unwrap();
        assert_eq!(report.token_stats.recent, 400);
        assert_eq!(report.token_stats.rate, 133);
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let json = serde_json::to_value(TelemetryReport::default()).unwrap();
        assert!(json.get("tokenStats").is_some());
        assert!(json.get("agentStats").is_some());
        assert!(json.get("nodeTypeStats").is_some());
        assert_eq!(json["tokenStats"]["rate"], 0);
    }
}
