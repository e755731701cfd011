//! Telemetry event model
//!
//! One immutable record per worker state transition. Events are written once
//! by the swarm and read back by the aggregator; nothing updates or deletes
//! them.

use chrono::{DateTime, Utc};
use rusqlite::types::{ToSql, ToSqlOutput};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp layout used for every stored event.
///
/// Fixed width and always UTC, so lexical order in SQLite equals
/// chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Format a UTC instant the way the event table stores it
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Pipeline stage that produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Analysis,
    Execution,
    Healing,
    Completion,
}

impl NodeType {
    pub const ALL: [NodeType; 4] = [
        NodeType::Analysis,
        NodeType::Execution,
        NodeType::Healing,
        NodeType::Completion,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Analysis => "Analysis",
            NodeType::Execution => "Execution",
            NodeType::Healing => "Healing",
            NodeType::Completion => "Completion",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        NodeType::ALL
            .into_iter()
            .find(|n| n.as_str() == s)
            .ok_or_else(|| format!("unknown node type: {}", s))
    }
}

impl ToSql for NodeType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

/// How a stage was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicBranch {
    /// First pass through the stage
    Normal,
    /// Inside the failure/healing loop
    Loop,
    /// Retried execution after healing
    Retry,
}

impl LogicBranch {
    pub const ALL: [LogicBranch; 3] = [LogicBranch::Normal, LogicBranch::Loop, LogicBranch::Retry];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogicBranch::Normal => "Normal",
            LogicBranch::Loop => "Loop",
            LogicBranch::Retry => "Retry",
        }
    }
}

impl fmt::Display for LogicBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicBranch {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        LogicBranch::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| format!("unknown logic branch: {}", s))
    }
}

impl ToSql for LogicBranch {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

/// An event about to be appended; the store assigns the id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub bead_id: String,
    pub node_type: NodeType,
    pub logic_branch: LogicBranch,
    pub token_burn: u32,
}

impl NewEvent {
    /// Create an event stamped with the current time
    pub fn new(
        agent_id: impl Into<String>,
        bead_id: impl Into<String>,
        node_type: NodeType,
        logic_branch: LogicBranch,
        token_burn: u32,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            agent_id: agent_id.into(),
            bead_id: bead_id.into(),
            node_type,
            logic_branch,
            token_burn,
        }
    }

    /// Override the timestamp (used for backfills and tests)
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The (stage, branch) pair identifying the transition
    pub fn step(&self) -> (NodeType, LogicBranch) {
        (self.node_type, self.logic_branch)
    }
}

/// A stored event as read back from the event table
///
/// Stage and branch stay as text: rows written by other producers are
/// reported as-is rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub id: i64,
    pub timestamp: String,
    pub agent_id: String,
    pub bead_id: String,
    pub node_type: String,
    pub logic_branch: String,
    pub token_burn: i64,
}

impl TelemetryEvent {
    /// Parsed stage, if it is one of the known names
    pub fn node(&self) -> Option<NodeType> {
        self.node_type.parse().ok()
    }

    /// Parsed branch, if it is one of the known names
    pub fn branch(&self) -> Option<LogicBranch> {
        self.logic_branch.parse().ok()
    }

    /// The (stage, branch) pair, when both are known
    pub fn step(&self) -> Option<(NodeType, LogicBranch)> {
        Some((self.node()?, self.branch()?))
    }
}
