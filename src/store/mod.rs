//! Telemetry event store
//!
//! Append-only SQLite log of telemetry events. Every worker holds its own
//! read-write handle; the aggregation path opens a separate read-only one.
//! The store never creates the database file: a missing file is reported as
//! [`WistecError::StoreNotFound`](crate::WistecError::StoreNotFound).

mod sqlite;

pub use sqlite::{
    AgentStat, BurnStats, EventStore, NodeTypeStat, SharedEventStore, StoreConfig,
    DEFAULT_BUSY_TIMEOUT, TELEMETRY_TABLE,
};
