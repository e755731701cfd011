//! SQLite event store implementation

use crate::telemetry::{format_timestamp, NewEvent, TelemetryEvent};
use crate::{Result, WistecError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Name of the event table inside the shared database
pub const TELEMETRY_TABLE: &str = "wistec_telemetry";

/// How long a statement waits on a locked database before failing
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the SQLite database file (must already exist)
    pub path: PathBuf,

    /// Busy handler timeout for concurrent writers
    pub busy_timeout: Duration,

    /// Switch the database to WAL so the reader never blocks writers
    pub wal_mode: bool,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".beads").join("beads.db"),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            wal_mode: true,
        }
    }
}

/// Token burn totals over events with a positive burn
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnStats {
    pub total: i64,
    pub avg: i64,
    pub max: i64,
}

/// Per-agent breakdown row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStat {
    pub agent_id: String,
    pub event_count: i64,
    pub total_tokens: i64,
}

/// Per-node-type breakdown row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTypeStat {
    pub node_type: String,
    pub event_count: i64,
    pub total_tokens: i64,
    pub avg_tokens: i64,
}

/// Handle on the shared telemetry database
///
/// A handle is owned by exactly one task; concurrent writers each open their
/// own and rely on SQLite's single-statement atomicity.
pub struct EventStore {
    conn: Connection,
    config: StoreConfig,
    read_only: bool,
}

impl EventStore {
    /// Open a read-write handle on an existing database
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_config(StoreConfig::new(path))
    }

    /// Open a read-write handle with explicit settings
    pub fn with_config(config: StoreConfig) -> Result<Self> {
        ensure_exists(&config.path)?;

        tracing::debug!(path = %config.path.display(), "Opening telemetry store");

        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(config.busy_timeout)?;

        if config.wal_mode {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            tracing::trace!(journal_mode = %mode, "Journal mode set");
        }

        Ok(Self {
            conn,
            config,
            read_only: false,
        })
    }

    /// Open a handle that cannot mutate the database
    pub fn open_read_only(path: impl Into<PathBuf>) -> Result<Self> {
        let config = StoreConfig {
            wal_mode: false,
            ..StoreConfig::new(path)
        };
        ensure_exists(&config.path)?;

        let conn = Connection::open_with_flags(
            &config.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(config.busy_timeout)?;

        Ok(Self {
            conn,
            config,
            read_only: true,
        })
    }

    /// Create the event table if it is absent
    ///
    /// Idempotent, and safe to run from several handles at once.
    pub fn ensure_schema(&self) -> Result<()> {
        if self.read_only {
            return Err(WistecError::Storage(
                "cannot create schema through a read-only handle".to_string(),
            ));
        }

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS wistec_telemetry (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT,
                agent_id TEXT,
                bead_id TEXT,
                node_type TEXT,
                logic_branch TEXT,
                token_burn INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_wistec_telemetry_timestamp
                ON wistec_telemetry(timestamp);
            CREATE INDEX IF NOT EXISTS idx_wistec_telemetry_agent
                ON wistec_telemetry(agent_id);
            "#,
        )?;

        Ok(())
    }

    /// Whether the event table has been created yet
    pub fn table_exists(&self) -> Result<bool> {
        let name: Option<String> = self
            .conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [TELEMETRY_TABLE],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name.is_some())
    }

    /// Insert one event and return its assigned id
    pub fn append(&self, event: &NewEvent) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO wistec_telemetry
                (timestamp, agent_id, bead_id, node_type, logic_branch, token_burn)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                format_timestamp(event.timestamp),
                &event.agent_id,
                &event.bead_id,
                event.node_type,
                event.logic_branch,
                event.token_burn,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// Total number of stored events
    pub fn count(&self) -> Result<i64> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM wistec_telemetry", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Most recent `limit` events, newest first
    pub fn recent_events(&self, limit: usize) -> Result<Vec<TelemetryEvent>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, timestamp, agent_id, bead_id, node_type, logic_branch, token_burn
            FROM wistec_telemetry
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )?;

        let events = stmt
            .query_map([limit as i64], event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    /// All events emitted by one agent, in emission order
    pub fn events_for_agent(&self, agent_id: &str) -> Result<Vec<TelemetryEvent>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, timestamp, agent_id, bead_id, node_type, logic_branch, token_burn
            FROM wistec_telemetry
            WHERE agent_id = ?1
            ORDER BY id ASC
            "#,
        )?;

        let events = stmt
            .query_map([agent_id], event_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    /// Sum, rounded mean and maximum over events with a positive burn
    pub fn token_stats(&self) -> Result<BurnStats> {
        let stats = self.conn.query_row(
            r#"
            SELECT COALESCE(SUM(token_burn), 0),
                   COALESCE(AVG(token_burn), 0.0),
                   COALESCE(MAX(token_burn), 0)
            FROM wistec_telemetry
            WHERE token_burn > 0
            "#,
            [],
            |row| {
                Ok(BurnStats {
                    total: row.get(0)?,
                    avg: round_avg(row.get(1)?),
                    max: row.get(2)?,
                })
            },
        )?;
        Ok(stats)
    }

    /// Burn recorded in the half-open window `(since, until]`
    pub fn recent_window_sum(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> Result<i64> {
        let sum = self.conn.query_row(
            r#"
            SELECT COALESCE(SUM(token_burn), 0)
            FROM wistec_telemetry
            WHERE timestamp > ?1 AND timestamp <= ?2
            "#,
            params![format_timestamp(since), format_timestamp(until)],
            |row| row.get(0),
        )?;
        Ok(sum)
    }

    /// Event count and burn per agent, heaviest `top_n` first
    pub fn by_agent(&self, top_n: usize) -> Result<Vec<AgentStat>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT COALESCE(agent_id, ''), COUNT(*), COALESCE(SUM(token_burn), 0) AS total_tokens
            FROM wistec_telemetry
            GROUP BY agent_id
            ORDER BY total_tokens DESC, agent_id ASC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt
            .query_map([top_n as i64], |row| {
                Ok(AgentStat {
                    agent_id: row.get(0)?,
                    event_count: row.get(1)?,
                    total_tokens: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Event count, burn and rounded mean burn for every node type
    pub fn by_node_type(&self) -> Result<Vec<NodeTypeStat>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT COALESCE(node_type, ''),
                   COUNT(*),
                   COALESCE(SUM(token_burn), 0) AS total_tokens,
                   COALESCE(AVG(COALESCE(token_burn, 0)), 0.0)
            FROM wistec_telemetry
            GROUP BY node_type
            ORDER BY total_tokens DESC, node_type ASC
            "#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(NodeTypeStat {
                    node_type: row.get(0)?,
                    event_count: row.get(1)?,
                    total_tokens: row.get(2)?,
                    avg_tokens: round_avg(row.get(3)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Whether this handle was opened read-only
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Get the database path
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Store handle for async callers
///
/// Every call runs on tokio's blocking pool, so a statement waiting out the
/// busy timeout parks a blocking thread instead of a runtime worker.
#[derive(Clone)]
pub struct SharedEventStore {
    inner: Arc<Mutex<EventStore>>,
}

impl SharedEventStore {
    pub fn new(store: EventStore) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Insert one event off the async runtime
    pub async fn append_async(&self, event: NewEvent) -> Result<i64> {
        self.with_store(move |store| store.append(&event)).await
    }

    /// Run `f` against the store on the blocking pool
    pub async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&EventStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let store = inner
                .lock()
                .map_err(|_| WistecError::Storage("store handle poisoned".to_string()))?;
            f(&store)
        })
        .await
        .map_err(|e| WistecError::Storage(format!("join error: {}", e)))?
    }
}

impl From<EventStore> for SharedEventStore {
    fn from(store: EventStore) -> Self {
        Self::new(store)
    }
}

fn ensure_exists(path: &Path) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(WistecError::StoreNotFound(path.to_path_buf()))
    }
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<TelemetryEvent> {
    Ok(TelemetryEvent {
        id: row.get(0)?,
        timestamp: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        agent_id: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        bead_id: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        node_type: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        logic_branch: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        token_burn: row.get::<_, Option<i64>>(6)?.unwrap_or(0),
    })
}

fn round_avg(avg: f64) -> i64 {
    avg.round() as i64
}
