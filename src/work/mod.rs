//! Work item source
//!
//! Workers pick the bead they "process" from the host issue tracker's
//! `issues` table. The tracker is read-only from our side: candidate ids are
//! listed, never updated. When nothing is actionable the worker falls back to
//! [`IDLE_BEAD_ID`] so it never stalls.

use crate::Result;
use rand::seq::IndexedRandom;
use rand::Rng;
use rusqlite::{Connection, OpenFlags};
use std::fmt;
use std::path::{Path, PathBuf};

/// Bead id recorded when no real work item is available
pub const IDLE_BEAD_ID: &str = "sys-maintenance";

/// Issue statuses a worker may pick up
pub const ACTIONABLE_STATUSES: [&str; 2] = ["open", "in_progress"];

/// Type-safe wrapper for bead IDs
///
/// Format: prefix-hash (e.g., "bd-a1b", "work-5fm")
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BeadId(String);

impl BeadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for BeadId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for BeadId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Supplies the ids of beads currently open for work
pub trait WorkSource: Send {
    /// List actionable beads; an empty list means "go idle"
    fn actionable(&mut self) -> Result<Vec<BeadId>>;
}

/// Reads candidates from the `issues` table of the beads database
pub struct IssueTableSource {
    path: PathBuf,
    conn: Option<Connection>,
}

impl IssueTableSource {
    /// Create a source for the given database; the connection opens lazily
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connection(&mut self) -> Result<&Connection> {
        if self.conn.is_none() {
            let conn = Connection::open_with_flags(
                &self.path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(crate::store::DEFAULT_BUSY_TIMEOUT)?;
            self.conn = Some(conn);
        }

        self.conn
            .as_ref()
            .ok_or_else(|| crate::WistecError::Storage("issue source not connected".to_string()))
    }

    fn query_actionable(&mut self) -> Result<Vec<BeadId>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare("SELECT id FROM issues WHERE status IN (?1, ?2)")?;
        let ids = stmt
            .query_map(ACTIONABLE_STATUSES, |row| row.get::<_, String>(0))?
            .map(|id| id.map(BeadId::new))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

impl WorkSource for IssueTableSource {
    /// A database without an `issues` table, or any failed read, yields an
    /// empty list rather than an error.
    fn actionable(&mut self) -> Result<Vec<BeadId>> {
        match self.query_actionable() {
            Ok(ids) => Ok(ids),
            Err(e) => {
                tracing::trace!(error = %e, "No actionable beads readable, going idle");
                Ok(Vec::new())
            }
        }
    }
}

/// Fixed candidate list, used in tests and dry runs
#[derive(Debug, Clone, Default)]
pub struct StaticWorkSource {
    beads: Vec<BeadId>,
}

impl StaticWorkSource {
    pub fn new<I, B>(beads: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<BeadId>,
    {
        Self {
            beads: beads.into_iter().map(Into::into).collect(),
        }
    }

    /// A source that never has work
    pub fn empty() -> Self {
        Self::default()
    }
}

impl WorkSource for StaticWorkSource {
    fn actionable(&mut self) -> Result<Vec<BeadId>> {
        Ok(self.beads.clone())
    }
}

/// Pick a bead uniformly at random, or the idle id when there is none
pub fn select_bead<R: Rng + ?Sized>(candidates: &[BeadId], rng: &mut R, idle: &str) -> BeadId {
    candidates
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| BeadId::new(idle))
}
