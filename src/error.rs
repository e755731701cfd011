//! Error types for Wistec
//!
//! Defines the error enum covering the simulation, store, aggregation and
//! serving paths. Uses thiserror for ergonomic error handling.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Wistec operations
pub type Result<T> = std::result::Result<T, WistecError>;

/// Error type for Wistec operations
#[derive(Error, Debug)]
pub enum WistecError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The backing SQLite file does not exist
    #[error("Database not found at {}. Run 'bd init' first.", .0.display())]
    StoreNotFound(PathBuf),

    /// Storage errors that are not raw SQLite failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP server errors (bind, serve)
    #[error("Server error: {0}")]
    Server(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl WistecError {
    /// True when the error means the store file is absent
    pub fn is_store_not_found(&self) -> bool {
        matches!(self, WistecError::StoreNotFound(_))
    }
}
