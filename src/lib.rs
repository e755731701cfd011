//! Wistec - telemetry simulator for AI agent swarms
//!
//! Wistec deploys a swarm of simulated agents against a beads database. Each
//! agent claims an actionable bead, walks it through a small reasoning state
//! machine and records one telemetry event per step, including occasional
//! failed executions that are healed and retried. A read path rolls the event
//! log up into dashboard statistics and serves them over HTTP next to a
//! snapshot of host vitals.
//!
//! # Architecture
//!
//! - **telemetry**: Event records, node types and logic branches
//! - **store**: SQLite event table (append and aggregate queries)
//! - **work**: Where agents find beads to work on
//! - **swarm**: Agent state machine and worker pool
//! - **aggregator**: Dashboard report built from the event log
//! - **vitals**: Host CPU, memory and load snapshot
//! - **server**: HTTP API (axum)
//! - **config**: YAML configuration and validation
//! - **metrics**: Prometheus counters for the swarm

// Core modules
pub mod config;
pub mod error;
pub mod logging;
pub mod store;
pub mod telemetry;

// Components
pub mod aggregator;
pub mod metrics;
pub mod server;
pub mod swarm;
pub mod vitals;
pub mod work;

// Re-exports
pub use error::{Result, WistecError};
