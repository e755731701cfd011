//! Agent swarm simulation
//!
//! Simulated agents that repeatedly pick a bead, walk it through the
//! Analysis → Execution → (Healing → Retry) → Completion pipeline and append
//! one telemetry event per transition.
//!
//! # Overview
//!
//! - **AgentWorker**: the per-agent state machine, with injectable randomness
//!   and delays so tests run it deterministically
//! - **Pacer**: the delay seam (`TokioPacer` for real runs, `NoDelay` for tests)
//! - **WorkerPool**: deploys N workers as independent tokio tasks, each with
//!   its own database handle
//!
//! # Example
//!
//! ```no_run
//! use wistec::config::SimulationConfig;
//! use wistec::swarm::WorkerPool;
//!
//! #[tokio::main]
//! async fn main() -> wistec::Result<()> {
//!     let pool = WorkerPool::start(".beads/beads.db", SimulationConfig::default())?;
//!     tokio::signal::ctrl_c().await?;
//!     pool.stop().await;
//!     Ok(())
//! }
//! ```

mod agent;
mod manager;
mod pacer;

pub use agent::{
    AgentWorker, CycleOutcome, CycleReport, EmittedStep, HEALED_SEQUENCE, SUCCESS_SEQUENCE,
};
pub use manager::WorkerPool;
pub use pacer::{NoDelay, Pacer, TokioPacer};
