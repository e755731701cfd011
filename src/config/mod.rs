//! Configuration system
//!
//! Loads ~/.config/wistec/config.yaml with support for:
//! - Location of the shared beads database
//! - Swarm size, failure rate, token burn ranges and pacing
//! - HTTP bind address for the telemetry endpoint

pub mod validation;
mod wistec_config;

pub use validation::{validate_config, validate_config_result, ValidationError};
pub use wistec_config::{Bounds, ServerConfig, SimulationConfig, WistecConfig};
