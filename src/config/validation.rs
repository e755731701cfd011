//! Configuration validation
//!
//! Validates Wistec configuration for correctness:
//! - At least one agent
//! - Failure rate is a probability
//! - Burn and delay bounds are ordered
//! - Identifiers and addresses are non-empty

use super::wistec_config::{Bounds, WistecConfig};
use crate::WistecError;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validation result
pub type ValidationResult = std::result::Result<(), Vec<ValidationError>>;

/// Validate a Wistec configuration
pub fn validate_config(config: &WistecConfig) -> ValidationResult {
    let mut errors = Vec::new();
    let sim = &config.simulation;

    if sim.agents == 0 {
        errors.push(ValidationError::new(
            "simulation.agents",
            "At least one agent must be deployed",
        ));
    }

    if sim.agent_prefix.trim().is_empty() {
        errors.push(ValidationError::new(
            "simulation.agent_prefix",
            "Agent prefix cannot be empty",
        ));
    }

    if !(0.0..=1.0).contains(&sim.failure_rate) {
        errors.push(ValidationError::new(
            "simulation.failure_rate",
            format!("Failure rate {} must be between 0 and 1", sim.failure_rate),
        ));
    }

    check_bounds(&mut errors, "simulation.analysis_burn", &sim.analysis_burn);
    check_bounds(&mut errors, "simulation.healing_burn", &sim.healing_burn);
    check_bounds(&mut errors, "simulation.execution_burn", &sim.execution_burn);
    check_bounds(&mut errors, "simulation.think_delay_ms", &sim.think_delay_ms);

    if sim.idle_bead.trim().is_empty() {
        errors.push(ValidationError::new(
            "simulation.idle_bead",
            "Idle bead id cannot be empty",
        ));
    }

    if config.server.bind.trim().is_empty() {
        errors.push(ValidationError::new(
            "server.bind",
            "Bind address cannot be empty",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_bounds<T>(errors: &mut Vec<ValidationError>, field: &str, bounds: &Bounds<T>)
where
    T: PartialOrd + std::fmt::Display,
{
    if bounds.min > bounds.max {
        errors.push(ValidationError::new(
            field,
            format!("min {} is greater than max {}", bounds.min, bounds.max),
        ));
    }
}

/// Validate and convert to a crate error
pub fn validate_config_result(config: &WistecConfig) -> crate::Result<()> {
    validate_config(config).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        WistecError::Config(format!(
            "Configuration validation failed:\n  - {}",
            messages.join("\n  - ")
        ))
    })
}
