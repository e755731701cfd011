//! Wistec configuration file handling
//!
//! Loads and saves ~/.config/wistec/config.yaml. Every field carries a serde
//! default, so a partial file (or none at all) yields the stock simulation:
//! seven agents, a 20% execution failure rate and second-scale pacing.

use crate::work::IDLE_BEAD_ID;
use crate::Result;
use rand::distr::uniform::SampleUniform;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Inclusive `[min, max]` bounds for a random draw
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

impl<T> Bounds<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: SampleUniform + PartialOrd + Copy> Bounds<T> {
    /// Draw uniformly from the bounds; a collapsed range returns `min`
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        if self.min >= self.max {
            self.min
        } else {
            rng.random_range(self.min..=self.max)
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }
}

/// Knobs for the agent swarm
///
/// Immutable once the pool starts; each worker gets its own clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Number of concurrent agents
    pub agents: usize,

    /// Agent ids are `{agent_prefix}-{n}`, n starting at 1
    pub agent_prefix: String,

    /// Probability that an execution attempt fails and enters healing
    pub failure_rate: f64,

    /// Burn for the Analysis stage
    pub analysis_burn: Bounds<u32>,

    /// Burn for the Healing stage
    pub healing_burn: Bounds<u32>,

    /// Burn for a successful or retried Execution
    pub execution_burn: Bounds<u32>,

    /// "Thinking" pause after Analysis and settling pause before Completion
    pub think_delay_ms: Bounds<u64>,

    /// Pause between a failed Execution and Healing
    pub failure_delay_ms: u64,

    /// Pause between Healing and the retried Execution
    pub healing_delay_ms: u64,

    /// Pause after Completion before selecting the next bead
    pub cycle_delay_ms: u64,

    /// Bead id used when no issue is actionable
    pub idle_bead: String,

    /// Seed for reproducible runs; worker n uses `seed + n`
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            agents: 7,
            agent_prefix: "Agent".to_string(),
            failure_rate: 0.2,
            analysis_burn: Bounds::new(50, 150),
            healing_burn: Bounds::new(100, 300),
            execution_burn: Bounds::new(200, 500),
            think_delay_ms: Bounds::new(500, 1500),
            failure_delay_ms: 500,
            healing_delay_ms: 1000,
            cycle_delay_ms: 1000,
            idle_bead: IDLE_BEAD_ID.to_string(),
            seed: None,
        }
    }
}

impl SimulationConfig {
    /// Id of the n-th agent (1-based)
    pub fn agent_id(&self, n: usize) -> String {
        format!("{}-{}", self.agent_prefix, n)
    }

    /// All agent ids in launch order
    pub fn agent_ids(&self) -> Vec<String> {
        (1..=self.agents).map(|n| self.agent_id(n)).collect()
    }

    /// Set the agent count
    pub fn with_agents(mut self, agents: usize) -> Self {
        self.agents = agents;
        self
    }

    /// Set the failure probability
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate;
        self
    }

    /// Set the seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Scale every delay down to the given fixed value (used for fast runs)
    pub fn with_uniform_delay(mut self, delay_ms: u64) -> Self {
        self.think_delay_ms = Bounds::new(delay_ms, delay_ms);
        self.failure_delay_ms = delay_ms;
        self.healing_delay_ms = delay_ms;
        self.cycle_delay_ms = delay_ms;
        self
    }

    pub fn failure_delay(&self) -> Duration {
        Duration::from_millis(self.failure_delay_ms)
    }

    pub fn healing_delay(&self) -> Duration {
        Duration::from_millis(self.healing_delay_ms)
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_millis(self.cycle_delay_ms)
    }
}

/// HTTP surface settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind, e.g. "127.0.0.1:3000"
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

fn default_database() -> PathBuf {
    PathBuf::from(".beads").join("beads.db")
}

/// Wistec configuration
///
/// Represents the complete ~/.config/wistec/config.yaml file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WistecConfig {
    /// Shared beads database that receives telemetry
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Swarm settings
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// HTTP settings
    #[serde(default)]
    pub server: ServerConfig,
}

impl WistecConfig {
    /// Create a configuration with every default
    pub fn new() -> Self {
        Self {
            database: default_database(),
            simulation: SimulationConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Load configuration from the default path (~/.config/wistec/config.yaml)
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        Self::load(&path)
    }

    /// Load configuration from a specific path
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(crate::WistecError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        tracing::info!(path = %path.display(), "Loading Wistec configuration");

        let content = fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;

        tracing::debug!(
            agents = config.simulation.agents,
            failure_rate = config.simulation.failure_rate,
            database = %config.database.display(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(Self::default_path);

        if path.exists() {
            Self::load(&path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::new())
        }
    }

    /// Save configuration to a specific path
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Saving Wistec configuration");

        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;

        Ok(())
    }

    /// Get the default config path (~/.config/wistec/config.yaml)
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".config");
        path.push("wistec");
        path.push("config.yaml");
        path
    }
}

impl Default for WistecConfig {
    fn default() -> Self {
        Self::new()
    }
}
