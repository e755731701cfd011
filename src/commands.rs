//! CLI command definitions
//!
//! All CLI structs and subcommand enums are defined here.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Wistec - agent swarm telemetry simulator and dashboard backend
#[derive(Parser, Debug)]
#[command(name = "wistec")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (default: ~/.config/wistec/config.yaml)
    #[arg(short, long, global = true, env = "WISTEC_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Deploy the agent swarm against a beads database
    Simulate {
        /// Path to the beads database (default: .beads/beads.db)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Number of agents to deploy
        #[arg(short = 'n', long)]
        agents: Option<usize>,

        /// Probability that an execution step fails (0.0 - 1.0)
        #[arg(short, long)]
        failure_rate: Option<f64>,

        /// Seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Serve aggregated telemetry over HTTP
    Serve {
        /// Path to the beads database (default: .beads/beads.db)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Address to bind (default: 127.0.0.1:3000)
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Print aggregated telemetry
    Stats {
        /// Path to the beads database (default: .beads/beads.db)
        #[arg(long)]
        db: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
