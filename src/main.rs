//! Wistec - telemetry simulator for AI agent swarms
//!
//! Main entry point for the Wistec CLI.

mod commands;

use clap::Parser;
use commands::{Cli, Commands};
use std::path::Path;
use std::process;
use wistec::aggregator::{Aggregator, TelemetryReport};
use wistec::config::{validate_config_result, WistecConfig};
use wistec::swarm::WorkerPool;
use wistec::{server, WistecError};

fn main() {
    // Initialize logging
    if let Err(e) = wistec::logging::init() {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> wistec::Result<()> {
    // Init writes the config, so it must not require one
    if let Commands::Init { force } = cli.command {
        return handle_init_command(cli.config.as_deref(), force);
    }

    let mut config = match &cli.config {
        Some(path) => WistecConfig::load(path)?,
        None => WistecConfig::load_or_default(None)?,
    };

    match cli.command {
        Commands::Simulate {
            db,
            agents,
            failure_rate,
            seed,
        } => {
            if let Some(db) = db {
                config.database = db;
            }
            if let Some(agents) = agents {
                config.simulation.agents = agents;
            }
            if let Some(rate) = failure_rate {
                config.simulation.failure_rate = rate;
            }
            if let Some(seed) = seed {
                config.simulation.seed = Some(seed);
            }
            validate_config_result(&config)?;
            handle_simulate_command(config)
        }

        Commands::Serve { db, bind } => {
            if let Some(db) = db {
                config.database = db;
            }
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            validate_config_result(&config)?;

            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(server::serve(&config))
        }

        Commands::Stats { db, json } => {
            let database = db.unwrap_or(config.database);
            handle_stats_command(&database, json)
        }

        Commands::Init { .. } => {
            // Handled earlier in the function
            unreachable!("Init command should be handled before loading config")
        }
    }
}

fn handle_init_command(config_path: Option<&Path>, force: bool) -> wistec::Result<()> {
    let config_file = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(WistecConfig::default_path);

    if config_file.exists() && !force {
        println!("Configuration already exists at {}", config_file.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    WistecConfig::new().save(&config_file)?;

    println!("✓ Created configuration at {}", config_file.display());
    println!();
    println!("Next steps:");
    println!("  1. Create a beads database:   bd init");
    println!("  2. Deploy the swarm:          wistec simulate");
    println!("  3. Serve the dashboard API:   wistec serve");

    Ok(())
}

fn handle_simulate_command(config: WistecConfig) -> wistec::Result<()> {
    println!("Initializing Wistec telemetry grid...");

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        // Fails with StoreNotFound before any agent starts
        let pool = WorkerPool::start(&config.database, config.simulation.clone())?;
        println!("Deploying {} agents...", pool.len());
        println!("Stress test running. Press Ctrl+C to stop.");

        wait_for_shutdown().await?;

        println!();
        println!("Stopping stress test...");
        let stopped = pool.stop().await;
        tracing::info!(agents = stopped, "Swarm stopped");
        Ok::<(), WistecError>(())
    })
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> wistec::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| WistecError::Other(format!("Failed to set up SIGTERM handler: {}", e)))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| WistecError::Other(format!("Failed to set up SIGINT handler: {}", e)))?;

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
        _ = sigint.recv() => {
            tracing::info!("Received SIGINT, initiating graceful shutdown");
        }
    }
    Ok(())
}

/// Wait for Ctrl+C (non-Unix platforms)
#[cfg(not(unix))]
async fn wait_for_shutdown() -> wistec::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| WistecError::Other(format!("Failed to listen for Ctrl+C: {}", e)))?;
    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
    Ok(())
}

fn handle_stats_command(database: &Path, json: bool) -> wistec::Result<()> {
    let report = Aggregator::new(database).collect()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &TelemetryReport) {
    let tokens = &report.token_stats;

    println!("Wistec Telemetry");
    println!();
    println!("  Total tokens:   {}", tokens.total);
    println!("  Average burn:   {}", tokens.avg);
    println!("  Peak burn:      {}", tokens.max);
    println!("  Last 5 minutes: {} ({} / min)", tokens.recent, tokens.rate);

    if report.is_empty() {
        println!();
        println!("No telemetry recorded yet. Run 'wistec simulate' to start the swarm.");
        return;
    }

    println!();
    println!("Agents:");
    for agent in &report.agent_stats {
        println!(
            "  {:<12} {:>6} events {:>9} tokens",
            agent.agent_id, agent.event_count, agent.total_tokens
        );
    }

    println!();
    println!("Node types:");
    for node in &report.node_type_stats {
        println!(
            "  {:<12} {:>6} events {:>9} tokens  avg {}",
            node.node_type, node.event_count, node.total_tokens, node.avg_tokens
        );
    }

    println!();
    println!("Recent events:");
    for event in report.telemetry.iter().take(10) {
        println!(
            "  {}  {:<10} {:<16} {:<10} {:<6} {}",
            event.timestamp,
            event.agent_id,
            event.bead_id,
            event.node_type,
            event.logic_branch,
            event.token_burn
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_simulate_missing_database() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = WistecConfig::new();
        config.database = temp_dir.path().join("beads.db");

        let err = handle_simulate_command(config).unwrap_err();
        assert!(err.is_store_not_found());
        assert!(err.to_string().starts_with("Database not found at "));
    }

    #[test]
    fn test_stats_missing_database() {
        let temp_dir = TempDir::new().unwrap();
        let err = handle_stats_command(&temp_dir.path().join("beads.db"), true).unwrap_err();
        assert!(matches!(err, WistecError::StoreNotFound(_)));
    }

    #[test]
    fn test_stats_before_table_exists() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        assert!(handle_stats_command(temp_file.path(), false).is_ok());
    }
}
