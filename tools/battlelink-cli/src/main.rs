//! BattleLink CLI - battle sync simulations and config management
//!
//! # Commands
//!
//! - `battlelink simulate` - Run a scripted host/guest battle over a lossy in-memory link
//! - `battlelink config` - Show, locate or initialize the sync config
//! - `battlelink inspect` - Print the last persisted battle
//!
//! # Usage
//!
//! ```bash
//! # 30 virtual seconds, 10% loss, guest drops out between 5s and 9s
//! battlelink simulate --seconds 30 --loss 0.1 --disconnect-at 5 --reconnect-at 9
//!
//! # Reproduce a run exactly
//! battlelink simulate --seed 42
//!
//! # Write the default config to the platform config directory
//! battlelink config init
//! ```

mod config;
mod inspect;
mod simulate;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// BattleLink CLI - battle sync simulations and config management
#[derive(Parser)]
#[command(name = "battlelink")]
#[command(about = "Battle sync simulations and config management")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scripted battle between a host and a guest
    Simulate(simulate::SimulateArgs),

    /// Show, locate or initialize the sync config
    Config(config::ConfigArgs),

    /// Print the last persisted battle
    Inspect(inspect::InspectArgs),
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => simulate::execute(args),
        Commands::Config(args) => config::execute(args),
        Commands::Inspect(args) => inspect::execute(args),
    }
}
