//! Inspect command - print the last persisted battle

use std::path::PathBuf;

use anyhow::{Context, Result};
use battlelink_core::save_store::{CheckpointStore, FileCheckpointStore};
use battlelink_shared::{AbsoluteSide, BattleCheckpoint};
use clap::Args;

/// Arguments for the inspect command
#[derive(Args)]
pub struct InspectArgs {
    /// Saved battle file (defaults to the platform data directory)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Print the raw JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

/// Execute the inspect command
pub fn execute(args: InspectArgs) -> Result<()> {
    let path = match args.file {
        Some(path) => path,
        None => FileCheckpointStore::default_path()
            .context("Could not determine the data directory")?,
    };
    let store = FileCheckpointStore::new(path);

    let Some(battle) = store
        .load()
        .with_context(|| format!("Failed to read {}", store.path().display()))?
    else {
        println!("No persisted battle at {}", store.path().display());
        return Ok(());
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&battle)?);
        return Ok(());
    }

    let saved_at = chrono::DateTime::from_timestamp_millis(battle.saved_at)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| battle.saved_at.to_string());
    let conn = &battle.connection;

    println!("=== Persisted Battle ===");
    println!("  File:      {}", store.path().display());
    println!("  Saved:     {saved_at}");
    println!("  Paused:    {}", conn.battle_paused);
    println!("  Connected: {}", conn.opponent_connected);
    println!("  Reconnecting: {}", conn.guest_reconnecting);
    println!("  Total pause: {} ms", conn.total_pause_time);
    println!("  Latency:   {} ms", conn.connection_latency);
    print_checkpoint(&battle.checkpoint);
    Ok(())
}

fn print_checkpoint(checkpoint: &BattleCheckpoint) {
    println!("  Turn:      {}", checkpoint.turn);
    if let Some(winner) = checkpoint.winner {
        println!("  Winner:    {winner:?}");
    }
    for side in AbsoluteSide::ALL {
        println!("  {side:?}:");
        for hero in &checkpoint.side(side).heroes {
            println!(
                "    {:?} {} {}/{}{}",
                hero.position,
                hero.name,
                hero.hp,
                hero.max_hp,
                if hero.alive { "" } else { " (defeated)" }
            );
            for creature in &hero.creatures {
                println!("      - {} {}/{}", creature.name, creature.hp, creature.max_hp);
            }
        }
    }
}
