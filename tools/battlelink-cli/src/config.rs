//! Config command - show, locate or initialize the sync config

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use battlelink_core::config::{self, SyncConfig};
use battlelink_core::save_store::FileCheckpointStore;
use clap::{Args, Subcommand};

/// Arguments for the config command
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective config as TOML
    Show {
        /// Read this file instead of the platform config
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Print where the config and the persisted battle live
    Path,

    /// Write the default config
    Init {
        /// Write here instead of the platform config directory
        #[arg(long)]
        file: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Execute the config command
pub fn execute(args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Show { file } => show(file),
        ConfigAction::Path => path(),
        ConfigAction::Init { file, force } => init(file, force),
    }
}

fn default_file() -> Result<PathBuf> {
    config::config_dir()
        .map(|dir| dir.join("config.toml"))
        .context("Could not determine the config directory")
}

fn show(file: Option<PathBuf>) -> Result<()> {
    let config = match file {
        Some(path) => config::load_from(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => config::load(),
    };

    print!("{}", toml::to_string_pretty(&config)?);

    let problems = config.validate();
    if !problems.is_empty() {
        eprintln!();
        for problem in &problems {
            eprintln!("warning: {problem}");
        }
    }
    Ok(())
}

fn path() -> Result<()> {
    println!("config: {}", default_file()?.display());
    match FileCheckpointStore::default_path() {
        Some(path) => println!("battle: {}", path.display()),
        None => println!("battle: <unavailable>"),
    }
    Ok(())
}

fn init(file: Option<PathBuf>, force: bool) -> Result<()> {
    let path = match file {
        Some(path) => path,
        None => default_file()?,
    };
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    config::save_to(&SyncConfig::default(), &path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
