//! Configuration management (`config.toml`)
//!
//! Timing and capacity knobs for the synchronization layer. The defaults are
//! tuned for perceived smoothness of a DOM-style renderer and can be retuned
//! per deployment. Stored as TOML in the platform-specific config directory.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Synchronization layer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SyncConfig {
    /// Acknowledgment tracker settings
    #[serde(default)]
    pub ack: AckConfig,
    /// Guest swap queue settings
    #[serde(default)]
    pub swap: SwapConfig,
    /// Connection monitor settings
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Pause controller settings
    #[serde(default)]
    pub pause: PauseConfig,
    /// Resynchronization settings
    #[serde(default)]
    pub resync: ResyncConfig,
}

/// Acknowledgment timeouts and latency estimation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckConfig {
    /// Timeout used when the caller has no better estimate (default: 2000)
    #[serde(default = "default_ack_timeout")]
    pub default_timeout_ms: u64,
    /// Lower clamp for adaptive timeouts (default: 1000)
    #[serde(default = "default_min_timeout")]
    pub min_timeout_ms: u64,
    /// Upper clamp for adaptive timeouts (default: 5000)
    #[serde(default = "default_max_timeout")]
    pub max_timeout_ms: u64,
    /// Smallest latency estimate ever reported (default: 200)
    #[serde(default = "default_latency_floor")]
    pub latency_floor_ms: u64,
    /// Fixed margin added to every observed round trip (default: 100)
    #[serde(default = "default_latency_margin")]
    pub latency_margin_ms: u64,
}

/// Swap queue pacing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapConfig {
    /// Maximum queued swaps before the oldest is dropped (default: 20)
    #[serde(default = "default_swap_capacity")]
    pub capacity: usize,
    /// Minimum spacing between applied swaps, never speed-adjusted (default: 300)
    #[serde(default = "default_swap_interval")]
    pub min_interval_ms: u64,
    /// Settle delay after each applied swap (default: 50)
    #[serde(default = "default_swap_settle")]
    pub settle_ms: u64,
}

/// Presence monitoring and reconnection handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Time the guest has to signal ready after reconnecting (default: 5000)
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,
    /// Delay between the ready signal and the resync (default: 500)
    #[serde(default = "default_ready_grace")]
    pub ready_grace_ms: u64,
    /// Re-check delay for disconnects seen while the host tab was hidden (default: 3000)
    #[serde(default = "default_tab_hidden_grace")]
    pub tab_hidden_grace_ms: u64,
}

/// Pause controller timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseConfig {
    /// Delay before the simulation loop restarts after a resume (default: 500)
    #[serde(default = "default_resume_settle")]
    pub resume_settle_ms: u64,
}

/// Resynchronization timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResyncConfig {
    /// How long the host waits for `resync_complete` (default: 10000)
    #[serde(default = "default_resync_timeout")]
    pub ack_timeout_ms: u64,
}

fn default_ack_timeout() -> u64 {
    2000
}
fn default_min_timeout() -> u64 {
    1000
}
fn default_max_timeout() -> u64 {
    5000
}
fn default_latency_floor() -> u64 {
    200
}
fn default_latency_margin() -> u64 {
    100
}

fn default_swap_capacity() -> usize {
    20
}
fn default_swap_interval() -> u64 {
    300
}
fn default_swap_settle() -> u64 {
    50
}

fn default_handshake_timeout() -> u64 {
    5000
}
fn default_ready_grace() -> u64 {
    500
}
fn default_tab_hidden_grace() -> u64 {
    3000
}

fn default_resume_settle() -> u64 {
    500
}

fn default_resync_timeout() -> u64 {
    10_000
}

impl Default for AckConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_ack_timeout(),
            min_timeout_ms: default_min_timeout(),
            max_timeout_ms: default_max_timeout(),
            latency_floor_ms: default_latency_floor(),
            latency_margin_ms: default_latency_margin(),
        }
    }
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            capacity: default_swap_capacity(),
            min_interval_ms: default_swap_interval(),
            settle_ms: default_swap_settle(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: default_handshake_timeout(),
            ready_grace_ms: default_ready_grace(),
            tab_hidden_grace_ms: default_tab_hidden_grace(),
        }
    }
}

impl Default for PauseConfig {
    fn default() -> Self {
        Self {
            resume_settle_ms: default_resume_settle(),
        }
    }
}

impl Default for ResyncConfig {
    fn default() -> Self {
        Self {
            ack_timeout_ms: default_resync_timeout(),
        }
    }
}

impl AckConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
    pub fn min_timeout(&self) -> Duration {
        Duration::from_millis(self.min_timeout_ms)
    }
    pub fn max_timeout(&self) -> Duration {
        Duration::from_millis(self.max_timeout_ms)
    }
    pub fn latency_floor(&self) -> Duration {
        Duration::from_millis(self.latency_floor_ms)
    }
    pub fn latency_margin(&self) -> Duration {
        Duration::from_millis(self.latency_margin_ms)
    }
}

impl SwapConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

impl ConnectionConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
    pub fn ready_grace(&self) -> Duration {
        Duration::from_millis(self.ready_grace_ms)
    }
    pub fn tab_hidden_grace(&self) -> Duration {
        Duration::from_millis(self.tab_hidden_grace_ms)
    }
}

impl PauseConfig {
    pub fn resume_settle(&self) -> Duration {
        Duration::from_millis(self.resume_settle_ms)
    }
}

impl ResyncConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// Config loading and saving failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl SyncConfig {
    /// Check for values the protocol cannot run with.
    ///
    /// Returns one message per problem; an empty list means the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.swap.capacity == 0 {
            problems.push("swap.capacity must be at least 1".to_string());
        }
        if self.ack.min_timeout_ms > self.ack.max_timeout_ms {
            problems.push(format!(
                "ack.min_timeout_ms ({}) exceeds ack.max_timeout_ms ({})",
                self.ack.min_timeout_ms, self.ack.max_timeout_ms
            ));
        }
        if self.connection.handshake_timeout_ms == 0 {
            problems.push("connection.handshake_timeout_ms must be positive".to_string());
        }
        if self.resync.ack_timeout_ms == 0 {
            problems.push("resync.ack_timeout_ms must be positive".to_string());
        }

        problems
    }
}

/// Returns the platform-specific configuration directory.
///
/// On Linux: `~/.config/BattleLink`
///
/// Returns `None` if the home directory cannot be determined.
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.battlelink", "", "BattleLink")
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Returns the platform-specific data directory for persisted battles.
pub fn data_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("io.battlelink", "", "BattleLink")
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Loads the configuration from the platform config directory.
///
/// Returns default values if the file doesn't exist or cannot be parsed.
pub fn load() -> SyncConfig {
    match config_dir().map(|dir| load_from(&dir.join("config.toml"))) {
        Some(Ok(config)) => config,
        Some(Err(ConfigError::Io(e))) if e.kind() == std::io::ErrorKind::NotFound => {
            SyncConfig::default()
        }
        Some(Err(e)) => {
            tracing::warn!(error = %e, "Ignoring unreadable config, using defaults");
            SyncConfig::default()
        }
        None => SyncConfig::default(),
    }
}

/// Loads a configuration from an explicit file.
pub fn load_from(path: &Path) -> Result<SyncConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Saves the configuration to the platform config directory.
pub fn save(config: &SyncConfig) -> Result<(), ConfigError> {
    if let Some(dir) = config_dir() {
        save_to(config, &dir.join("config.toml"))?;
    }
    Ok(())
}

/// Writes a configuration to an explicit file, creating parent directories.
pub fn save_to(config: &SyncConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}
