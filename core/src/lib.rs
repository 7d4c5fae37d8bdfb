//! BattleLink Core - battle synchronization for two-player card battles
//!
//! One peer (the host) runs the authoritative simulation; the other (the
//! guest) mirrors it. This crate keeps the mirror honest.
//!
//! # Architecture
//!
//! - [`HostSession`] - acknowledgments, pause gate, connection monitor, resync
//! - [`GuestSession`] - message dispatch onto the mirror, paced swaps
//! - [`SyncConfig`] - timing constants, loaded from TOML
//! - [`CheckpointStore`] - persistence of the paused battle

pub mod config;
pub mod net;
pub mod save_store;
#[cfg(test)]
pub mod test_utils;

pub use config::{ConfigError, SyncConfig};
pub use save_store::{
    CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, PersistedBattle, StoreError,
};

// Re-export session types
pub use net::battle::{
    BattleAuthority, GuestSession, HostEvent, HostSession, MirrorEvent, SessionMode,
};
