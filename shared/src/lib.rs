//! Shared types for the BattleLink battle synchronization layer.
//!
//! Both peers agree on these types: the side/role vocabulary used by every
//! cross-peer message, and the checkpoint model the host snapshots and the
//! guest mirrors.

pub mod checkpoint;
pub mod error;
pub mod side;

pub use checkpoint::{
    BattleCheckpoint, CreatureState, DelayedEffect, HeroPosition, HeroState, SideState,
    StatusEffect,
};
pub use error::CheckpointError;
pub use side::{AbsoluteSide, LocalSide, PeerRole};
