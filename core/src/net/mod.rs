//! Networking modules for BattleLink
//!
//! - [`battle`] - host-authoritative battle synchronization

pub mod battle;
