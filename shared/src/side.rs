//! Peer roles and battle sides.
//!
//! Cross-peer messages always name an [`AbsoluteSide`]. Each peer translates it
//! into a [`LocalSide`] relative to its own seat before rendering.

use serde::{Deserialize, Serialize};

/// Role of a peer in a battle session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerRole {
    /// Runs the authoritative simulation
    Host,
    /// Mirrors host state and renders it
    Guest,
}

impl PeerRole {
    /// The absolute side this peer sits on.
    pub const fn side(self) -> AbsoluteSide {
        match self {
            Self::Host => AbsoluteSide::Host,
            Self::Guest => AbsoluteSide::Guest,
        }
    }

    /// Whether this peer owns the authoritative state.
    pub const fn is_authoritative(self) -> bool {
        matches!(self, Self::Host)
    }
}

/// Side label that means the same thing on both peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbsoluteSide {
    Host,
    Guest,
}

impl AbsoluteSide {
    /// Both sides, host first.
    pub const ALL: [AbsoluteSide; 2] = [AbsoluteSide::Host, AbsoluteSide::Guest];

    /// Translate into the receiving peer's point of view.
    pub const fn to_local(self, me: PeerRole) -> LocalSide {
        match (self, me) {
            (Self::Host, PeerRole::Host) | (Self::Guest, PeerRole::Guest) => LocalSide::Player,
            _ => LocalSide::Opponent,
        }
    }

    pub const fn opposite(self) -> Self {
        match self {
            Self::Host => Self::Guest,
            Self::Guest => Self::Host,
        }
    }
}

/// Side label relative to the peer doing the rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalSide {
    Player,
    Opponent,
}

impl LocalSide {
    /// Translate back into an absolute side for the given peer.
    pub const fn to_absolute(self, me: PeerRole) -> AbsoluteSide {
        match self {
            Self::Player => me.side(),
            Self::Opponent => me.side().opposite(),
        }
    }
}
