//! Battle checkpoint data model.
//!
//! A [`BattleCheckpoint`] is a complete, self-contained snapshot of the
//! authoritative battle. The host persists one on every pause and ships one to
//! the guest during a resync; the guest's mirror is the same type.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use crate::error::CheckpointError;
use crate::side::AbsoluteSide;

/// Formation slot of a hero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeroPosition {
    Left,
    Center,
    Right,
}

impl HeroPosition {
    pub const ALL: [HeroPosition; 3] = [HeroPosition::Left, HeroPosition::Center, HeroPosition::Right];
}

/// A named, stackable status effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub name: String,
    pub stacks: u32,
}

/// A creature summoned under a hero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatureState {
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub alive: bool,
    /// Generic counter storage used by creature abilities
    #[serde(default)]
    pub counters: u32,
    #[serde(default)]
    pub status_effects: Vec<StatusEffect>,
}

impl CreatureState {
    pub fn new(name: impl Into<String>, hp: i32, max_hp: i32) -> Self {
        Self {
            name: name.into(),
            hp,
            max_hp,
            alive: hp > 0,
            counters: 0,
            status_effects: Vec::new(),
        }
    }
}

/// A hero occupying one formation slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeroState {
    pub position: HeroPosition,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    #[serde(default)]
    pub shield: i32,
    pub alive: bool,
    #[serde(default)]
    pub status_effects: Vec<StatusEffect>,
    #[serde(default)]
    pub creatures: Vec<CreatureState>,
}

impl HeroState {
    pub fn new(position: HeroPosition, name: impl Into<String>, hp: i32, max_hp: i32) -> Self {
        Self {
            position,
            name: name.into(),
            hp,
            max_hp,
            shield: 0,
            alive: hp > 0,
            status_effects: Vec::new(),
            creatures: Vec::new(),
        }
    }

    /// Add `stacks` of a status effect, merging with an existing entry.
    pub fn add_status(&mut self, name: &str, stacks: u32) {
        match self.status_effects.iter_mut().find(|s| s.name == name) {
            Some(effect) => effect.stacks = effect.stacks.saturating_add(stacks),
            None => self.status_effects.push(StatusEffect {
                name: name.to_string(),
                stacks,
            }),
        }
    }

    /// Remove `stacks` of a status effect (all of them when `None`).
    pub fn remove_status(&mut self, name: &str, stacks: Option<u32>) {
        if let Some(idx) = self.status_effects.iter().position(|s| s.name == name) {
            let effect = &mut self.status_effects[idx];
            match stacks {
                Some(n) if n < effect.stacks => effect.stacks -= n,
                _ => {
                    self.status_effects.remove(idx);
                }
            }
        }
    }
}

/// Everything one side owns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideState {
    #[serde(default)]
    pub heroes: Vec<HeroState>,
    #[serde(default)]
    pub hand: Vec<String>,
    #[serde(default)]
    pub deck: Vec<String>,
    #[serde(default)]
    pub graveyard: Vec<String>,
    #[serde(default)]
    pub gold: u32,
}

impl SideState {
    pub fn hero(&self, position: HeroPosition) -> Option<&HeroState> {
        self.heroes.iter().find(|h| h.position == position)
    }

    pub fn hero_mut(&mut self, position: HeroPosition) -> Option<&mut HeroState> {
        self.heroes.iter_mut().find(|h| h.position == position)
    }
}

/// Effect scheduled to fire on a later turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayedEffect {
    pub name: String,
    pub target_side: AbsoluteSide,
    pub remaining_turns: u32,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Complete snapshot of the authoritative battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleCheckpoint {
    pub turn: u32,
    pub battle_active: bool,
    #[serde(default)]
    pub winner: Option<AbsoluteSide>,
    pub host: SideState,
    pub guest: SideState,
    #[serde(default)]
    pub delayed_effects: Vec<DelayedEffect>,
}

impl Default for BattleCheckpoint {
    fn default() -> Self {
        Self {
            turn: 0,
            battle_active: true,
            winner: None,
            host: SideState::default(),
            guest: SideState::default(),
            delayed_effects: Vec::new(),
        }
    }
}

impl BattleCheckpoint {
    pub fn side(&self, side: AbsoluteSide) -> &SideState {
        match side {
            AbsoluteSide::Host => &self.host,
            AbsoluteSide::Guest => &self.guest,
        }
    }

    pub fn side_mut(&mut self, side: AbsoluteSide) -> &mut SideState {
        match side {
            AbsoluteSide::Host => &mut self.host,
            AbsoluteSide::Guest => &mut self.guest,
        }
    }

    /// Whether the battle has reached a win or loss.
    pub fn is_decided(&self) -> bool {
        self.winner.is_some() || !self.battle_active
    }

    /// Encode as JSON bytes.
    ///
    /// Maps inside the checkpoint are ordered, so equal checkpoints always
    /// produce identical bytes.
    pub fn to_json(&self) -> Result<Vec<u8>, CheckpointError> {
        serde_json::to_vec(self).map_err(CheckpointError::Encode)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, CheckpointError> {
        serde_json::from_slice(bytes).map_err(CheckpointError::Decode)
    }

    /// xxHash3 of the canonical JSON encoding, for drift detection.
    pub fn checksum(&self) -> Result<u64, CheckpointError> {
        Ok(xxh3_64(&self.to_json()?))
    }
}
