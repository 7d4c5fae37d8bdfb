//! Typed payloads for the core message kinds.

use battlelink_shared::{AbsoluteSide, BattleCheckpoint, CreatureState, HeroPosition};
use serde::{Deserialize, Serialize};

/// `battle_paused` / `battle_resumed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseNotice {
    pub reason: String,
    pub timestamp: i64,
}

/// `resync_battle_state`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResyncBattleState {
    pub battle_state: BattleCheckpoint,
    pub resync_id: u64,
    pub host_turn: u32,
    pub message: String,
    /// xxHash3 of the checkpoint's JSON encoding
    #[serde(default)]
    pub checksum: Option<u64>,
}

/// `guest_desync_signal`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestDesyncSignal {
    pub timestamp: i64,
    pub guest_turn: u32,
    pub reason: String,
}

/// `guest_reconnection_ready`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestReconnectionReady {
    pub timestamp: i64,
    #[serde(default)]
    pub guest_turn: Option<u32>,
}

/// A hero addressed by absolute side and slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeroTarget {
    pub side: AbsoluteSide,
    pub position: HeroPosition,
}

/// `damage_applied`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageApplied {
    pub target: HeroTarget,
    pub damage: i32,
    pub new_hp: i32,
    #[serde(default)]
    pub source: Option<String>,
}

/// `damage_applied_with_shields`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageAppliedWithShields {
    pub target: HeroTarget,
    pub damage: i32,
    pub shield_damage: i32,
    pub new_hp: i32,
    pub new_shield: i32,
    #[serde(default)]
    pub source: Option<String>,
}

/// A creature as the host saw it when the message was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatureTarget {
    pub side: AbsoluteSide,
    pub hero_position: HeroPosition,
    pub creature_index: usize,
    pub creature_name: String,
    /// HP before this update, used to tell same-named creatures apart
    #[serde(default)]
    pub creature_hp: Option<i32>,
}

/// `creature_damage_applied`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatureDamageApplied {
    pub target: CreatureTarget,
    pub damage: i32,
    pub new_hp: i32,
    #[serde(default)]
    pub died: bool,
}

/// Creature list of one hero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeroCreatures {
    pub position: HeroPosition,
    pub creatures: Vec<CreatureState>,
}

/// Creature lists of one side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideCreatures {
    pub side: AbsoluteSide,
    pub heroes: Vec<HeroCreatures>,
}

/// `creature_state_sync`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatureStateSync {
    pub sides: Vec<SideCreatures>,
}

/// `request_creature_sync`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCreatureSync {
    pub side: AbsoluteSide,
    #[serde(default)]
    pub hero_position: Option<HeroPosition>,
    pub reason: String,
    pub timestamp: i64,
}

/// `hand_update` / `deck_update`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardCollectionUpdate {
    pub side: AbsoluteSide,
    pub cards: Vec<String>,
}

/// `status_effect_applied` / `status_effect_removed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffectChange {
    pub target: HeroTarget,
    pub effect: String,
    /// Stacks to add or remove; removal of `None` clears the effect
    #[serde(default)]
    pub stacks: Option<u32>,
}

/// `crusader_hookshot_swap` / `expedition_position_swap`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionSwap {
    pub side: AbsoluteSide,
    pub from: HeroPosition,
    pub to: HeroPosition,
    #[serde(default)]
    pub id: Option<String>,
}

/// `turn_started`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnStarted {
    pub turn: u32,
}

/// `battle_ended`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleEnded {
    #[serde(default)]
    pub winner: Option<AbsoluteSide>,
}
