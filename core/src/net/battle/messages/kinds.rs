//! Message catalog tags.
//!
//! Tags are stable strings shared by both peers. Content modules may register
//! handlers for tags that are not listed here; anything unregistered is ignored.

// Pause mirroring (host -> guest). Also used as ack types.
pub const BATTLE_PAUSED: &str = "battle_paused";
pub const BATTLE_RESUMED: &str = "battle_resumed";

// Resynchronization
pub const RESYNC_BATTLE_STATE: &str = "resync_battle_state";
pub const GUEST_DESYNC_SIGNAL: &str = "guest_desync_signal";
pub const GUEST_RECONNECTION_READY: &str = "guest_reconnection_ready";

// Hero and creature state
pub const DAMAGE_APPLIED: &str = "damage_applied";
pub const DAMAGE_APPLIED_WITH_SHIELDS: &str = "damage_applied_with_shields";
pub const CREATURE_DAMAGE_APPLIED: &str = "creature_damage_applied";
pub const CREATURE_STATE_SYNC: &str = "creature_state_sync";
pub const REQUEST_CREATURE_SYNC: &str = "request_creature_sync";
pub const STATUS_EFFECT_APPLIED: &str = "status_effect_applied";
pub const STATUS_EFFECT_REMOVED: &str = "status_effect_removed";

// Card collections
pub const HAND_UPDATE: &str = "hand_update";
pub const DECK_UPDATE: &str = "deck_update";

// Battle flow
pub const TURN_STARTED: &str = "turn_started";
pub const BATTLE_ENDED: &str = "battle_ended";

// Paced position changes
pub const CRUSADER_HOOKSHOT_SWAP: &str = "crusader_hookshot_swap";
pub const EXPEDITION_POSITION_SWAP: &str = "expedition_position_swap";

/// Tags that go through the guest swap queue instead of applying inline.
pub const SWAP_KINDS: &[&str] = &[CRUSADER_HOOKSHOT_SWAP, EXPEDITION_POSITION_SWAP];

// Acknowledgment types
pub const ACK_RESYNC_COMPLETE: &str = "resync_complete";

/// Ability, artifact, spell and creature triggers.
///
/// The business logic lives in the content modules; the core only forwards
/// these to the presentation layer.
pub const EFFECT_CATALOG: &[&str] = &[
    "fireball_effect",
    "ice_bolt_effect",
    "poisoned_meat_effect",
    "heal_effect",
    "flame_avalanche_effect",
    "vampiric_strike_effect",
    "toras_sword_triggered",
    "blade_of_the_frost_born_triggered",
    "sun_sword_triggered",
    "skullmael_greatsword_triggered",
    "crusaders_arm_cannon_triggered",
    "fighting_bonus_triggered",
    "necromancy_revive_triggered",
    "toxic_trap_triggered",
    "fire_shield_triggered",
    "frost_rune_triggered",
    "skeleton_archer_attack",
    "skeleton_necromancer_attack",
    "burning_skeleton_attack",
    "front_soldier_attack",
    "archer_attack",
    "cute_phoenix_attack",
    "moonlight_butterfly_attack",
    "royal_corgi_attack",
    "crum_tract_attack",
    "biomancy_token_attack",
];
