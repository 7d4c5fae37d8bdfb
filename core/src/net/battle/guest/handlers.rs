//! Guest message handlers
//!
//! Every handler updates the mirror first, then records render events.

use std::time::Instant;

use battlelink_shared::{AbsoluteSide, HeroPosition};
use serde_json::Value;

use crate::net::battle::dispatch::{Dispatcher, HandlerError, HandlerModule};
use crate::net::battle::messages::{
    BattleEnded, CardCollectionUpdate, CreatureDamageApplied, CreatureStateSync, DamageApplied,
    DamageAppliedWithShields, PauseNotice, PositionSwap, RequestCreatureSync, ResyncBattleState,
    StatusEffectChange, TurnStarted, kinds,
};
use crate::net::battle::mirror::MirrorEvent;
use crate::net::battle::timing::wall_clock_ms;

use super::state::GuestContext;

/// The core message catalog.
pub struct BuiltinGuestHandlers;

impl HandlerModule<GuestContext> for BuiltinGuestHandlers {
    fn name(&self) -> &'static str {
        "guest-builtin"
    }

    fn register(&self, d: &mut Dispatcher<GuestContext>) {
        // Pause mirroring
        d.register_typed(kinds::BATTLE_PAUSED, |ctx: &mut GuestContext, n: PauseNotice, now| {
            mirror_pause(ctx, true, &n.reason, now);
            ctx.ack(kinds::BATTLE_PAUSED);
            Ok(())
        });
        d.register_typed(kinds::BATTLE_RESUMED, |ctx: &mut GuestContext, n: PauseNotice, now| {
            mirror_pause(ctx, false, &n.reason, now);
            ctx.ack(kinds::BATTLE_RESUMED);
            Ok(())
        });

        d.register_typed(kinds::RESYNC_BATTLE_STATE, apply_resync);

        // Heroes
        d.register_typed(kinds::DAMAGE_APPLIED, |ctx: &mut GuestContext, u: DamageApplied, _| {
            ctx.mirror.apply_damage(&u)
        });
        d.register_typed(
            kinds::DAMAGE_APPLIED_WITH_SHIELDS,
            |ctx: &mut GuestContext, u: DamageAppliedWithShields, _| {
                ctx.mirror.apply_shielded_damage(&u)
            },
        );
        d.register_typed(
            kinds::STATUS_EFFECT_APPLIED,
            |ctx: &mut GuestContext, c: StatusEffectChange, _| ctx.mirror.apply_status(&c),
        );
        d.register_typed(
            kinds::STATUS_EFFECT_REMOVED,
            |ctx: &mut GuestContext, c: StatusEffectChange, _| ctx.mirror.remove_status(&c),
        );

        // Creatures
        d.register_typed(kinds::CREATURE_DAMAGE_APPLIED, apply_creature_damage);
        d.register_typed(
            kinds::CREATURE_STATE_SYNC,
            |ctx: &mut GuestContext, sync: CreatureStateSync, _| {
                ctx.mirror.sync_creatures(&sync);
                Ok(())
            },
        );

        // Card collections
        d.register_typed(kinds::HAND_UPDATE, |ctx: &mut GuestContext, u: CardCollectionUpdate, _| {
            ctx.mirror.set_hand(u.side, u.cards);
            Ok(())
        });
        d.register_typed(kinds::DECK_UPDATE, |ctx: &mut GuestContext, u: CardCollectionUpdate, _| {
            ctx.mirror.set_deck(u.side, u.cards);
            Ok(())
        });

        // Battle flow
        d.register_typed(kinds::TURN_STARTED, |ctx: &mut GuestContext, t: TurnStarted, _| {
            ctx.mirror.start_turn(t.turn);
            Ok(())
        });
        d.register_typed(kinds::BATTLE_ENDED, |ctx: &mut GuestContext, e: BattleEnded, _| {
            ctx.mirror.end_battle(e.winner);
            Ok(())
        });

        // Paced swaps
        for kind in kinds::SWAP_KINDS {
            d.register_deferred(kind, |ctx: &mut GuestContext, swap: PositionSwap, _| {
                ctx.mirror.swap_positions(&swap)
            });
        }
    }
}

/// Forwards catalog effects to the presentation layer.
///
/// Effect logic lives with the content modules; the mirror only learns about
/// their consequences through the state messages that follow.
pub struct EffectCatalogModule;

impl HandlerModule<GuestContext> for EffectCatalogModule {
    fn name(&self) -> &'static str {
        "effect-catalog"
    }

    fn register(&self, d: &mut Dispatcher<GuestContext>) {
        for kind in kinds::EFFECT_CATALOG {
            d.register(kind, |ctx: &mut GuestContext, message, _| {
                ctx.mirror.emit(MirrorEvent::EffectTriggered {
                    kind: message.kind.clone(),
                    data: message.data.clone(),
                });
                Ok(())
            });
        }
    }
}

fn mirror_pause(ctx: &mut GuestContext, paused: bool, reason: &str, now: Instant) {
    if ctx.pause.mirror_remote(paused, reason, now) {
        ctx.mirror.emit(MirrorEvent::PauseChanged {
            paused,
            reason: reason.to_string(),
        });
    }
}

fn apply_resync(
    ctx: &mut GuestContext,
    resync: ResyncBattleState,
    now: Instant,
) -> Result<(), HandlerError> {
    if let Some(expected) = resync.checksum {
        match resync.battle_state.checksum() {
            Ok(actual) if actual == expected => {}
            Ok(actual) => tracing::warn!(
                resync_id = resync.resync_id,
                expected,
                actual,
                "Snapshot checksum mismatch, applying anyway"
            ),
            Err(e) => tracing::warn!(error = %e, "Failed to checksum snapshot"),
        }
    }

    let local_turn = ctx.mirror.state().turn;
    ctx.mirror.replace(resync.battle_state);
    let flushed = ctx.swaps.clear();
    ctx.last_resync = Some((resync.resync_id, now));

    tracing::info!(
        resync_id = resync.resync_id,
        host_turn = resync.host_turn,
        local_turn,
        flushed_swaps = flushed,
        message = %resync.message,
        "Mirror replaced from snapshot"
    );
    ctx.ack(kinds::ACK_RESYNC_COMPLETE);
    Ok(())
}

fn apply_creature_damage(
    ctx: &mut GuestContext,
    update: CreatureDamageApplied,
    _now: Instant,
) -> Result<(), HandlerError> {
    match ctx.mirror.apply_creature_damage(&update) {
        Ok(_) => Ok(()),
        Err(HandlerError::TargetNotFound(what)) => {
            tracing::warn!(creature = %what, "Creature not found, requesting sync");
            request_creature_sync(ctx, update.target.side, Some(update.target.hero_position), &what)
        }
        Err(e) => Err(e),
    }
}

fn request_creature_sync(
    ctx: &mut GuestContext,
    side: AbsoluteSide,
    hero_position: Option<HeroPosition>,
    reason: &str,
) -> Result<(), HandlerError> {
    let request = RequestCreatureSync {
        side,
        hero_position,
        reason: reason.to_string(),
        timestamp: wall_clock_ms(),
    };
    ctx.send(kinds::REQUEST_CREATURE_SYNC, &request)
        .map_err(|e| HandlerError::Rejected(e.to_string()))
}

/// Swap id carried in a payload, if any.
pub(super) fn swap_id(data: &Value) -> Option<String> {
    data.get("id").and_then(Value::as_str).map(str::to_string)
}
