//! Guest-side mirror of the authoritative battle
//!
//! Handlers update the mirrored checkpoint first and then record a
//! [`MirrorEvent`] describing what changed, with sides already translated to
//! the guest's point of view. The presentation layer drains the events once
//! per frame and renders them.
//!
//! The host always sends the resulting value (`new_hp`), never a delta, so
//! applying the same update twice is harmless.

use battlelink_shared::{
    AbsoluteSide, BattleCheckpoint, CreatureState, HeroPosition, HeroState, LocalSide, PeerRole,
};
use serde_json::Value;

use super::dispatch::HandlerError;
use super::messages::{
    CreatureDamageApplied, CreatureStateSync, CreatureTarget, DamageApplied,
    DamageAppliedWithShields, HeroTarget, PositionSwap, StatusEffectChange,
};

/// Something the presentation layer should render
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorEvent {
    HeroHpChanged {
        side: LocalSide,
        position: HeroPosition,
        hp: i32,
        shield: i32,
        damage: i32,
    },
    HeroDefeated {
        side: LocalSide,
        position: HeroPosition,
    },
    CreatureHpChanged {
        side: LocalSide,
        hero: HeroPosition,
        index: usize,
        name: String,
        hp: i32,
    },
    CreatureDefeated {
        side: LocalSide,
        hero: HeroPosition,
        index: usize,
        name: String,
    },
    CreaturesReplaced {
        side: LocalSide,
        hero: HeroPosition,
    },
    HeroesSwapped {
        side: LocalSide,
        from: HeroPosition,
        to: HeroPosition,
    },
    StatusEffectsChanged {
        side: LocalSide,
        position: HeroPosition,
    },
    HandChanged {
        side: LocalSide,
        count: usize,
    },
    DeckChanged {
        side: LocalSide,
        count: usize,
    },
    PauseChanged {
        paused: bool,
        reason: String,
    },
    TurnStarted {
        turn: u32,
    },
    BattleEnded {
        winner: Option<LocalSide>,
    },
    /// Catalog effect forwarded untouched
    EffectTriggered {
        kind: String,
        data: Value,
    },
    /// Everything changed; redraw from the checkpoint
    FullRefresh,
}

/// Which lookup strategy found a creature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatureMatch {
    /// Index held a creature with the expected name (and HP when given)
    ExactIndex,
    /// Found elsewhere by name and pre-update HP
    NameAndHp,
    /// Found by name alone
    NameOnly,
}

/// Find the creature a host update refers to.
///
/// Indices drift when creatures die or are summoned between the host building
/// a message and the guest applying it, so the index is only trusted when the
/// name (and the pre-update HP, if sent) agree.
pub fn locate_creature(
    creatures: &[CreatureState],
    target: &CreatureTarget,
) -> Option<(usize, CreatureMatch)> {
    let name = target.creature_name.as_str();

    if let Some(creature) = creatures.get(target.creature_index)
        && creature.name == name
        && target.creature_hp.is_none_or(|hp| hp == creature.hp)
    {
        return Some((target.creature_index, CreatureMatch::ExactIndex));
    }

    if let Some(hp) = target.creature_hp
        && let Some(index) = creatures.iter().position(|c| c.name == name && c.hp == hp)
    {
        return Some((index, CreatureMatch::NameAndHp));
    }

    creatures
        .iter()
        .position(|c| c.name == name && c.alive)
        .or_else(|| creatures.iter().position(|c| c.name == name))
        .map(|index| (index, CreatureMatch::NameOnly))
}

fn hero_mut(
    state: &mut BattleCheckpoint,
    target: HeroTarget,
) -> Result<&mut HeroState, HandlerError> {
    state
        .side_mut(target.side)
        .hero_mut(target.position)
        .ok_or_else(|| {
            HandlerError::TargetNotFound(format!("{:?} hero at {:?}", target.side, target.position))
        })
}

/// The guest's copy of the battle plus pending render events.
#[derive(Debug, Clone)]
pub struct GuestMirror {
    me: PeerRole,
    state: BattleCheckpoint,
    events: Vec<MirrorEvent>,
}

impl GuestMirror {
    pub fn new(state: BattleCheckpoint) -> Self {
        Self {
            me: PeerRole::Guest,
            state,
            events: Vec::new(),
        }
    }

    fn local(&self, side: AbsoluteSide) -> LocalSide {
        side.to_local(self.me)
    }

    pub fn state(&self) -> &BattleCheckpoint {
        &self.state
    }

    /// Queue a render event.
    pub fn emit(&mut self, event: MirrorEvent) {
        self.events.push(event);
    }

    /// Take everything recorded since the last render pass.
    pub fn drain_events(&mut self) -> Vec<MirrorEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub fn apply_damage(&mut self, update: &DamageApplied) -> Result<(), HandlerError> {
        self.set_hero_hp(update.target, update.new_hp, None, update.damage)
    }

    pub fn apply_shielded_damage(
        &mut self,
        update: &DamageAppliedWithShields,
    ) -> Result<(), HandlerError> {
        self.set_hero_hp(
            update.target,
            update.new_hp,
            Some(update.new_shield),
            update.damage + update.shield_damage,
        )
    }

    fn set_hero_hp(
        &mut self,
        target: HeroTarget,
        hp: i32,
        shield: Option<i32>,
        damage: i32,
    ) -> Result<(), HandlerError> {
        let hero = hero_mut(&mut self.state, target)?;
        hero.hp = hp;
        if let Some(shield) = shield {
            hero.shield = shield.max(0);
        }
        let died = hero.alive && hero.hp <= 0;
        if died {
            hero.alive = false;
        }
        let shield = hero.shield;

        let side = self.local(target.side);
        self.emit(MirrorEvent::HeroHpChanged {
            side,
            position: target.position,
            hp,
            shield,
            damage,
        });
        if died {
            self.emit(MirrorEvent::HeroDefeated {
                side,
                position: target.position,
            });
        }
        Ok(())
    }

    /// Apply creature damage using the multi-strategy lookup.
    ///
    /// Returns [`HandlerError::TargetNotFound`] when no strategy matches; the
    /// caller then asks the host for a creature sync.
    pub fn apply_creature_damage(
        &mut self,
        update: &CreatureDamageApplied,
    ) -> Result<CreatureMatch, HandlerError> {
        let target = &update.target;
        let hero_target = HeroTarget {
            side: target.side,
            position: target.hero_position,
        };
        let hero = hero_mut(&mut self.state, hero_target)?;
        let (index, matched) = locate_creature(&hero.creatures, target).ok_or_else(|| {
            HandlerError::TargetNotFound(format!(
                "creature '{}' under {:?} {:?}",
                target.creature_name, target.side, target.hero_position
            ))
        })?;

        let creature = &mut hero.creatures[index];
        creature.hp = update.new_hp;
        let died = creature.alive && (update.died || creature.hp <= 0);
        if died {
            creature.alive = false;
        }
        let name = creature.name.clone();

        if matched != CreatureMatch::ExactIndex {
            tracing::debug!(
                creature = %name,
                sent_index = target.creature_index,
                index,
                strategy = ?matched,
                "Creature index drifted"
            );
        }

        let side = self.local(target.side);
        self.emit(MirrorEvent::CreatureHpChanged {
            side,
            hero: target.hero_position,
            index,
            name: name.clone(),
            hp: update.new_hp,
        });
        if died {
            self.emit(MirrorEvent::CreatureDefeated {
                side,
                hero: target.hero_position,
                index,
                name,
            });
        }
        Ok(matched)
    }

    /// Replace creature lists wholesale.
    ///
    /// Heroes the mirror does not know are skipped; returns how many lists
    /// were replaced.
    pub fn sync_creatures(&mut self, sync: &CreatureStateSync) -> usize {
        let mut replaced = 0;
        for side in &sync.sides {
            for block in &side.heroes {
                let target = HeroTarget {
                    side: side.side,
                    position: block.position,
                };
                let hero = match hero_mut(&mut self.state, target) {
                    Ok(hero) => hero,
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping creature sync block");
                        continue;
                    }
                };
                hero.creatures = block.creatures.clone();
                replaced += 1;
                let local = self.local(side.side);
                self.emit(MirrorEvent::CreaturesReplaced {
                    side: local,
                    hero: block.position,
                });
            }
        }
        replaced
    }

    pub fn set_hand(&mut self, side: AbsoluteSide, cards: Vec<String>) {
        let count = cards.len();
        self.state.side_mut(side).hand = cards;
        let side = self.local(side);
        self.emit(MirrorEvent::HandChanged { side, count });
    }

    pub fn set_deck(&mut self, side: AbsoluteSide, cards: Vec<String>) {
        let count = cards.len();
        self.state.side_mut(side).deck = cards;
        let side = self.local(side);
        self.emit(MirrorEvent::DeckChanged { side, count });
    }

    /// Move the hero at `from` to `to`, trading places with any hero there.
    pub fn swap_positions(&mut self, swap: &PositionSwap) -> Result<(), HandlerError> {
        let heroes = &mut self.state.side_mut(swap.side).heroes;
        let from = heroes
            .iter()
            .position(|h| h.position == swap.from)
            .ok_or_else(|| {
                HandlerError::TargetNotFound(format!("{:?} hero at {:?}", swap.side, swap.from))
            })?;
        let to = heroes.iter().position(|h| h.position == swap.to);

        heroes[from].position = swap.to;
        if let Some(to) = to
            && to != from
        {
            heroes[to].position = swap.from;
        }

        let side = self.local(swap.side);
        self.emit(MirrorEvent::HeroesSwapped {
            side,
            from: swap.from,
            to: swap.to,
        });
        Ok(())
    }

    pub fn apply_status(&mut self, change: &StatusEffectChange) -> Result<(), HandlerError> {
        let hero = hero_mut(&mut self.state, change.target)?;
        hero.add_status(&change.effect, change.stacks.unwrap_or(1));
        self.emit_status_changed(change.target);
        Ok(())
    }

    pub fn remove_status(&mut self, change: &StatusEffectChange) -> Result<(), HandlerError> {
        let hero = hero_mut(&mut self.state, change.target)?;
        hero.remove_status(&change.effect, change.stacks);
        self.emit_status_changed(change.target);
        Ok(())
    }

    fn emit_status_changed(&mut self, target: HeroTarget) {
        let side = self.local(target.side);
        self.emit(MirrorEvent::StatusEffectsChanged {
            side,
            position: target.position,
        });
    }

    pub fn start_turn(&mut self, turn: u32) {
        self.state.turn = turn;
        self.emit(MirrorEvent::TurnStarted { turn });
    }

    pub fn end_battle(&mut self, winner: Option<AbsoluteSide>) {
        self.state.battle_active = false;
        self.state.winner = winner;
        let winner = winner.map(|side| self.local(side));
        self.emit(MirrorEvent::BattleEnded { winner });
    }

    /// Destructively replace the whole mirror.
    ///
    /// Pending state events describe the old state, so they are discarded in
    /// favour of a single full refresh. Pause changes are not part of the
    /// checkpoint and are kept.
    pub fn replace(&mut self, checkpoint: BattleCheckpoint) {
        self.state = checkpoint;
        self.events
            .retain(|event| matches!(event, MirrorEvent::PauseChanged { .. }));
        self.emit(MirrorEvent::FullRefresh);
    }
}
