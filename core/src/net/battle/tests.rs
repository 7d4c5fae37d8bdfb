//! End-to-end tests: a host and a guest over an in-memory link.

use battlelink_shared::{AbsoluteSide, CreatureState, HeroPosition, LocalSide};

use super::*;
use crate::net::battle::messages::{
    CreatureDamageApplied, CreatureTarget, DamageApplied, HeroTarget, PositionSwap,
};
use crate::test_utils::{Harness, set_hero_hp};

fn resumed(events: &[HostEvent]) -> Option<ResumeReason> {
    events.iter().find_map(|e| match e {
        HostEvent::Resumed { reason, .. } => Some(*reason),
        _ => None,
    })
}

fn mirror_matches_authority(h: &Harness) -> bool {
    h.guest.state() == &*h.battle.borrow()
}

// ============================================================================
// Disconnect / reconnect
// ============================================================================

#[test]
fn test_disconnect_reconnect_resyncs_missed_updates() {
    let mut h = Harness::new();

    h.link.set_online(false);
    h.host.on_presence(PresenceUpdate::OFFLINE, h.at(0));
    assert!(h.host.is_paused());

    // Updates the guest never saw
    {
        let mut battle = h.battle.borrow_mut();
        set_hero_hp(&mut battle, AbsoluteSide::Guest, HeroPosition::Left, 55);
        battle.turn = 4;
    }
    assert!(!mirror_matches_authority(&h));

    let (events, _) = h.run(0, 1900, 100);
    assert_eq!(resumed(&events), None);
    assert!(h.host.is_paused());

    h.link.set_online(true);
    h.host.on_presence(PresenceUpdate::ONLINE, h.at(2000));
    assert_eq!(h.host.link_state(), LinkState::Reconnecting);
    h.guest.announce_ready();

    // Ready grace: still paused until the resync is confirmed
    let (events, _) = h.run(2000, 2400, 100);
    assert_eq!(resumed(&events), None);
    assert!(h.host.is_paused());
    assert_eq!(h.host.link_state(), LinkState::Connected);

    let (events, guest_events) = h.run(2500, 3200, 100);
    assert!(events.contains(&HostEvent::ResyncStarted { resync_id: 1 }));
    assert!(events.contains(&HostEvent::ResyncFinished {
        resync_id: 1,
        acknowledged: true
    }));
    assert_eq!(resumed(&events), Some(ResumeReason::ResyncComplete));
    assert!(events.contains(&HostEvent::SimulationRestart));
    assert!(guest_events.contains(&MirrorEvent::FullRefresh));

    assert!(!h.host.is_paused());
    assert!(h.host.may_advance());
    assert!(mirror_matches_authority(&h));
    assert_eq!(h.guest.last_resync_id(), Some(1));
    assert_eq!(h.host.resync_stats(), (1, 0));
}

#[test]
fn test_drop_during_resync_stays_paused_until_next_handshake() {
    let mut h = Harness::new();

    h.link.set_online(false);
    h.host.on_presence(PresenceUpdate::OFFLINE, h.at(0));
    h.battle.borrow_mut().turn = 6;

    h.link.set_online(true);
    h.host.on_presence(PresenceUpdate::ONLINE, h.at(1000));
    h.guest.announce_ready();
    h.run(1000, 1400, 100);
    assert_eq!(h.host.link_state(), LinkState::Connected);

    // Snapshot goes out into a dead link
    h.link.set_online(false);
    let (events, _) = h.step(h.at(1500));
    assert!(events.contains(&HostEvent::ResyncStarted { resync_id: 1 }));

    h.host.on_presence(PresenceUpdate::OFFLINE, h.at(1600));
    assert_eq!(h.host.link_state(), LinkState::Disconnected);

    let (events, _) = h.run(1600, 12000, 100);
    assert_eq!(resumed(&events), None);
    assert!(h.host.is_paused());
    assert!(!h.host.may_advance());
    assert_eq!(h.host.link_state(), LinkState::Disconnected);
    assert_eq!(h.host.resync_stats(), (0, 1));
    assert!(!mirror_matches_authority(&h));

    // The next handshake runs a fresh snapshot
    h.link.set_online(true);
    h.host.on_presence(PresenceUpdate::ONLINE, h.at(12100));
    h.guest.announce_ready();
    let (events, _) = h.run(12100, 13500, 100);
    assert!(events.contains(&HostEvent::ResyncStarted { resync_id: 2 }));
    assert_eq!(resumed(&events), Some(ResumeReason::ResyncComplete));
    assert!(!h.host.is_paused());
    assert!(mirror_matches_authority(&h));
    assert_eq!(h.guest.last_resync_id(), Some(2));
    assert_eq!(h.host.resync_stats(), (1, 1));
}

#[test]
fn test_reconnect_without_handshake_resumes_after_timeout() {
    let mut h = Harness::new();

    h.host.on_presence(PresenceUpdate::OFFLINE, h.at(0));
    h.run(0, 900, 100);
    assert!(h.guest.is_paused(), "guest mirrored the pause notice");

    h.host.on_presence(PresenceUpdate::RECONNECTING, h.at(1000));
    let (events, _) = h.run(1000, 5900, 100);
    assert_eq!(resumed(&events), None, "never resumes before the handshake timeout");
    assert!(h.host.is_paused());

    let (events, _) = h.run(6000, 6000, 100);
    assert_eq!(resumed(&events), Some(ResumeReason::HandshakeTimeout));
    assert!(!h.host.is_paused());
    assert!(!h.guest.is_paused());
}

#[test]
fn test_pause_persisted_with_checkpoint() {
    let mut h = Harness::new();

    h.host.on_presence(PresenceUpdate::OFFLINE, h.at(0));
    h.step(h.at(0));

    let saved = h.store.latest().expect("persisted on pause");
    assert!(saved.connection.battle_paused);
    assert!(!saved.connection.opponent_connected);
    assert_eq!(saved.checkpoint, *h.battle.borrow());
}

// ============================================================================
// Pause round trip
// ============================================================================

#[test]
fn test_manual_pause_round_trip() {
    let mut h = Harness::new();

    h.host.pause(PauseReason::Manual, h.at(0));
    h.step(h.at(100));
    assert!(h.guest.is_paused());
    assert_eq!(h.host.pending_acks(), 0);
    // 100ms round trip + 100ms margin
    assert_eq!(h.host.latency(), crate::test_utils::ms(200));

    h.host.resume(ResumeReason::Manual, h.at(1100));
    let (events, _) = h.step(h.at(1100));
    assert!(!h.guest.is_paused());
    assert!(events.contains(&HostEvent::Resumed {
        reason: ResumeReason::Manual,
        paused_for: crate::test_utils::ms(1100),
    }));
    assert_eq!(h.host.total_pause(), crate::test_utils::ms(1100));
}

// ============================================================================
// Resync
// ============================================================================

#[test]
fn test_guest_desync_signal_round_trip() {
    let mut h = Harness::new();
    set_hero_hp(&mut h.battle.borrow_mut(), AbsoluteSide::Host, HeroPosition::Center, 20);

    h.guest.signal_desync("hp mismatch");
    let (events, guest_events) = h.step(h.at(0));

    assert!(events.contains(&HostEvent::ResyncFinished {
        resync_id: 1,
        acknowledged: true
    }));
    assert_eq!(resumed(&events), Some(ResumeReason::ResyncComplete));
    assert!(guest_events.contains(&MirrorEvent::FullRefresh));
    assert!(!h.host.is_paused());
    assert!(!h.guest.is_paused());
    assert!(mirror_matches_authority(&h));
}

#[test]
fn test_snapshot_overwrites_guest_drift() {
    let mut h = Harness::new();

    // Guest applies a stray update the host never made
    let stray = DamageApplied {
        target: HeroTarget {
            side: AbsoluteSide::Host,
            position: HeroPosition::Left,
        },
        damage: 70,
        new_hp: 10,
        source: None,
    };
    h.host.broadcast(kinds::DAMAGE_APPLIED, &stray).unwrap();
    h.step(h.at(0));
    assert_eq!(h.guest.state().host.heroes[0].hp, 10);

    h.host.begin_resync(
        ResyncTrigger::HostDetected {
            reason: "checksum drift".to_string(),
        },
        h.at(100),
    );
    h.step(h.at(100));

    let mirror = h.guest.state();
    assert_eq!(mirror.host.heroes[0].hp, 80);
    assert_eq!(mirror.host.heroes[1].hp, 45);
    assert_eq!(mirror.guest.heroes[0].creatures[0].hp, 10);
    assert!(mirror_matches_authority(&h));
}

#[test]
fn test_lossy_link_converges_after_resync() {
    let mut h = Harness::with_model(LinkModel {
        loss: 0.3,
        duplicate: 0.1,
        seed: 7,
    });

    for hp in (40..80).step_by(5).rev() {
        set_hero_hp(&mut h.battle.borrow_mut(), AbsoluteSide::Guest, HeroPosition::Left, hp);
        let update = DamageApplied {
            target: HeroTarget {
                side: AbsoluteSide::Guest,
                position: HeroPosition::Left,
            },
            damage: 5,
            new_hp: hp,
            source: None,
        };
        h.host.broadcast(kinds::DAMAGE_APPLIED, &update).unwrap();
    }
    h.step(h.at(0));

    let mut t = 0;
    for _ in 0..20 {
        if let Some(id) = h.host.begin_resync(
            ResyncTrigger::HostDetected {
                reason: "lossy link".to_string(),
            },
            h.at(t),
        ) {
            h.run(t, t + 11_000, 500);
            t += 11_500;
            if h.guest.last_resync_id() == Some(id) {
                break;
            }
        }
    }

    assert!(mirror_matches_authority(&h));
    assert!(!h.host.resync_in_flight());
    assert!(!h.host.is_paused());
    assert!(h.link.sent() > h.link.dropped());
}

// ============================================================================
// Creature drift
// ============================================================================

#[test]
fn test_unknown_creature_recovered_by_creature_sync() {
    let mut h = Harness::new();

    // Host summoned a creature the guest never heard about, then damaged it
    {
        let mut battle = h.battle.borrow_mut();
        let hero = battle
            .side_mut(AbsoluteSide::Host)
            .hero_mut(HeroPosition::Left)
            .unwrap();
        hero.creatures.insert(0, CreatureState::new("Burning Skeleton", 4, 6));
    }
    let update = CreatureDamageApplied {
        target: CreatureTarget {
            side: AbsoluteSide::Host,
            hero_position: HeroPosition::Left,
            creature_index: 0,
            creature_name: "Burning Skeleton".to_string(),
            creature_hp: Some(6),
        },
        damage: 2,
        new_hp: 4,
        died: false,
    };
    h.host.broadcast(kinds::CREATURE_DAMAGE_APPLIED, &update).unwrap();

    let (events, guest_events) = h.step(h.at(0));

    assert!(events.contains(&HostEvent::CreatureSyncSent {
        side: AbsoluteSide::Host
    }));
    assert!(guest_events.contains(&MirrorEvent::CreaturesReplaced {
        side: LocalSide::Opponent,
        hero: HeroPosition::Left,
    }));
    let creatures = &h.guest.state().host.hero(HeroPosition::Left).unwrap().creatures;
    assert_eq!(creatures.len(), 2);
    assert_eq!(creatures[0].name, "Burning Skeleton");
    assert_eq!(creatures[0].hp, 4);
    assert_eq!(creatures[1].name, "Skeleton Archer");
}

#[test]
fn test_creature_damage_after_untracked_removal() {
    let mut h = Harness::new();

    // The host's index still counts a creature the guest already removed
    {
        let mut battle = h.battle.borrow_mut();
        let hero = battle
            .side_mut(AbsoluteSide::Host)
            .hero_mut(HeroPosition::Left)
            .unwrap();
        hero.creatures[0].hp = 7;
    }
    let update = CreatureDamageApplied {
        target: CreatureTarget {
            side: AbsoluteSide::Host,
            hero_position: HeroPosition::Left,
            creature_index: 1,
            creature_name: "Skeleton Archer".to_string(),
            creature_hp: Some(10),
        },
        damage: 3,
        new_hp: 7,
        died: false,
    };
    h.host.broadcast(kinds::CREATURE_DAMAGE_APPLIED, &update).unwrap();
    let (events, _) = h.step(h.at(0));

    assert!(events.is_empty(), "no creature sync needed");
    let creature = &h.guest.state().host.hero(HeroPosition::Left).unwrap().creatures[0];
    assert_eq!(creature.hp, 7);
    assert!(mirror_matches_authority(&h));
}

// ============================================================================
// Swap pacing
// ============================================================================

#[test]
fn test_swap_burst_applied_at_min_interval() {
    let mut h = Harness::new();
    let positions = [
        (HeroPosition::Left, HeroPosition::Center),
        (HeroPosition::Center, HeroPosition::Right),
        (HeroPosition::Right, HeroPosition::Left),
    ];
    for (i, (from, to)) in positions.into_iter().enumerate() {
        let swap = PositionSwap {
            side: AbsoluteSide::Guest,
            from,
            to,
            id: Some(format!("swap-{i}")),
        };
        h.host.broadcast(kinds::EXPEDITION_POSITION_SWAP, &swap).unwrap();
    }

    let mut applied = Vec::new();
    for t in (0..=700).step_by(50) {
        let (_, guest_events) = h.step(h.at(t));
        for event in guest_events {
            if let MirrorEvent::HeroesSwapped { from, to, .. } = event {
                applied.push((t, from, to));
            }
        }
    }

    assert_eq!(
        applied,
        vec![
            (0, HeroPosition::Left, HeroPosition::Center),
            (300, HeroPosition::Center, HeroPosition::Right),
            (600, HeroPosition::Right, HeroPosition::Left),
        ]
    );
    // Darge went Left -> Center -> Right -> Left
    assert_eq!(
        h.guest.state().guest.hero(HeroPosition::Left).unwrap().name,
        "Darge"
    );
}

// ============================================================================
// Dispatch robustness
// ============================================================================

#[test]
fn test_garbage_on_the_wire_changes_nothing() {
    let mut h = Harness::new();
    let before = h.guest.state().clone();

    for text in [
        "null",
        "{}",
        r#"{"type":"battle_data"}"#,
        r#"{"type":"battle_data","data":null}"#,
        r#"{"type":"battle_data","data":{"data":{}}}"#,
        r#"{"type":"battle_data","data":{"type":"no_such_message","data":{}}}"#,
        r#"{"type":"carrier_pigeon","data":{}}"#,
    ] {
        h.guest.receive_raw(text, h.at(0));
        h.host.receive_raw(text, h.at(0));
    }
    let (events, guest_events) = h.step(h.at(0));

    assert!(events.is_empty());
    assert!(guest_events.is_empty());
    assert_eq!(h.guest.state(), &before);
    assert!(!h.host.is_paused());
}
