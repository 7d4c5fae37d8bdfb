use std::time::{Duration, Instant};

use battlelink_shared::{AbsoluteSide, HeroPosition};

use super::*;
use crate::net::battle::messages::{GuestDesyncSignal, GuestReconnectionReady, RequestCreatureSync};
use crate::test_utils::{ms, recording_host};

fn ready_frame() -> WireFrame {
    WireFrame::data(
        kinds::GUEST_RECONNECTION_READY,
        &GuestReconnectionReady {
            timestamp: 0,
            guest_turn: Some(3),
        },
    )
    .unwrap()
}

fn has(events: &[HostEvent], wanted: &HostEvent) -> bool {
    events.iter().any(|e| e == wanted)
}

fn resumed_with(events: &[HostEvent], wanted: ResumeReason) -> bool {
    events
        .iter()
        .any(|e| matches!(e, HostEvent::Resumed { reason, .. } if *reason == wanted))
}

// ============================================================================
// Pause gate
// ============================================================================

#[test]
fn test_pause_sends_notice_and_persists() {
    let (mut host, channel, store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    assert!(host.pause(PauseReason::Manual, t0));
    assert!(!host.pause(PauseReason::Manual, t0), "second pause is a no-op");

    assert!(host.is_paused());
    assert!(!host.may_advance());
    assert_eq!(channel.kinds(), vec![kinds::BATTLE_PAUSED.to_string()]);
    assert_eq!(store.saves(), 1);
    assert!(store.latest().unwrap().connection.battle_paused);
    assert_eq!(host.pending_acks(), 1);

    let events = host.poll(t0);
    assert!(has(&events, &HostEvent::Paused { reason: PauseReason::Manual }));
}

#[test]
fn test_resume_restarts_after_settle() {
    let (mut host, channel, _store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    host.pause(PauseReason::Manual, t0);
    assert!(host.resume(ResumeReason::Manual, t0 + ms(1000)));
    assert!(!host.resume(ResumeReason::Manual, t0 + ms(1000)), "not paused any more");

    assert_eq!(
        channel.kinds(),
        vec![kinds::BATTLE_PAUSED.to_string(), kinds::BATTLE_RESUMED.to_string()]
    );
    assert!(!host.is_paused());
    assert!(!host.may_advance(), "restart still pending");

    let events = host.poll(t0 + ms(1000));
    assert!(has(
        &events,
        &HostEvent::Resumed {
            reason: ResumeReason::Manual,
            paused_for: ms(1000),
        }
    ));
    assert!(!has(&events, &HostEvent::SimulationRestart));

    assert!(host.poll(t0 + ms(1499)).is_empty());
    let events = host.poll(t0 + ms(1500));
    assert_eq!(events, vec![HostEvent::SimulationRestart]);
    assert!(host.may_advance());
    assert_eq!(host.total_pause(), ms(1000));
}

#[test]
fn test_resume_skips_restart_when_outcome_decided() {
    let (mut host, _channel, _store, battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    host.pause(PauseReason::Manual, t0);
    battle.borrow_mut().winner = Some(AbsoluteSide::Guest);
    host.resume(ResumeReason::Manual, t0 + ms(10));

    assert!(host.may_advance());
    let events = host.poll(t0 + ms(2000));
    assert!(!has(&events, &HostEvent::SimulationRestart));
}

#[test]
fn test_notice_ack_timeout_does_not_block() {
    let (mut host, _channel, _store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    host.pause(PauseReason::Manual, t0);
    assert_eq!(host.pending_acks(), 1);

    // Adaptive timeout with no samples: floor 200ms * 3, raised to the 1s minimum
    host.poll(t0 + ms(999));
    assert_eq!(host.pending_acks(), 1);
    host.poll(t0 + ms(1000));
    assert_eq!(host.pending_acks(), 0);
    assert!(host.is_paused(), "a lost ack never changes the pause state");
}

#[test]
fn test_notice_ack_updates_latency() {
    let (mut host, _channel, _store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    host.pause(PauseReason::Manual, t0);
    host.receive(WireFrame::ack(kinds::BATTLE_PAUSED), t0 + ms(400));
    host.poll(t0 + ms(400));

    assert_eq!(host.pending_acks(), 0);
    // First sample replaces the floor: 400ms round trip + 100ms margin
    assert_eq!(host.latency(), ms(500));
}

#[test]
fn test_speed_scales_ack_deadline() {
    let (mut host, _channel, _store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    host.set_speed(2.0);
    host.pause(PauseReason::Manual, t0);
    host.poll(t0 + ms(500));
    assert_eq!(host.pending_acks(), 0);
}

// ============================================================================
// Connection monitor
// ============================================================================

#[test]
fn test_guest_offline_pauses() {
    let (mut host, channel, _store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    host.on_presence(PresenceUpdate::OFFLINE, t0);

    assert!(host.is_paused());
    assert_eq!(host.link_state(), LinkState::Disconnected);
    assert_eq!(channel.kinds(), vec![kinds::BATTLE_PAUSED.to_string()]);

    let events = host.poll(t0);
    assert!(has(&events, &HostEvent::LinkChanged(LinkState::Disconnected)));
    assert!(has(
        &events,
        &HostEvent::Paused {
            reason: PauseReason::GuestDisconnected
        }
    ));
    assert!(!host.connection_state().opponent_connected);
}

#[test]
fn test_handshake_timeout_resumes() {
    let (mut host, _channel, _store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    host.on_presence(PresenceUpdate::OFFLINE, t0);
    host.on_presence(PresenceUpdate::ONLINE, t0 + ms(2000));
    assert_eq!(host.link_state(), LinkState::Reconnecting);
    assert!(host.connection_state().guest_reconnecting);

    assert!(!resumed_with(&host.poll(t0 + ms(6999)), ResumeReason::HandshakeTimeout));
    let events = host.poll(t0 + ms(7000));

    assert!(resumed_with(&events, ResumeReason::HandshakeTimeout));
    assert_eq!(host.link_state(), LinkState::Connected);
    assert!(!host.is_paused());
}

#[test]
fn test_guest_ready_resyncs_after_grace() {
    let (mut host, channel, _store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    host.on_presence(PresenceUpdate::OFFLINE, t0);
    host.on_presence(PresenceUpdate::ONLINE, t0 + ms(1000));
    host.receive(ready_frame(), t0 + ms(1200));
    assert_eq!(host.link_state(), LinkState::Connected);

    let events = host.poll(t0 + ms(1699));
    assert!(!has(&events, &HostEvent::ResyncStarted { resync_id: 1 }));

    let events = host.poll(t0 + ms(1700));
    assert!(has(&events, &HostEvent::ResyncStarted { resync_id: 1 }));
    assert!(host.resync_in_flight());
    assert!(host.is_paused());
    assert!(channel.kinds().contains(&kinds::RESYNC_BATTLE_STATE.to_string()));

    host.receive(WireFrame::ack(kinds::ACK_RESYNC_COMPLETE), t0 + ms(1800));
    let events = host.poll(t0 + ms(1800));

    assert!(has(
        &events,
        &HostEvent::ResyncFinished {
            resync_id: 1,
            acknowledged: true
        }
    ));
    assert!(resumed_with(&events, ResumeReason::ResyncComplete));
    assert_eq!(host.resync_stats(), (1, 0));
    assert!(!host.is_paused());
}

#[test]
fn test_tab_hidden_defers_disconnect() {
    let (mut host, _channel, _store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    host.set_tab_hidden(true, t0);
    host.on_presence(PresenceUpdate::OFFLINE, t0);
    assert!(!host.is_paused());

    host.poll(t0 + ms(2999));
    assert!(!host.is_paused());
    host.poll(t0 + ms(3000));
    assert!(host.is_paused());
}

#[test]
fn test_tab_hidden_drop_recovered_before_recheck() {
    let (mut host, _channel, _store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    host.set_tab_hidden(true, t0);
    host.on_presence(PresenceUpdate::OFFLINE, t0);
    host.on_presence(PresenceUpdate::ONLINE, t0 + ms(1000));
    host.poll(t0 + ms(3000));

    assert!(!host.is_paused());
    assert_eq!(host.link_state(), LinkState::Connected);
}

// ============================================================================
// Resync
// ============================================================================

#[test]
fn test_resync_snapshot_carries_checkpoint() {
    let (mut host, channel, _store, battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    let id = host.begin_resync(
        ResyncTrigger::HostDetected {
            reason: "manual".to_string(),
        },
        t0,
    );
    assert_eq!(id, Some(1));

    let snapshot = channel
        .take()
        .into_iter()
        .find_map(|frame| match frame {
            WireFrame::BattleData(m) if m.kind == kinds::RESYNC_BATTLE_STATE => {
                Some(m.payload::<ResyncBattleState>().unwrap())
            }
            _ => None,
        })
        .expect("snapshot sent");

    let expected = battle.borrow().clone();
    assert_eq!(snapshot.resync_id, 1);
    assert_eq!(snapshot.host_turn, expected.turn);
    assert_eq!(snapshot.checksum, Some(expected.checksum().unwrap()));
    assert_eq!(snapshot.battle_state, expected);
    assert!(snapshot.message.contains("manual"));
}

#[test]
fn test_resync_timeout_resumes_as_failed() {
    let (mut host, _channel, _store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    host.begin_resync(
        ResyncTrigger::HostDetected {
            reason: "drift".to_string(),
        },
        t0,
    );
    assert!(host.is_paused());

    host.poll(t0 + ms(9999));
    assert!(host.resync_in_flight());

    let events = host.poll(t0 + ms(10_000));
    assert!(has(
        &events,
        &HostEvent::ResyncFinished {
            resync_id: 1,
            acknowledged: false
        }
    ));
    assert!(resumed_with(&events, ResumeReason::ResyncFailed));
    assert_eq!(host.resync_stats(), (0, 1));
}

#[test]
fn test_resync_requests_coalesce() {
    let (mut host, channel, _store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    assert_eq!(host.begin_resync(ResyncTrigger::Reconnection, t0), Some(1));
    assert_eq!(host.begin_resync(ResyncTrigger::Reconnection, t0 + ms(10)), None);

    let snapshots = channel
        .kinds()
        .iter()
        .filter(|k| k.as_str() == kinds::RESYNC_BATTLE_STATE)
        .count();
    assert_eq!(snapshots, 1);

    host.receive(WireFrame::ack(kinds::ACK_RESYNC_COMPLETE), t0 + ms(50));
    host.poll(t0 + ms(50));
    assert_eq!(host.begin_resync(ResyncTrigger::Reconnection, t0 + ms(60)), Some(2));
}

#[test]
fn test_guest_desync_keeps_existing_pause() {
    let (mut host, _channel, _store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    host.pause(PauseReason::Manual, t0);
    let signal = WireFrame::data(
        kinds::GUEST_DESYNC_SIGNAL,
        &GuestDesyncSignal {
            timestamp: 0,
            guest_turn: 2,
            reason: "hp mismatch".to_string(),
        },
    )
    .unwrap();
    host.receive(signal, t0 + ms(10));
    assert!(host.resync_in_flight());

    host.receive(WireFrame::ack(kinds::ACK_RESYNC_COMPLETE), t0 + ms(100));
    let events = host.poll(t0 + ms(100));

    assert!(has(
        &events,
        &HostEvent::ResyncFinished {
            resync_id: 1,
            acknowledged: true
        }
    ));
    assert!(host.is_paused(), "manual pause outlives the resync");
}

#[test]
fn test_creature_sync_request_answered() {
    let (mut host, channel, _store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    let request = WireFrame::data(
        kinds::REQUEST_CREATURE_SYNC,
        &RequestCreatureSync {
            side: AbsoluteSide::Host,
            hero_position: Some(HeroPosition::Left),
            reason: "missing".to_string(),
            timestamp: 0,
        },
    )
    .unwrap();
    host.receive(request, t0);

    let sync = channel
        .take()
        .into_iter()
        .find_map(|frame| match frame {
            WireFrame::BattleData(m) if m.kind == kinds::CREATURE_STATE_SYNC => {
                Some(m.payload::<CreatureStateSync>().unwrap())
            }
            _ => None,
        })
        .expect("creature sync sent");

    assert_eq!(sync.sides.len(), 1);
    assert_eq!(sync.sides[0].side, AbsoluteSide::Host);
    assert_eq!(sync.sides[0].heroes.len(), 1);
    assert_eq!(sync.sides[0].heroes[0].creatures[0].name, "Skeleton Archer");

    let events = host.poll(t0);
    assert!(has(&events, &HostEvent::CreatureSyncSent { side: AbsoluteSide::Host }));
}

#[test]
fn test_creature_sync_for_whole_side() {
    let checkpoint = crate::test_utils::sample_checkpoint();
    let sync = creature_sync_for(&checkpoint, AbsoluteSide::Guest, None);
    assert_eq!(sync.sides[0].heroes.len(), 2);
    assert_eq!(sync.sides[0].heroes[0].creatures[0].name, "Front Soldier");
    assert!(sync.sides[0].heroes[1].creatures.is_empty());
}

// ============================================================================
// Offline mode
// ============================================================================

#[test]
fn test_offline_mode_resolves_immediately() {
    let (mut host, _channel, _store, _battle) = recording_host(SessionMode::Offline);
    let t0 = Instant::now();

    host.pause(PauseReason::Manual, t0);
    assert_eq!(host.pending_acks(), 0);
    host.resume(ResumeReason::Manual, t0);

    host.begin_resync(ResyncTrigger::Reconnection, t0 + ms(10));
    let events = host.poll(t0 + ms(10));
    assert!(has(
        &events,
        &HostEvent::ResyncFinished {
            resync_id: 1,
            acknowledged: true
        }
    ));
    assert!(!host.is_paused());
    assert_eq!(host.mode(), SessionMode::Offline);
}

// ============================================================================
// Persistence
// ============================================================================

#[test]
fn test_connection_state_restore() {
    let (mut host, _channel, _store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    host.pause(PauseReason::Manual, t0);
    host.receive(WireFrame::ack(kinds::BATTLE_PAUSED), t0 + ms(300));
    let exported = host.connection_state();
    assert!(exported.battle_paused);
    assert!(exported.pause_start_time.is_some());
    assert_eq!(exported.connection_latency, 400);

    let (mut restored, _channel, _store, _battle) = recording_host(SessionMode::Networked);
    restored.restore(&exported, t0 + ms(500));
    assert!(restored.is_paused());
    assert_eq!(restored.latency(), Duration::from_millis(400));
}

#[test]
fn test_load_persisted_and_teardown() {
    let (mut host, _channel, store, battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    host.pause(PauseReason::GuestDisconnected, t0);
    let saved = host.load_persisted().unwrap().expect("persisted on pause");
    assert_eq!(saved.checkpoint, battle.borrow().clone());

    host.teardown();
    assert!(store.latest().is_none());
    assert_eq!(host.pending_acks(), 0);
}

#[test]
fn test_malformed_frames_ignored() {
    let (mut host, _channel, _store, _battle) = recording_host(SessionMode::Networked);
    let t0 = Instant::now();

    host.receive_raw("not json", t0);
    host.receive_raw(r#"{"type":"battle_data","data":{"type":"mystery"}}"#, t0);
    host.receive_raw(r#"{"type":"battle_ack","data":{"type":"battle_paused"}}"#, t0);

    assert!(host.poll(t0).is_empty());
    assert!(!host.is_paused());
}
