//! Host session
//!
//! Owns everything the authoritative peer runs:
//! - the acknowledgment tracker for pause/resume notices and resyncs
//! - the connection monitor fed by the presence channel
//! - the pause gate over the simulation loop
//! - resync bookkeeping
//! - a small dispatcher for guest reports
//!
//! The session is poll-driven. The embedding application feeds it presence
//! updates and inbound frames as they arrive and calls [`HostSession::poll`]
//! every frame; timers fire from `poll`.

mod messages;
mod state;

#[cfg(test)]
mod tests;

use std::time::{Duration, Instant};

use battlelink_shared::{AbsoluteSide, BattleCheckpoint, HeroPosition, PeerRole};
use serde::Serialize;

pub use messages::BuiltinHostHandlers;
pub use state::{BattleAuthority, HostCommand, HostContext, HostEvent, SessionMode};

use crate::config::SyncConfig;
use crate::save_store::{CheckpointStore, PersistedBattle, StoreError};

use super::ack::{AckTracker, AckWaiter};
use super::connection_state::ConnectionState;
use super::dispatch::{Dispatcher, HandlerModule};
use super::messages::{
    CreatureStateSync, HeroCreatures, PauseNotice, ResyncBattleState, SideCreatures, WireFrame,
    kinds,
};
use super::monitor::{ConnectionMonitor, LinkState, MonitorAction, PresenceUpdate};
use super::pause::{PauseController, PauseReason, ResumeReason};
use super::resync::{ResyncCoordinator, ResyncTrigger};
use super::timing::{as_millis_u64, wall_clock_ms};
use super::transport::{ChannelError, MessageChannel};

/// Authoritative side of a battle session.
pub struct HostSession {
    config: SyncConfig,
    mode: SessionMode,
    channel: Box<dyn MessageChannel>,
    authority: Box<dyn BattleAuthority>,
    store: Box<dyn CheckpointStore>,
    acks: AckTracker,
    monitor: ConnectionMonitor,
    pause: PauseController,
    resync: ResyncCoordinator,
    dispatcher: Dispatcher<HostContext>,
    ctx: HostContext,
    /// Waits on pause/resume notices, kept for logging
    notice_acks: Vec<AckWaiter>,
    events: Vec<HostEvent>,
}

impl HostSession {
    /// Create a host session with the built-in handlers installed.
    pub fn new(
        config: SyncConfig,
        mode: SessionMode,
        channel: Box<dyn MessageChannel>,
        authority: Box<dyn BattleAuthority>,
        store: Box<dyn CheckpointStore>,
    ) -> Self {
        let networked = mode == SessionMode::Networked;
        let mut dispatcher = Dispatcher::new(PeerRole::Host);
        dispatcher.install(&BuiltinHostHandlers);

        tracing::info!(?mode, "Host session started");

        Self {
            acks: AckTracker::new(config.ack.clone(), networked),
            monitor: ConnectionMonitor::new(config.connection.clone()),
            pause: PauseController::new(PeerRole::Host, config.pause.clone()),
            resync: ResyncCoordinator::new(),
            dispatcher,
            ctx: HostContext::default(),
            notice_acks: Vec::new(),
            events: Vec::new(),
            config,
            mode,
            channel,
            authority,
            store,
        }
    }

    /// Register additional host handlers.
    pub fn install(&mut self, module: &dyn HandlerModule<HostContext>) {
        self.dispatcher.install(module);
    }

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Feed a presence observation.
    pub fn on_presence(&mut self, update: PresenceUpdate, now: Instant) {
        let actions = self.monitor.on_presence(update, now);
        self.apply_actions(actions, now);
    }

    /// Host tab visibility changed.
    pub fn set_tab_hidden(&mut self, hidden: bool, now: Instant) {
        self.monitor.set_tab_hidden(hidden, now);
    }

    /// Handle a decoded frame from the guest.
    pub fn receive(&mut self, frame: WireFrame, now: Instant) {
        match frame {
            WireFrame::BattleAck(ack) => {
                self.acks.receive_acknowledgment(&ack, now);
            }
            WireFrame::BattleData(message) => {
                tracing::trace!(kind = %message.kind, "Host received message");
                self.dispatcher.dispatch(&mut self.ctx, &message, now);
                self.run_commands(now);
            }
        }
    }

    /// Handle raw frame text. Malformed frames are logged and dropped.
    pub fn receive_raw(&mut self, text: &str, now: Instant) {
        match WireFrame::decode(text) {
            Ok(frame) => self.receive(frame, now),
            Err(e) => tracing::warn!(error = %e, "Dropping malformed frame"),
        }
    }

    fn run_commands(&mut self, now: Instant) {
        for command in std::mem::take(&mut self.ctx.commands) {
            match command {
                HostCommand::GuestReady { .. } => {
                    let actions = self.monitor.on_guest_ready(now);
                    self.apply_actions(actions, now);
                }
                HostCommand::ResyncRequested { reason, guest_turn } => {
                    self.begin_resync(ResyncTrigger::GuestReported { reason, guest_turn }, now);
                }
                HostCommand::CreatureSyncRequested {
                    side,
                    hero_position,
                } => self.send_creature_sync(side, hero_position),
            }
        }
    }

    fn apply_actions(&mut self, actions: Vec<MonitorAction>, now: Instant) {
        for action in actions {
            match action {
                MonitorAction::LinkChanged(state) => {
                    if state == LinkState::Disconnected
                        && let Some(resync_id) = self.resync.abandon()
                    {
                        self.events.push(HostEvent::ResyncFinished {
                            resync_id,
                            acknowledged: false,
                        });
                    }
                    self.events.push(HostEvent::LinkChanged(state));
                }
                MonitorAction::Pause(reason) => {
                    self.pause(reason, now);
                }
                MonitorAction::Resume(reason) => {
                    self.resume(reason, now);
                }
                MonitorAction::Resync => {
                    self.begin_resync(ResyncTrigger::Reconnection, now);
                }
            }
        }
    }

    // ========================================================================
    // Timers
    // ========================================================================

    /// Advance every timer and return the events raised since the last poll.
    pub fn poll(&mut self, now: Instant) -> Vec<HostEvent> {
        self.acks.poll(now);
        self.notice_acks.retain_mut(|waiter| match waiter.try_outcome() {
            Some(outcome) => {
                tracing::debug!(ack_type = waiter.ack_type(), ?outcome, "Notice settled");
                false
            }
            None => true,
        });

        if let Some(outcome) = self.resync.poll(now) {
            self.events.push(HostEvent::ResyncFinished {
                resync_id: outcome.resync_id,
                acknowledged: outcome.acknowledged,
            });
            if outcome.resume && self.monitor.state() != LinkState::Connected {
                tracing::warn!(
                    resync_id = outcome.resync_id,
                    link = ?self.monitor.state(),
                    "Resync finished while guest unreachable, staying paused"
                );
            } else if outcome.resume {
                let reason = if outcome.acknowledged {
                    ResumeReason::ResyncComplete
                } else {
                    ResumeReason::ResyncFailed
                };
                self.resume(reason, now);
            }
        }

        let actions = self.monitor.poll(now);
        self.apply_actions(actions, now);

        if self.pause.poll(now) {
            tracing::debug!("Simulation restart");
            self.events.push(HostEvent::SimulationRestart);
        }

        std::mem::take(&mut self.events)
    }

    // ========================================================================
    // Pause gate
    // ========================================================================

    /// Pause the battle. No-op if already paused.
    pub fn pause(&mut self, reason: PauseReason, now: Instant) -> bool {
        if !self.pause.pause(reason, now) {
            return false;
        }
        self.persist();
        self.send_notice(kinds::BATTLE_PAUSED, reason.as_str(), now);
        self.events.push(HostEvent::Paused { reason });
        true
    }

    /// Resume the battle. No-op if not paused.
    ///
    /// The simulation loop restarts after the settle delay, unless the
    /// battle has already been decided.
    pub fn resume(&mut self, reason: ResumeReason, now: Instant) -> bool {
        let Some(paused_for) = self.pause.resume(reason, now) else {
            return false;
        };
        self.persist();
        self.send_notice(kinds::BATTLE_RESUMED, reason.as_str(), now);
        self.events.push(HostEvent::Resumed { reason, paused_for });

        if self.authority.is_battle_active() && !self.authority.outcome_decided() {
            self.pause.schedule_restart(now);
        }
        true
    }

    /// Whether the simulation may take a step now.
    pub fn may_advance(&self) -> bool {
        self.pause.may_advance()
    }

    fn send_notice(&mut self, kind: &str, reason: &str, now: Instant) {
        let notice = PauseNotice {
            reason: reason.to_string(),
            timestamp: wall_clock_ms(),
        };
        if self.send(kind, &notice) {
            let waiter = self.acks.wait_adaptive(kind, now);
            self.notice_acks.push(waiter);
        }
    }

    // ========================================================================
    // Resync
    // ========================================================================

    /// Push a full snapshot to the guest.
    ///
    /// Returns the resync id, or `None` when a resync is already in flight
    /// (the request is coalesced into it).
    pub fn begin_resync(&mut self, trigger: ResyncTrigger, now: Instant) -> Option<u64> {
        if let Some(current) = self.resync.current_id() {
            tracing::info!(current, trigger = %trigger, "Resync already in flight, coalescing");
            return None;
        }

        let was_paused = self.pause.is_paused();
        self.pause(PauseReason::Resync, now);

        let checkpoint = self.authority.checkpoint();
        let checksum = match checkpoint.checksum() {
            Ok(checksum) => Some(checksum),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to checksum snapshot");
                None
            }
        };
        let id = self.resync.next_id();
        let payload = ResyncBattleState {
            host_turn: checkpoint.turn,
            battle_state: checkpoint,
            resync_id: id,
            message: trigger.message(),
            checksum,
        };
        self.send(kinds::RESYNC_BATTLE_STATE, &payload);

        let waiter = self.acks.wait_for_acknowledgment(
            kinds::ACK_RESYNC_COMPLETE,
            self.config.resync.ack_timeout(),
            now,
        );
        self.events.push(HostEvent::ResyncStarted { resync_id: id });
        self.resync.start(id, trigger, waiter, was_paused, now);
        Some(id)
    }

    fn send_creature_sync(&mut self, side: AbsoluteSide, hero: Option<HeroPosition>) {
        let checkpoint = self.authority.checkpoint();
        let sync = creature_sync_for(&checkpoint, side, hero);
        if self.send(kinds::CREATURE_STATE_SYNC, &sync) {
            self.events.push(HostEvent::CreatureSyncSent { side });
        }
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Broadcast an authoritative update to the guest.
    pub fn broadcast<T: Serialize>(&mut self, kind: &str, payload: &T) -> Result<(), ChannelError> {
        let frame = WireFrame::data(kind, payload)?;
        self.channel.send(&frame)
    }

    fn send<T: Serialize>(&mut self, kind: &str, payload: &T) -> bool {
        match self.broadcast(kind, payload) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(kind, error = %e, "Failed to send");
                false
            }
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Flat connection state for export.
    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState {
            opponent_connected: self.monitor.opponent_connected(),
            battle_paused: self.pause.is_paused(),
            guest_reconnecting: self.monitor.is_reconnecting(),
            pause_start_time: self.pause.pause_start_wall_ms(),
            total_pause_time: as_millis_u64(self.pause.total_pause()),
            connection_latency: as_millis_u64(self.acks.latency()),
            tab_was_hidden: self.monitor.tab_was_hidden(),
        }
    }

    /// Restore from an imported connection state.
    pub fn restore(&mut self, state: &ConnectionState, now: Instant) {
        self.pause.restore(
            state.battle_paused,
            Duration::from_millis(state.total_pause_time),
            now,
        );
        self.monitor.restore(
            state.opponent_connected,
            state.guest_reconnecting,
            state.tab_was_hidden,
        );
        self.acks
            .set_latency(Duration::from_millis(state.connection_latency));
        tracing::info!(paused = state.battle_paused, "Connection state restored");
    }

    /// The last persisted battle, for reloading after a restart.
    pub fn load_persisted(&self) -> Result<Option<PersistedBattle>, StoreError> {
        self.store.load()
    }

    fn persist(&mut self) {
        let battle = PersistedBattle {
            connection: self.connection_state(),
            checkpoint: self.authority.checkpoint(),
            saved_at: wall_clock_ms(),
        };
        if let Err(e) = self.store.persist(&battle) {
            tracing::warn!(error = %e, "Failed to persist battle");
        }
    }

    /// Drop pending waits and the persisted battle.
    pub fn teardown(&mut self) {
        self.acks.clear();
        self.notice_acks.clear();
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to clear persisted battle");
        }
        tracing::info!("Host session torn down");
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn set_speed(&mut self, speed: f32) {
        self.acks.set_speed(speed);
        self.monitor.set_speed(speed);
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    pub fn link_state(&self) -> LinkState {
        self.monitor.state()
    }

    pub fn latency(&self) -> Duration {
        self.acks.latency()
    }

    pub fn pending_acks(&self) -> usize {
        self.acks.pending_count()
    }

    pub fn resync_in_flight(&self) -> bool {
        self.resync.is_in_flight()
    }

    /// (completed, failed) resync counts.
    pub fn resync_stats(&self) -> (u64, u64) {
        (self.resync.completed(), self.resync.failed())
    }

    pub fn total_pause(&self) -> Duration {
        self.pause.total_pause()
    }
}

/// Creature lists of one side (optionally one hero) from a checkpoint.
fn creature_sync_for(
    checkpoint: &BattleCheckpoint,
    side: AbsoluteSide,
    hero: Option<HeroPosition>,
) -> CreatureStateSync {
    let heroes = checkpoint
        .side(side)
        .heroes
        .iter()
        .filter(|h| hero.is_none_or(|position| position == h.position))
        .map(|h| HeroCreatures {
            position: h.position,
            creatures: h.creatures.clone(),
        })
        .collect();
    CreatureStateSync {
        sides: vec![SideCreatures { side, heroes }],
    }
}
