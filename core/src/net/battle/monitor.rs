//! Connection monitor (host side)
//!
//! Watches the guest's presence feed and drives the link through
//! `Connected -> Disconnected -> Reconnecting -> Connected`. The monitor only
//! decides; it hands back [`MonitorAction`]s for the session to carry out.
//!
//! Browsers throttle timers in hidden tabs, so a presence drop observed while
//! the host's own tab was hidden is not trusted right away: the judgement is
//! deferred and re-checked against the latest presence.

use std::time::Instant;

use crate::config::ConnectionConfig;

use super::pause::{PauseReason, ResumeReason};
use super::timing::scaled;

/// Link state as seen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
    Reconnecting,
}

/// One observation from the presence feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresenceUpdate {
    pub guest_online: bool,
    pub guest_reconnecting: bool,
}

impl PresenceUpdate {
    pub const ONLINE: Self = Self {
        guest_online: true,
        guest_reconnecting: false,
    };
    pub const OFFLINE: Self = Self {
        guest_online: false,
        guest_reconnecting: false,
    };
    pub const RECONNECTING: Self = Self {
        guest_online: true,
        guest_reconnecting: true,
    };
}

/// What the session should do in response to a link change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorAction {
    LinkChanged(LinkState),
    Pause(PauseReason),
    Resume(ResumeReason),
    /// Run a full resync (which resumes when done)
    Resync,
}

/// Presence-driven link state machine.
#[derive(Debug)]
pub struct ConnectionMonitor {
    config: ConnectionConfig,
    state: LinkState,
    presence: PresenceUpdate,
    speed: f32,
    tab_hidden: bool,
    /// Sticky flag: hidden now, or shown again less than the grace ago
    tab_was_hidden: bool,
    tab_shown_at: Option<Instant>,
    disconnect_recheck_at: Option<Instant>,
    handshake_deadline: Option<Instant>,
    resync_at: Option<Instant>,
}

impl ConnectionMonitor {
    /// The guest is assumed present when the battle starts.
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            state: LinkState::Connected,
            presence: PresenceUpdate::ONLINE,
            speed: 1.0,
            tab_hidden: false,
            tab_was_hidden: false,
            tab_shown_at: None,
            disconnect_recheck_at: None,
            handshake_deadline: None,
            resync_at: None,
        }
    }

    /// Consume a presence observation.
    pub fn on_presence(&mut self, update: PresenceUpdate, now: Instant) -> Vec<MonitorAction> {
        let previous = std::mem::replace(&mut self.presence, update);

        if update.guest_reconnecting {
            return self.enter_reconnecting(now);
        }

        if previous.guest_online && !update.guest_online {
            if self.tab_was_hidden {
                if self.disconnect_recheck_at.is_none() {
                    let at = now + self.config.tab_hidden_grace();
                    self.disconnect_recheck_at = Some(at);
                    tracing::info!("Guest went offline while tab was hidden, re-checking later");
                }
                return Vec::new();
            }
            return self.enter_disconnected();
        }

        if !previous.guest_online && update.guest_online && self.state == LinkState::Disconnected {
            return self.enter_reconnecting(now);
        }

        Vec::new()
    }

    /// The guest sent `guest_reconnection_ready`.
    ///
    /// Clears the handshake timer (a no-op if it already fired) and schedules
    /// the resync after the ready grace.
    pub fn on_guest_ready(&mut self, now: Instant) -> Vec<MonitorAction> {
        let mut actions = Vec::new();
        if self.handshake_deadline.take().is_some() {
            tracing::info!("Reconnection handshake complete");
        }
        if self.state != LinkState::Connected {
            self.state = LinkState::Connected;
            actions.push(MonitorAction::LinkChanged(LinkState::Connected));
        }
        self.resync_at = Some(now + self.config.ready_grace());
        actions
    }

    /// The host's own tab visibility changed.
    pub fn set_tab_hidden(&mut self, hidden: bool, now: Instant) {
        self.tab_hidden = hidden;
        if hidden {
            self.tab_was_hidden = true;
            self.tab_shown_at = None;
        } else if self.tab_was_hidden {
            self.tab_shown_at = Some(now);
        }
    }

    /// Fire any due timers.
    pub fn poll(&mut self, now: Instant) -> Vec<MonitorAction> {
        let mut actions = Vec::new();

        if let Some(shown) = self.tab_shown_at
            && !self.tab_hidden
            && now.saturating_duration_since(shown) >= self.config.tab_hidden_grace()
        {
            self.tab_shown_at = None;
            self.tab_was_hidden = false;
        }

        if take_due(&mut self.disconnect_recheck_at, now) {
            if !self.presence.guest_online && self.state == LinkState::Connected {
                tracing::info!("Guest still offline after re-check");
                actions.extend(self.enter_disconnected());
            } else {
                tracing::debug!("Guest back before re-check, ignoring drop");
            }
        }

        if take_due(&mut self.handshake_deadline, now) {
            if self.presence.guest_online {
                tracing::warn!("Reconnection handshake timed out, resuming anyway");
                self.state = LinkState::Connected;
                actions.push(MonitorAction::LinkChanged(LinkState::Connected));
                actions.push(MonitorAction::Resume(ResumeReason::HandshakeTimeout));
            } else {
                tracing::warn!("Reconnection handshake timed out, guest offline");
                actions.extend(self.enter_disconnected());
            }
        }

        if take_due(&mut self.resync_at, now) {
            actions.push(MonitorAction::Resync);
        }

        actions
    }

    fn enter_disconnected(&mut self) -> Vec<MonitorAction> {
        if self.state == LinkState::Disconnected {
            return Vec::new();
        }
        tracing::info!(from = ?self.state, "Guest disconnected");
        self.state = LinkState::Disconnected;
        self.handshake_deadline = None;
        self.resync_at = None;
        vec![
            MonitorAction::LinkChanged(LinkState::Disconnected),
            MonitorAction::Pause(PauseReason::GuestDisconnected),
        ]
    }

    fn enter_reconnecting(&mut self, now: Instant) -> Vec<MonitorAction> {
        if self.state == LinkState::Reconnecting {
            return Vec::new();
        }
        let timeout = scaled(self.config.handshake_timeout(), self.speed);
        tracing::info!(
            from = ?self.state,
            timeout_ms = timeout.as_millis() as u64,
            "Guest reconnecting, waiting for handshake"
        );
        self.state = LinkState::Reconnecting;
        self.disconnect_recheck_at = None;
        self.handshake_deadline = Some(now + timeout);
        self.resync_at = None;
        vec![
            MonitorAction::LinkChanged(LinkState::Reconnecting),
            MonitorAction::Pause(PauseReason::GuestReconnecting),
        ]
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn presence(&self) -> PresenceUpdate {
        self.presence
    }

    pub fn opponent_connected(&self) -> bool {
        self.state == LinkState::Connected && self.presence.guest_online
    }

    pub fn is_reconnecting(&self) -> bool {
        self.state == LinkState::Reconnecting
    }

    pub fn tab_was_hidden(&self) -> bool {
        self.tab_was_hidden
    }

    pub fn handshake_pending(&self) -> bool {
        self.handshake_deadline.is_some()
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    /// Restore the sticky flags from an imported connection state.
    pub fn restore(&mut self, opponent_connected: bool, reconnecting: bool, tab_was_hidden: bool) {
        self.tab_was_hidden = tab_was_hidden;
        self.presence = PresenceUpdate {
            guest_online: opponent_connected || reconnecting,
            guest_reconnecting: reconnecting,
        };
        self.state = if reconnecting {
            LinkState::Reconnecting
        } else if opponent_connected {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        };
    }
}

/// Clear a timer slot and report whether it was due.
fn take_due(slot: &mut Option<Instant>, now: Instant) -> bool {
    match *slot {
        Some(at) if now >= at => {
            *slot = None;
            true
        }
        _ => false,
    }
}
