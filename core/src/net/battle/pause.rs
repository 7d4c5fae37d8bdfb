//! Pause controller
//!
//! Gate over the host's simulation loop. Only the authoritative peer pauses
//! and resumes; the guest mirrors the host's notices into a local flag.
//!
//! The controller tracks accounting only. Persisting, broadcasting and
//! scheduling are driven by the session that owns it.

use std::fmt;
use std::time::{Duration, Instant};

use battlelink_shared::PeerRole;

use crate::config::PauseConfig;

use super::timing::wall_clock_ms;

/// Why the battle was paused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    GuestDisconnected,
    GuestReconnecting,
    Resync,
    Manual,
}

impl PauseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GuestDisconnected => "guest_disconnected",
            Self::GuestReconnecting => "guest_reconnecting",
            Self::Resync => "resync",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the battle was resumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeReason {
    HandshakeTimeout,
    ResyncComplete,
    ResyncFailed,
    Manual,
}

impl ResumeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HandshakeTimeout => "handshake_timeout",
            Self::ResyncComplete => "resync_complete",
            Self::ResyncFailed => "resync_failed",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for ResumeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running/Paused gate with pause-time accounting.
#[derive(Debug, Clone)]
pub struct PauseController {
    role: PeerRole,
    config: PauseConfig,
    paused: bool,
    /// Reason of the current pause (string form, as carried on the wire)
    reason: Option<String>,
    started_at: Option<Instant>,
    /// Wall clock of the current pause start, for export
    started_wall_ms: Option<i64>,
    total: Duration,
    /// Pending simulation restart after a resume
    restart_at: Option<Instant>,
}

impl PauseController {
    pub fn new(role: PeerRole, config: PauseConfig) -> Self {
        Self {
            role,
            config,
            paused: false,
            reason: None,
            started_at: None,
            started_wall_ms: None,
            total: Duration::ZERO,
            restart_at: None,
        }
    }

    /// Enter the paused state.
    ///
    /// Returns `false` (and changes nothing) when already paused or when this
    /// peer is not authoritative.
    pub fn pause(&mut self, reason: PauseReason, now: Instant) -> bool {
        if !self.role.is_authoritative() || self.paused {
            return false;
        }
        self.enter(reason.as_str(), now);
        tracing::info!(reason = %reason, "Battle paused");
        true
    }

    /// Leave the paused state.
    ///
    /// Returns how long this pause lasted, or `None` when not paused or not
    /// authoritative.
    pub fn resume(&mut self, reason: ResumeReason, now: Instant) -> Option<Duration> {
        if !self.role.is_authoritative() || !self.paused {
            return None;
        }
        let elapsed = self.leave(now);
        tracing::info!(
            reason = %reason,
            paused_ms = elapsed.as_millis() as u64,
            total_ms = self.total.as_millis() as u64,
            "Battle resumed"
        );
        Some(elapsed)
    }

    /// Mirror the host's pause state (guest side).
    ///
    /// Returns whether the local flag changed.
    pub fn mirror_remote(&mut self, paused: bool, reason: &str, now: Instant) -> bool {
        if paused == self.paused {
            return false;
        }
        if paused {
            self.enter(reason, now);
        } else {
            self.leave(now);
        }
        tracing::debug!(paused, reason, "Mirrored host pause state");
        true
    }

    fn enter(&mut self, reason: &str, now: Instant) {
        self.paused = true;
        self.reason = Some(reason.to_string());
        self.started_at = Some(now);
        self.started_wall_ms = Some(wall_clock_ms());
        self.restart_at = None;
    }

    fn leave(&mut self, now: Instant) -> Duration {
        let elapsed = self
            .started_at
            .take()
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default();
        self.total += elapsed;
        self.paused = false;
        self.reason = None;
        self.started_wall_ms = None;
        elapsed
    }

    /// Restart the simulation loop after the settle delay.
    pub fn schedule_restart(&mut self, now: Instant) {
        self.restart_at = Some(now + self.config.resume_settle());
    }

    /// Returns `true` once, when a scheduled restart is due.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.restart_at {
            Some(at) if !self.paused && now >= at => {
                self.restart_at = None;
                true
            }
            _ => false,
        }
    }

    /// Whether the simulation loop may take a step.
    pub fn may_advance(&self) -> bool {
        !self.paused && self.restart_at.is_none()
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Wall clock (ms) at which the current pause started.
    pub fn pause_start_wall_ms(&self) -> Option<i64> {
        self.started_wall_ms
    }

    /// Accumulated time spent paused, excluding a pause in progress.
    pub fn total_pause(&self) -> Duration {
        self.total
    }

    /// Restore accounting from an imported connection state.
    pub fn restore(&mut self, paused: bool, total: Duration, now: Instant) {
        self.total = total;
        self.restart_at = None;
        if paused {
            self.paused = true;
            self.reason = Some("restored".to_string());
            self.started_at = Some(now);
            self.started_wall_ms = Some(wall_clock_ms());
        } else {
            self.paused = false;
            self.reason = None;
            self.started_at = None;
            self.started_wall_ms = None;
        }
    }
}
