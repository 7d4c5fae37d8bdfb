//! Resynchronization bookkeeping (host side)
//!
//! A resync pushes a complete checkpoint to the guest and waits for
//! `resync_complete`. The coordinator tracks the single attempt in flight and
//! decides whether the battle resumes once it finishes. Sending and pausing
//! are done by the host session.

use std::fmt;
use std::time::{Duration, Instant};

use super::ack::{AckOutcome, AckWaiter};

/// What started a resync
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResyncTrigger {
    /// Guest came back and completed the handshake
    Reconnection,
    /// Guest sent `guest_desync_signal`
    GuestReported { reason: String, guest_turn: u32 },
    /// Host noticed divergence or was asked to resync locally
    HostDetected { reason: String },
}

impl ResyncTrigger {
    /// Reconnection resyncs always resume; others leave an existing pause in
    /// place.
    pub fn always_resumes(&self) -> bool {
        matches!(self, Self::Reconnection)
    }

    /// Human-readable message shipped with the snapshot.
    pub fn message(&self) -> String {
        match self {
            Self::Reconnection => "Restoring battle after reconnection".to_string(),
            Self::GuestReported { reason, .. } => format!("Guest reported desync: {reason}"),
            Self::HostDetected { reason } => format!("Host resync: {reason}"),
        }
    }
}

impl fmt::Display for ResyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconnection => f.write_str("reconnection"),
            Self::GuestReported { .. } => f.write_str("guest_reported"),
            Self::HostDetected { .. } => f.write_str("host_detected"),
        }
    }
}

/// A resync waiting for its acknowledgment
#[derive(Debug)]
struct ResyncAttempt {
    id: u64,
    trigger: ResyncTrigger,
    waiter: AckWaiter,
    resume_when_done: bool,
    started_at: Instant,
}

/// Result of a finished resync
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResyncOutcome {
    pub resync_id: u64,
    pub trigger: ResyncTrigger,
    /// Guest confirmed (or no network session)
    pub acknowledged: bool,
    /// Whether the battle should resume now
    pub resume: bool,
    pub elapsed: Duration,
}

/// Single-flight resync tracker.
#[derive(Debug)]
pub struct ResyncCoordinator {
    next_id: u64,
    in_flight: Option<ResyncAttempt>,
    completed: u64,
    failed: u64,
}

impl Default for ResyncCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ResyncCoordinator {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            in_flight: None,
            completed: 0,
            failed: 0,
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Id of the resync in flight.
    pub fn current_id(&self) -> Option<u64> {
        self.in_flight.as_ref().map(|a| a.id)
    }

    /// Reserve the id for the next snapshot.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Track a snapshot that has been sent.
    ///
    /// `was_paused` is whether the battle was already paused for another
    /// reason before the resync paused it.
    pub fn start(
        &mut self,
        id: u64,
        trigger: ResyncTrigger,
        waiter: AckWaiter,
        was_paused: bool,
        now: Instant,
    ) {
        let resume_when_done = trigger.always_resumes() || !was_paused;
        tracing::info!(resync_id = id, trigger = %trigger, resume_when_done, "Resync started");
        self.in_flight = Some(ResyncAttempt {
            id,
            trigger,
            waiter,
            resume_when_done,
            started_at: now,
        });
    }

    /// Finish the attempt in flight if its wait has resolved.
    pub fn poll(&mut self, now: Instant) -> Option<ResyncOutcome> {
        let attempt = self.in_flight.as_mut()?;
        let outcome = attempt.waiter.try_outcome()?;
        let attempt = self.in_flight.take()?;

        let acknowledged = outcome.is_confirmed();
        let elapsed = now.saturating_duration_since(attempt.started_at);
        if acknowledged {
            self.completed += 1;
            let round_trip_ms = match outcome {
                AckOutcome::Acknowledged { round_trip } => round_trip.as_millis() as u64,
                _ => 0,
            };
            tracing::info!(resync_id = attempt.id, round_trip_ms, "Resync acknowledged");
        } else {
            self.failed += 1;
            tracing::warn!(
                resync_id = attempt.id,
                elapsed_ms = elapsed.as_millis() as u64,
                "Resync not acknowledged, continuing"
            );
        }

        Some(ResyncOutcome {
            resync_id: attempt.id,
            trigger: attempt.trigger,
            acknowledged,
            resume: attempt.resume_when_done,
            elapsed,
        })
    }

    /// Drop the attempt in flight without resuming.
    ///
    /// Used when the guest disconnects mid-resync; the next handshake starts
    /// a fresh snapshot.
    pub fn abandon(&mut self) -> Option<u64> {
        let attempt = self.in_flight.take()?;
        self.failed += 1;
        tracing::warn!(resync_id = attempt.id, trigger = %attempt.trigger, "Resync abandoned");
        Some(attempt.id)
    }

    /// Resyncs the guest confirmed.
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Resyncs that timed out.
    pub fn failed(&self) -> u64 {
        self.failed
    }
}
