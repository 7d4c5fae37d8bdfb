//! Acknowledgment tracker (host side)
//!
//! The host can wait for the guest to confirm that a particular message was
//! applied. Every wait is bounded: it resolves either when a matching
//! acknowledgment arrives or when its deadline passes, and both outcomes are
//! treated as "proceed" by callers. There is no retransmission.
//!
//! One resolver is registered per ack type. Registering the same type again
//! replaces the registration; the replaced waiter is still resolved by its own
//! deadline.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use hashbrown::HashMap;
use tokio::sync::oneshot;

use crate::config::AckConfig;

use super::messages::AckData;
use super::timing::scaled;

/// How a wait for acknowledgment finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// The guest confirmed; carries the observed round trip
    Acknowledged { round_trip: Duration },
    /// The deadline passed first
    TimedOut,
    /// No network session, nothing to wait for
    Immediate,
}

impl AckOutcome {
    /// Whether the peer actually confirmed (or there is no peer).
    pub fn is_confirmed(self) -> bool {
        !matches!(self, Self::TimedOut)
    }
}

/// Pending wait for an acknowledgment.
///
/// Awaitable, or checked without blocking via [`AckWaiter::try_outcome`].
/// Never resolves to an error: a tracker that goes away counts as a timeout.
#[derive(Debug)]
pub struct AckWaiter {
    ack_type: String,
    receiver: Option<oneshot::Receiver<AckOutcome>>,
    outcome: Option<AckOutcome>,
}

impl AckWaiter {
    fn pending(ack_type: &str, receiver: oneshot::Receiver<AckOutcome>) -> Self {
        Self {
            ack_type: ack_type.to_string(),
            receiver: Some(receiver),
            outcome: None,
        }
    }

    /// A waiter that is already resolved.
    pub fn ready(ack_type: &str, outcome: AckOutcome) -> Self {
        Self {
            ack_type: ack_type.to_string(),
            receiver: None,
            outcome: Some(outcome),
        }
    }

    pub fn ack_type(&self) -> &str {
        &self.ack_type
    }

    /// The outcome if the wait has finished, without blocking.
    pub fn try_outcome(&mut self) -> Option<AckOutcome> {
        if self.outcome.is_some() {
            return self.outcome;
        }
        let receiver = self.receiver.as_mut()?;
        match receiver.try_recv() {
            Ok(outcome) => self.finish(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => self.finish(AckOutcome::TimedOut),
        }
    }

    fn finish(&mut self, outcome: AckOutcome) -> Option<AckOutcome> {
        self.receiver = None;
        self.outcome = Some(outcome);
        self.outcome
    }
}

impl Future for AckWaiter {
    type Output = AckOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<AckOutcome> {
        let this = self.get_mut();
        if let Some(outcome) = this.outcome {
            return Poll::Ready(outcome);
        }
        let Some(receiver) = this.receiver.as_mut() else {
            return Poll::Ready(AckOutcome::TimedOut);
        };
        match Pin::new(receiver).poll(cx) {
            Poll::Ready(Ok(outcome)) => {
                this.finish(outcome);
                Poll::Ready(outcome)
            }
            Poll::Ready(Err(_)) => {
                this.finish(AckOutcome::TimedOut);
                Poll::Ready(AckOutcome::TimedOut)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A registered wait
#[derive(Debug)]
struct PendingAck {
    id: u64,
    ack_type: String,
    registered_at: Instant,
    deadline: Instant,
    resolver: oneshot::Sender<AckOutcome>,
}

/// Outstanding acknowledgment waits and the latency estimate they feed.
#[derive(Debug)]
pub struct AckTracker {
    config: AckConfig,
    /// False in single-player mode; every wait resolves immediately
    networked: bool,
    /// Battle speed multiplier applied to deadlines
    speed: f32,
    next_id: u64,
    /// Ack type -> id of the waiter that currently owns it
    registered: HashMap<String, u64>,
    pending: Vec<PendingAck>,
    /// Smoothed round trip plus margin
    latency: Duration,
    samples: u32,
}

impl AckTracker {
    pub fn new(config: AckConfig, networked: bool) -> Self {
        let latency = config.latency_floor();
        Self {
            config,
            networked,
            speed: 1.0,
            next_id: 1,
            registered: HashMap::new(),
            pending: Vec::new(),
            latency,
            samples: 0,
        }
    }

    /// Register a wait for `ack_type`.
    ///
    /// The deadline is `now + timeout / speed`. Without a network session the
    /// returned waiter is already resolved and nothing is registered.
    pub fn wait_for_acknowledgment(
        &mut self,
        ack_type: &str,
        timeout: Duration,
        now: Instant,
    ) -> AckWaiter {
        if !self.networked {
            return AckWaiter::ready(ack_type, AckOutcome::Immediate);
        }

        let id = self.next_id;
        self.next_id += 1;
        let deadline = now + scaled(timeout, self.speed);
        let (resolver, receiver) = oneshot::channel();

        if let Some(previous) = self.registered.insert(ack_type.to_string(), id) {
            tracing::debug!(ack_type, previous, id, "Ack registration replaced");
        }
        self.pending.push(PendingAck {
            id,
            ack_type: ack_type.to_string(),
            registered_at: now,
            deadline,
            resolver,
        });

        tracing::trace!(ack_type, id, timeout_ms = timeout.as_millis() as u64, "Waiting for ack");
        AckWaiter::pending(ack_type, receiver)
    }

    /// Wait using the adaptive timeout.
    pub fn wait_adaptive(&mut self, ack_type: &str, now: Instant) -> AckWaiter {
        let timeout = self.adaptive_timeout();
        self.wait_for_acknowledgment(ack_type, timeout, now)
    }

    /// Resolve the registered waiter for `ack.kind`.
    ///
    /// Returns `false` for acks nobody is waiting for (late, duplicate or
    /// unsolicited); those change nothing.
    pub fn receive_acknowledgment(&mut self, ack: &AckData, now: Instant) -> bool {
        let Some(id) = self.registered.remove(&ack.kind) else {
            tracing::trace!(ack_type = %ack.kind, "Ignoring unmatched ack");
            return false;
        };
        let Some(index) = self.pending.iter().position(|p| p.id == id) else {
            return false;
        };

        let entry = self.pending.swap_remove(index);
        let round_trip = now.saturating_duration_since(entry.registered_at);
        self.record_round_trip(round_trip);

        tracing::debug!(
            ack_type = %entry.ack_type,
            round_trip_ms = round_trip.as_millis() as u64,
            "Ack received"
        );
        // The waiter may have been dropped; that is fine
        let _ = entry.resolver.send(AckOutcome::Acknowledged { round_trip });
        true
    }

    /// Time out every wait whose deadline has passed.
    ///
    /// Returns how many waits were resolved as timed out.
    pub fn poll(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        let mut i = 0;
        while i < self.pending.len() {
            if now < self.pending[i].deadline {
                i += 1;
                continue;
            }

            let entry = self.pending.swap_remove(i);
            if self.registered.get(&entry.ack_type) == Some(&entry.id) {
                self.registered.remove(&entry.ack_type);
            }
            tracing::warn!(ack_type = %entry.ack_type, "Ack timed out, proceeding");
            let _ = entry.resolver.send(AckOutcome::TimedOut);
            expired += 1;
        }
        expired
    }

    fn record_round_trip(&mut self, round_trip: Duration) {
        let sample = (round_trip + self.config.latency_margin()).max(self.config.latency_floor());
        self.latency = if self.samples == 0 {
            sample
        } else {
            (self.latency * 3 + sample) / 4
        };
        self.samples = self.samples.saturating_add(1);
    }

    /// `latency * 3`, clamped to the configured bounds.
    pub fn adaptive_timeout(&self) -> Duration {
        (self.latency * 3)
            .max(self.config.min_timeout())
            .min(self.config.max_timeout())
    }

    /// Current smoothed latency estimate.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    /// Seed the latency estimate (e.g. from persisted connection state).
    pub fn set_latency(&mut self, latency: Duration) {
        self.latency = latency.max(self.config.latency_floor());
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed;
    }

    pub fn is_networked(&self) -> bool {
        self.networked
    }

    /// Number of waits that have not resolved yet.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Whether a waiter currently owns `ack_type`.
    pub fn is_registered(&self, ack_type: &str) -> bool {
        self.registered.contains_key(ack_type)
    }

    /// Drop every pending wait. Dropped waiters observe a timeout.
    pub fn clear(&mut self) {
        self.registered.clear();
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(kind: &str) -> AckData {
        AckData {
            kind: kind.to_string(),
            timestamp: 0,
        }
    }

    fn tracker() -> AckTracker {
        AckTracker::new(AckConfig::default(), true)
    }

    #[test]
    fn test_ack_before_timeout() {
        let mut tracker = tracker();
        let t0 = Instant::now();
        let mut waiter =
            tracker.wait_for_acknowledgment("battle_paused", Duration::from_millis(500), t0);

        assert_eq!(waiter.try_outcome(), None);
        assert!(tracker.receive_acknowledgment(&ack("battle_paused"), t0 + Duration::from_millis(120)));

        let outcome = pollster::block_on(waiter);
        assert_eq!(
            outcome,
            AckOutcome::Acknowledged {
                round_trip: Duration::from_millis(120)
            }
        );
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_timeout_resolves_at_deadline() {
        let mut tracker = tracker();
        let t0 = Instant::now();
        let mut waiter =
            tracker.wait_for_acknowledgment("battle_paused", Duration::from_millis(500), t0);

        assert_eq!(tracker.poll(t0 + Duration::from_millis(499)), 0);
        assert_eq!(waiter.try_outcome(), None);

        assert_eq!(tracker.poll(t0 + Duration::from_millis(500)), 1);
        assert_eq!(waiter.try_outcome(), Some(AckOutcome::TimedOut));
        assert!(!tracker.is_registered("battle_paused"));
    }

    #[test]
    fn test_ack_after_timeout_is_ignored() {
        let mut tracker = tracker();
        let t0 = Instant::now();
        let mut waiter = tracker.wait_for_acknowledgment("x", Duration::from_millis(100), t0);
        tracker.poll(t0 + Duration::from_millis(100));

        assert!(!tracker.receive_acknowledgment(&ack("x"), t0 + Duration::from_millis(150)));
        assert_eq!(waiter.try_outcome(), Some(AckOutcome::TimedOut));
    }

    #[test]
    fn test_duplicate_ack_is_noop() {
        let mut tracker = tracker();
        let t0 = Instant::now();
        let mut waiter = tracker.wait_for_acknowledgment("x", Duration::from_secs(1), t0);

        assert!(tracker.receive_acknowledgment(&ack("x"), t0 + Duration::from_millis(10)));
        assert!(!tracker.receive_acknowledgment(&ack("x"), t0 + Duration::from_millis(20)));
        assert!(matches!(
            waiter.try_outcome(),
            Some(AckOutcome::Acknowledged { .. })
        ));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_unsolicited_ack_is_noop() {
        let mut tracker = tracker();
        assert!(!tracker.receive_acknowledgment(&ack("nobody"), Instant::now()));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_last_registration_wins() {
        let mut tracker = tracker();
        let t0 = Instant::now();
        let mut first = tracker.wait_for_acknowledgment("x", Duration::from_millis(300), t0);
        let mut second = tracker.wait_for_acknowledgment("x", Duration::from_millis(1000), t0);

        tracker.receive_acknowledgment(&ack("x"), t0 + Duration::from_millis(50));
        assert!(matches!(
            second.try_outcome(),
            Some(AckOutcome::Acknowledged { .. })
        ));
        // The replaced waiter only finishes through its own deadline
        assert_eq!(first.try_outcome(), None);
        tracker.poll(t0 + Duration::from_millis(300));
        assert_eq!(first.try_outcome(), Some(AckOutcome::TimedOut));
    }

    #[test]
    fn test_offline_resolves_immediately() {
        let mut tracker = AckTracker::new(AckConfig::default(), false);
        let mut waiter = tracker.wait_for_acknowledgment("x", Duration::from_secs(5), Instant::now());

        assert_eq!(waiter.try_outcome(), Some(AckOutcome::Immediate));
        assert_eq!(tracker.pending_count(), 0);
    }

    #[test]
    fn test_speed_scales_deadline() {
        let mut tracker = tracker();
        tracker.set_speed(2.0);
        let t0 = Instant::now();
        let mut waiter = tracker.wait_for_acknowledgment("x", Duration::from_millis(1000), t0);

        tracker.poll(t0 + Duration::from_millis(500));
        assert_eq!(waiter.try_outcome(), Some(AckOutcome::TimedOut));
    }

    #[test]
    fn test_latency_floor_and_smoothing() {
        let mut tracker = tracker();
        let t0 = Instant::now();

        // 20ms + 100ms margin is below the 200ms floor
        let _w = tracker.wait_for_acknowledgment("a", Duration::from_secs(2), t0);
        tracker.receive_acknowledgment(&ack("a"), t0 + Duration::from_millis(20));
        assert_eq!(tracker.latency(), Duration::from_millis(200));

        // (200 * 3 + 600) / 4
        let _w = tracker.wait_for_acknowledgment("b", Duration::from_secs(2), t0);
        tracker.receive_acknowledgment(&ack("b"), t0 + Duration::from_millis(500));
        assert_eq!(tracker.latency(), Duration::from_millis(300));
    }

    #[test]
    fn test_adaptive_timeout_clamped() {
        let mut tracker = tracker();
        assert_eq!(tracker.adaptive_timeout(), Duration::from_millis(1000));

        tracker.set_latency(Duration::from_millis(600));
        assert_eq!(tracker.adaptive_timeout(), Duration::from_millis(1800));

        tracker.set_latency(Duration::from_secs(4));
        assert_eq!(tracker.adaptive_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_dropped_tracker_reads_as_timeout() {
        let mut tracker = tracker();
        let mut waiter = tracker.wait_for_acknowledgment("x", Duration::from_secs(1), Instant::now());
        tracker.clear();
        assert_eq!(waiter.try_outcome(), Some(AckOutcome::TimedOut));
    }
}
