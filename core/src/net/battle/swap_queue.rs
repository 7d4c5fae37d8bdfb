//! Swap queue (guest side)
//!
//! Position swaps animate on the guest, and two swaps landing on the same
//! frame would tear the formation display. Swap messages are therefore queued
//! and released one at a time, FIFO, with a minimum spacing between
//! consecutive applications. The spacing is not scaled by battle speed.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::config::SwapConfig;

/// A queued swap message
#[derive(Debug, Clone, PartialEq)]
pub struct SwapEntry {
    pub kind: String,
    pub data: Value,
    /// Sender timestamp from the message
    pub timestamp: i64,
    pub id: String,
    pub enqueued_at: Instant,
}

/// Bounded FIFO of swap messages with paced release.
#[derive(Debug)]
pub struct SwapQueue {
    entries: VecDeque<SwapEntry>,
    capacity: usize,
    min_interval: Duration,
    settle: Duration,
    /// When the last entry was released
    last_applied: Option<Instant>,
    /// Set while entries remain to be released
    processing: bool,
    dropped: u64,
}

impl SwapQueue {
    pub fn new(config: &SwapConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: config.capacity.max(1),
            min_interval: config.min_interval(),
            settle: config.settle(),
            last_applied: None,
            processing: false,
            dropped: 0,
        }
    }

    /// Append a swap. When the queue is full the oldest entry is evicted and
    /// returned.
    pub fn enqueue(
        &mut self,
        kind: &str,
        data: Value,
        timestamp: i64,
        id: Option<String>,
        now: Instant,
    ) -> Option<SwapEntry> {
        let mut evicted = None;
        while self.entries.len() >= self.capacity {
            evicted = self.entries.pop_front();
            self.dropped += 1;
            if let Some(entry) = &evicted {
                tracing::warn!(kind = %entry.kind, id = %entry.id, "Swap queue full, dropping oldest");
            }
        }

        let id = id.unwrap_or_else(|| format!("{:016x}", rand::random::<u64>()));
        self.entries.push_back(SwapEntry {
            kind: kind.to_string(),
            data,
            timestamp,
            id,
            enqueued_at: now,
        });
        self.processing = true;
        evicted
    }

    /// Earliest instant the next entry may be released.
    pub fn ready_at(&self) -> Option<Instant> {
        let front = self.entries.front()?;
        Some(match self.last_applied {
            Some(last) => (last + self.spacing()).max(front.enqueued_at),
            None => front.enqueued_at,
        })
    }

    /// Release the next entry if its spacing has elapsed.
    ///
    /// At most one entry is released per call.
    pub fn poll(&mut self, now: Instant) -> Option<SwapEntry> {
        if self.entries.is_empty() {
            self.processing = false;
            return None;
        }
        if let Some(last) = self.last_applied
            && now.saturating_duration_since(last) < self.spacing()
        {
            return None;
        }

        let entry = self.entries.pop_front()?;
        self.last_applied = Some(now);
        self.processing = !self.entries.is_empty();
        Some(entry)
    }

    /// Gap between two releases: the settle delay after an application, then
    /// whatever remains of the minimum interval.
    fn spacing(&self) -> Duration {
        self.min_interval.max(self.settle)
    }

    /// Discard everything queued. The spacing clock is kept.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        self.processing = false;
        count
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries evicted because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
