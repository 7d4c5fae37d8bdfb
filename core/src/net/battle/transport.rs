//! Message channel abstraction and an in-memory link
//!
//! The production channel is supplied by the embedding application. The
//! in-memory link connects a host and a guest in one process and can drop or
//! duplicate frames from a seeded RNG, which reproduces the unreliable,
//! at-most-once delivery the protocol is designed for.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use tokio::sync::mpsc;

use super::messages::{FrameError, WireFrame};

/// Outbound side of the real-time channel.
pub trait MessageChannel {
    /// Send one frame. Delivery is not guaranteed.
    fn send(&mut self, frame: &WireFrame) -> Result<(), ChannelError>;
}

/// Channel send failures
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel closed")]
    Closed,

    #[error("Failed to encode frame: {0}")]
    Encode(#[from] FrameError),
}

/// Channel that discards everything (single-player sessions).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullChannel;

impl MessageChannel for NullChannel {
    fn send(&mut self, _frame: &WireFrame) -> Result<(), ChannelError> {
        Ok(())
    }
}

/// Fault injection settings for the in-memory link
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkModel {
    /// Probability a frame is dropped (0.0..=1.0)
    pub loss: f64,
    /// Probability a delivered frame arrives twice (0.0..=1.0)
    pub duplicate: f64,
    /// RNG seed for reproducible runs
    pub seed: u64,
}

impl LinkModel {
    /// Lossless, duplicate-free delivery.
    pub const RELIABLE: Self = Self {
        loss: 0.0,
        duplicate: 0.0,
        seed: 0,
    };
}

impl Default for LinkModel {
    fn default() -> Self {
        Self::RELIABLE
    }
}

/// Shared switches and counters for one link
#[derive(Debug)]
struct LinkShared {
    online: AtomicBool,
    sent: AtomicU64,
    dropped: AtomicU64,
}

/// Handle for toggling a link and reading its counters.
#[derive(Debug, Clone)]
pub struct LinkControl {
    shared: Arc<LinkShared>,
}

impl LinkControl {
    /// While offline every frame in both directions is lost.
    pub fn set_online(&self, online: bool) {
        self.shared.online.store(online, Ordering::Relaxed);
        tracing::debug!(online, "Link toggled");
    }

    pub fn is_online(&self) -> bool {
        self.shared.online.load(Ordering::Relaxed)
    }

    /// Frames handed to the link.
    pub fn sent(&self) -> u64 {
        self.shared.sent.load(Ordering::Relaxed)
    }

    /// Frames the link discarded.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

/// Sending half of an in-memory link endpoint.
#[derive(Debug)]
pub struct MemorySender {
    tx: mpsc::UnboundedSender<String>,
    shared: Arc<LinkShared>,
    model: LinkModel,
    rng: Pcg64Mcg,
}

impl MessageChannel for MemorySender {
    fn send(&mut self, frame: &WireFrame) -> Result<(), ChannelError> {
        let text = frame.encode()?;
        self.shared.sent.fetch_add(1, Ordering::Relaxed);

        if !self.shared.online.load(Ordering::Relaxed) {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(kind = frame.kind(), "Link offline, frame lost");
            return Ok(());
        }
        if self.model.loss > 0.0 && self.rng.random_bool(self.model.loss.clamp(0.0, 1.0)) {
            self.shared.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(kind = frame.kind(), "Frame dropped");
            return Ok(());
        }

        let duplicate =
            self.model.duplicate > 0.0 && self.rng.random_bool(self.model.duplicate.clamp(0.0, 1.0));
        if duplicate {
            self.tx.send(text.clone()).map_err(|_| ChannelError::Closed)?;
        }
        self.tx.send(text).map_err(|_| ChannelError::Closed)
    }
}

/// Receiving half of an in-memory link endpoint.
#[derive(Debug)]
pub struct MemoryReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

impl MemoryReceiver {
    /// Next raw frame, if one is waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Every raw frame currently waiting.
    pub fn drain(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

/// One side of an in-memory link.
#[derive(Debug)]
pub struct LinkEnd {
    pub sender: MemorySender,
    pub receiver: MemoryReceiver,
}

/// Build a connected pair of endpoints (host end, guest end).
pub fn memory_link(model: LinkModel) -> (LinkEnd, LinkEnd, LinkControl) {
    let shared = Arc::new(LinkShared {
        online: AtomicBool::new(true),
        sent: AtomicU64::new(0),
        dropped: AtomicU64::new(0),
    });
    let (to_guest, from_host) = mpsc::unbounded_channel();
    let (to_host, from_guest) = mpsc::unbounded_channel();

    let host = LinkEnd {
        sender: MemorySender {
            tx: to_guest,
            shared: Arc::clone(&shared),
            model,
            rng: Pcg64Mcg::seed_from_u64(model.seed),
        },
        receiver: MemoryReceiver { rx: from_guest },
    };
    let guest = LinkEnd {
        sender: MemorySender {
            tx: to_host,
            shared: Arc::clone(&shared),
            model,
            rng: Pcg64Mcg::seed_from_u64(model.seed.wrapping_add(1)),
        },
        receiver: MemoryReceiver { rx: from_host },
    };

    (host, guest, LinkControl { shared })
}
