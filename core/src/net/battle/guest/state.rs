//! Guest session context

use std::time::Instant;

use battlelink_shared::BattleCheckpoint;
use serde::Serialize;

use crate::net::battle::messages::{FrameError, WireFrame};
use crate::net::battle::mirror::GuestMirror;
use crate::net::battle::pause::PauseController;
use crate::net::battle::swap_queue::SwapQueue;

/// State handed to guest message handlers.
///
/// Handlers mutate the mirror and queue outbound frames; the session sends
/// the outbox after each dispatch.
#[derive(Debug)]
pub struct GuestContext {
    pub(crate) mirror: GuestMirror,
    pub(crate) pause: PauseController,
    pub(crate) swaps: SwapQueue,
    pub(crate) outbox: Vec<WireFrame>,
    pub(crate) last_resync: Option<(u64, Instant)>,
}

impl GuestContext {
    pub(crate) fn new(mirror: GuestMirror, pause: PauseController, swaps: SwapQueue) -> Self {
        Self {
            mirror,
            pause,
            swaps,
            outbox: Vec::new(),
            last_resync: None,
        }
    }

    pub fn mirror(&self) -> &GuestMirror {
        &self.mirror
    }

    pub fn mirror_mut(&mut self) -> &mut GuestMirror {
        &mut self.mirror
    }

    pub fn state(&self) -> &BattleCheckpoint {
        self.mirror.state()
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    /// Queue an acknowledgment.
    pub fn ack(&mut self, kind: &str) {
        self.outbox.push(WireFrame::ack(kind));
    }

    /// Queue a message to the host.
    pub fn send<T: Serialize>(&mut self, kind: &str, payload: &T) -> Result<(), FrameError> {
        self.outbox.push(WireFrame::data(kind, payload)?);
        Ok(())
    }
}
