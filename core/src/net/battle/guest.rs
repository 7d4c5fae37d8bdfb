//! Guest session
//!
//! The guest never changes authoritative state on its own. It applies the
//! host's messages to its mirror, paces position swaps through the swap
//! queue, acknowledges pause notices and snapshots, and reports readiness or
//! desync back to the host.

mod handlers;
mod state;


use std::time::Instant;

use battlelink_shared::{AbsoluteSide, BattleCheckpoint, HeroPosition, PeerRole};

pub use handlers::{BuiltinGuestHandlers, EffectCatalogModule};
pub use state::GuestContext;

use crate::config::SyncConfig;

use super::dispatch::{Dispatch, Dispatcher, HandlerModule};
use super::messages::{
    BattleMessage, GuestDesyncSignal, GuestReconnectionReady, RequestCreatureSync, WireFrame,
    kinds,
};
use super::mirror::{GuestMirror, MirrorEvent};
use super::pause::PauseController;
use super::swap_queue::SwapQueue;
use super::timing::wall_clock_ms;
use super::transport::MessageChannel;

/// Mirroring side of a battle session.
pub struct GuestSession {
    channel: Box<dyn MessageChannel>,
    dispatcher: Dispatcher<GuestContext>,
    ctx: GuestContext,
}

impl GuestSession {
    /// Create a guest session mirroring `initial`, with the built-in handlers
    /// and the effect catalog installed.
    pub fn new(config: &SyncConfig, channel: Box<dyn MessageChannel>, initial: BattleCheckpoint) -> Self {
        let mut dispatcher = Dispatcher::new(PeerRole::Guest);
        dispatcher.install(&BuiltinGuestHandlers);
        dispatcher.install(&EffectCatalogModule);

        let ctx = GuestContext::new(
            GuestMirror::new(initial),
            PauseController::new(PeerRole::Guest, config.pause.clone()),
            SwapQueue::new(&config.swap),
        );

        tracing::info!(handlers = dispatcher.len(), "Guest session started");
        Self {
            channel,
            dispatcher,
            ctx,
        }
    }

    /// Register additional guest handlers.
    pub fn install(&mut self, module: &dyn HandlerModule<GuestContext>) {
        self.dispatcher.install(module);
    }

    /// Handle a decoded frame from the host.
    pub fn receive(&mut self, frame: WireFrame, now: Instant) {
        match frame {
            WireFrame::BattleAck(ack) => {
                tracing::trace!(ack_type = %ack.kind, "Guest ignoring ack");
            }
            WireFrame::BattleData(message) => {
                tracing::trace!(kind = %message.kind, "Guest received message");
                if let Dispatch::Deferred = self.dispatcher.dispatch(&mut self.ctx, &message, now) {
                    self.enqueue_swap(message, now);
                }
                self.flush();
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

    fn enqueue_swap(&mut self, message: BattleMessage, now: Instant) {
        let id = handlers::swap_id(&message.data);
        self.ctx
            .swaps
            .enqueue(&message.kind, message.data, message.timestamp, id, now);
    }

    /// Release due swaps and return this frame's render events.
    pub fn poll(&mut self, now: Instant) -> Vec<MirrorEvent> {
        while let Some(entry) = self.ctx.swaps.poll(now) {
            let message = BattleMessage {
                kind: entry.kind,
                data: entry.data,
                timestamp: entry.timestamp,
            };
            tracing::debug!(kind = %message.kind, id = %entry.id, "Applying queued swap");
            self.dispatcher.apply(&mut self.ctx, &message, now);
        }
        self.flush();
        self.ctx.mirror.drain_events()
    }

    fn flush(&mut self) {
        for frame in std::mem::take(&mut self.ctx.outbox) {
            if let Err(e) = self.channel.send(&frame) {
                tracing::warn!(kind = frame.kind(), error = %e, "Failed to send to host");
            }
        }
    }

    fn send<T: serde::Serialize>(&mut self, kind: &str, payload: &T) {
        if let Err(e) = self.ctx.send(kind, payload) {
            tracing::warn!(kind, error = %e, "Failed to encode message");
        }
        self.flush();
    }

    /// Tell the host this guest is back and ready for a snapshot.
    pub fn announce_ready(&mut self) {
        let ready = GuestReconnectionReady {
            timestamp: wall_clock_ms(),
            guest_turn: Some(self.ctx.state().turn),
        };
        tracing::info!(guest_turn = ?ready.guest_turn, "Announcing reconnection ready");
        self.send(kinds::GUEST_RECONNECTION_READY, &ready);
    }

    /// Ask the host for a full resync.
    pub fn signal_desync(&mut self, reason: &str) {
        let signal = GuestDesyncSignal {
            timestamp: wall_clock_ms(),
            guest_turn: self.ctx.state().turn,
            reason: reason.to_string(),
        };
        tracing::warn!(reason, "Signalling desync to host");
        self.send(kinds::GUEST_DESYNC_SIGNAL, &signal);
    }

    /// Ask the host for fresh creature lists.
    pub fn request_creature_sync(&mut self, side: AbsoluteSide, hero: Option<HeroPosition>, reason: &str) {
        let request = RequestCreatureSync {
            side,
            hero_position: hero,
            reason: reason.to_string(),
            timestamp: wall_clock_ms(),
        };
        self.send(kinds::REQUEST_CREATURE_SYNC, &request);
    }

    pub fn state(&self) -> &BattleCheckpoint {
        self.ctx.state()
    }

    pub fn context(&self) -> &GuestContext {
        &self.ctx
    }

    pub fn is_paused(&self) -> bool {
        self.ctx.is_paused()
    }

    /// Swaps waiting for their slot.
    pub fn queued_swaps(&self) -> usize {
        self.ctx.swaps.len()
    }

    /// Id of the last snapshot applied.
    pub fn last_resync_id(&self) -> Option<u64> {
        self.ctx.last_resync.map(|(id, _)| id)
    }
}
