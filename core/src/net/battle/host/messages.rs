//! Built-in host message handlers
//!
//! The host registry is small: the guest only ever reports readiness, desync
//! and missing creatures. Acknowledgments bypass the dispatcher.

use crate::net::battle::dispatch::{Dispatcher, HandlerModule};
use crate::net::battle::messages::{
    GuestDesyncSignal, GuestReconnectionReady, RequestCreatureSync, kinds,
};

use super::state::{HostCommand, HostContext};

/// Handlers every host session installs.
pub struct BuiltinHostHandlers;

impl HandlerModule<HostContext> for BuiltinHostHandlers {
    fn name(&self) -> &'static str {
        "host-builtin"
    }

    fn register(&self, dispatcher: &mut Dispatcher<HostContext>) {
        dispatcher.register_typed(
            kinds::GUEST_RECONNECTION_READY,
            |ctx: &mut HostContext, ready: GuestReconnectionReady, _now| {
                tracing::info!(guest_turn = ?ready.guest_turn, "Guest ready after reconnection");
                ctx.request(HostCommand::GuestReady {
                    guest_turn: ready.guest_turn,
                });
                Ok(())
            },
        );

        dispatcher.register_typed(
            kinds::GUEST_DESYNC_SIGNAL,
            |ctx: &mut HostContext, signal: GuestDesyncSignal, _now| {
                tracing::warn!(
                    guest_turn = signal.guest_turn,
                    reason = %signal.reason,
                    "Guest reported desync"
                );
                ctx.request(HostCommand::ResyncRequested {
                    reason: signal.reason,
                    guest_turn: signal.guest_turn,
                });
                Ok(())
            },
        );

        dispatcher.register_typed(
            kinds::REQUEST_CREATURE_SYNC,
            |ctx: &mut HostContext, request: RequestCreatureSync, _now| {
                tracing::debug!(
                    side = ?request.side,
                    hero = ?request.hero_position,
                    reason = %request.reason,
                    "Guest requested creature sync"
                );
                ctx.request(HostCommand::CreatureSyncRequested {
                    side: request.side,
                    hero_position: request.hero_position,
                });
                Ok(())
            },
        );
    }
}
