//! Battle update dispatcher
//!
//! Routes each [`BattleMessage`] to the handler registered for its type tag.
//! Handlers are registered at startup, either one by one or by installing a
//! [`HandlerModule`]. The dispatcher is generic over the context the handlers
//! mutate, so host and guest share it.
//!
//! Routing rules:
//! - unknown tags are ignored and change nothing
//! - deferred tags (position swaps) are handed back to the caller for pacing
//! - a failing handler is logged; it never stops later messages

use std::time::Instant;

use battlelink_shared::PeerRole;
use hashbrown::{HashMap, HashSet};
use serde::de::DeserializeOwned;

use super::messages::BattleMessage;

/// A registered handler
pub type Handler<C> = Box<dyn FnMut(&mut C, &BattleMessage, Instant) -> Result<(), HandlerError>>;

/// A set of handlers that registers itself.
pub trait HandlerModule<C> {
    /// Module name for logging
    fn name(&self) -> &'static str;

    fn register(&self, dispatcher: &mut Dispatcher<C>);
}

/// Result of routing one message
#[derive(Debug)]
pub enum Dispatch {
    /// A handler ran successfully
    Applied,
    /// No handler for this tag
    Ignored,
    /// Tag is paced; the caller queues it
    Deferred,
    /// The handler rejected the message
    Failed(HandlerError),
}

impl Dispatch {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Errors raised by message handlers
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Invalid '{kind}' payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("Message rejected: {0}")]
    Rejected(String),
}

/// Tag -> handler registry.
pub struct Dispatcher<C> {
    role: PeerRole,
    handlers: HashMap<String, Handler<C>>,
    deferred: HashSet<String>,
}

impl<C> Dispatcher<C> {
    pub fn new(role: PeerRole) -> Self {
        Self {
            role,
            handlers: HashMap::new(),
            deferred: HashSet::new(),
        }
    }

    /// Register a raw handler. A later registration for the same tag replaces
    /// the earlier one.
    pub fn register<F>(&mut self, kind: &str, handler: F)
    where
        F: FnMut(&mut C, &BattleMessage, Instant) -> Result<(), HandlerError> + 'static,
    {
        if self.handlers.insert(kind.to_string(), Box::new(handler)).is_some() {
            tracing::debug!(kind, "Handler replaced");
        }
    }

    /// Register a handler that receives the decoded payload.
    pub fn register_typed<T, F>(&mut self, kind: &str, mut handler: F)
    where
        T: DeserializeOwned + 'static,
        F: FnMut(&mut C, T, Instant) -> Result<(), HandlerError> + 'static,
    {
        self.register(kind, move |ctx, message, now| {
            let payload = message
                .payload::<T>()
                .map_err(|source| HandlerError::InvalidPayload {
                    kind: message.kind.clone(),
                    source,
                })?;
            handler(ctx, payload, now)
        });
    }

    /// Register a handler whose messages are paced by the caller.
    pub fn register_deferred<T, F>(&mut self, kind: &str, handler: F)
    where
        T: DeserializeOwned + 'static,
        F: FnMut(&mut C, T, Instant) -> Result<(), HandlerError> + 'static,
    {
        self.register_typed(kind, handler);
        self.deferred.insert(kind.to_string());
    }

    /// Let a module register its handlers.
    pub fn install(&mut self, module: &dyn HandlerModule<C>) {
        let before = self.handlers.len();
        module.register(self);
        tracing::debug!(
            module = module.name(),
            role = ?self.role,
            added = self.handlers.len().saturating_sub(before),
            "Handler module installed"
        );
    }

    /// Route a message. Deferred tags are not applied.
    pub fn dispatch(&mut self, ctx: &mut C, message: &BattleMessage, now: Instant) -> Dispatch {
        if self.deferred.contains(message.kind.as_str()) {
            return Dispatch::Deferred;
        }
        self.apply(ctx, message, now)
    }

    /// Run the handler for a message, bypassing deferral.
    pub fn apply(&mut self, ctx: &mut C, message: &BattleMessage, now: Instant) -> Dispatch {
        let Some(handler) = self.handlers.get_mut(message.kind.as_str()) else {
            tracing::trace!(kind = %message.kind, role = ?self.role, "No handler, ignoring");
            return Dispatch::Ignored;
        };

        match handler(ctx, message, now) {
            Ok(()) => {
                tracing::trace!(kind = %message.kind, "Message applied");
                Dispatch::Applied
            }
            Err(e) => {
                tracing::warn!(kind = %message.kind, error = %e, "Handler failed");
                Dispatch::Failed(e)
            }
        }
    }

    pub fn handles(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn is_deferred(&self, kind: &str) -> bool {
        self.deferred.contains(kind)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }
}
