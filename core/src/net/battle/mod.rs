//! Battle synchronization
//!
//! The host runs the only authoritative simulation; the guest mirrors it from
//! the host's messages. This module keeps the two consistent across
//! disconnects, reconnections, tab switches and message loss.
//!
//! # Message Flow
//!
//! ```text
//! Host                               Guest
//!   |                                  |
//!   |--- battle_data (updates) ------->|  dispatcher -> mirror
//!   |                                  |
//!   |    (presence: guest offline)     |
//!   |--- battle_paused --------------->|
//!   |<-- battle_ack(battle_paused) ----|
//!   |                                  |
//!   |    (presence: guest online)      |
//!   |<-- guest_reconnection_ready -----|
//!   |--- resync_battle_state --------->|  mirror replaced
//!   |<-- battle_ack(resync_complete) --|
//!   |--- battle_resumed -------------->|
//!   |<-- battle_ack(battle_resumed) ---|
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use battlelink_core::net::battle::{HostSession, SessionMode};
//!
//! let mut host = HostSession::new(config, SessionMode::Networked, channel, authority, store);
//!
//! // Every frame
//! for text in inbound.drain() {
//!     host.receive_raw(&text, now);
//! }
//! for event in host.poll(now) {
//!     /* drive the pause indicator and the simulation loop */
//! }
//! if host.may_advance() {
//!     /* step the simulation */
//! }
//! ```

pub mod ack;
pub mod connection_state;
pub mod dispatch;
pub mod guest;
pub mod host;
pub mod messages;
pub mod mirror;
pub mod monitor;
pub mod pause;
pub mod resync;
pub mod swap_queue;
pub mod timing;
pub mod transport;

#[cfg(test)]
mod tests;

// Re-export session types
pub use guest::{GuestContext, GuestSession};
pub use host::{BattleAuthority, HostCommand, HostContext, HostEvent, HostSession, SessionMode};

// Re-export state machines
pub use ack::{AckOutcome, AckTracker, AckWaiter};
pub use connection_state::ConnectionState;
pub use dispatch::{Dispatch, Dispatcher, HandlerError, HandlerModule};
pub use mirror::{CreatureMatch, GuestMirror, MirrorEvent};
pub use monitor::{ConnectionMonitor, LinkState, PresenceUpdate};
pub use pause::{PauseController, PauseReason, ResumeReason};
pub use resync::{ResyncCoordinator, ResyncOutcome, ResyncTrigger};
pub use swap_queue::{SwapEntry, SwapQueue};

// Re-export wire types
pub use messages::{AckData, BattleMessage, FrameError, WireFrame, kinds};
pub use transport::{
    ChannelError, LinkControl, LinkEnd, LinkModel, MemoryReceiver, MemorySender, MessageChannel,
    NullChannel, memory_link,
};
