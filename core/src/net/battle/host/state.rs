//! Host session types

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use battlelink_shared::{AbsoluteSide, BattleCheckpoint, HeroPosition};

use crate::net::battle::monitor::LinkState;
use crate::net::battle::pause::{PauseReason, ResumeReason};

/// Whether a peer is actually on the other end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Two peers; acks are awaited
    Networked,
    /// Single player; every ack wait resolves immediately
    Offline,
}

/// Read access to the host's authoritative simulation.
pub trait BattleAuthority {
    /// Complete snapshot of the current battle.
    fn checkpoint(&self) -> BattleCheckpoint;

    fn is_battle_active(&self) -> bool {
        self.checkpoint().battle_active
    }

    /// Whether a win or loss has been decided.
    fn outcome_decided(&self) -> bool {
        self.checkpoint().winner.is_some()
    }
}

impl BattleAuthority for Rc<RefCell<BattleCheckpoint>> {
    fn checkpoint(&self) -> BattleCheckpoint {
        self.borrow().clone()
    }

    fn is_battle_active(&self) -> bool {
        self.borrow().battle_active
    }

    fn outcome_decided(&self) -> bool {
        self.borrow().winner.is_some()
    }
}

/// Events emitted by the host session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// Simulation halted; show the blocking indicator
    Paused { reason: PauseReason },
    /// Simulation gate reopened; hide the indicator
    Resumed {
        reason: ResumeReason,
        paused_for: Duration,
    },
    /// Settle delay after a resume elapsed; restart the simulation loop
    SimulationRestart,
    /// Link state changed
    LinkChanged(LinkState),
    /// A snapshot was sent to the guest
    ResyncStarted { resync_id: u64 },
    /// A resync finished, confirmed or not
    ResyncFinished { resync_id: u64, acknowledged: bool },
    /// Creature lists were pushed in answer to a guest request
    CreatureSyncSent { side: AbsoluteSide },
}

/// Work requested by host message handlers, executed by the session after
/// dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    GuestReady {
        guest_turn: Option<u32>,
    },
    ResyncRequested {
        reason: String,
        guest_turn: u32,
    },
    CreatureSyncRequested {
        side: AbsoluteSide,
        hero_position: Option<HeroPosition>,
    },
}

/// Context handed to host message handlers.
#[derive(Debug, Default)]
pub struct HostContext {
    pub(crate) commands: Vec<HostCommand>,
}

impl HostContext {
    /// Ask the session to carry out a command once dispatch returns.
    pub fn request(&mut self, command: HostCommand) {
        self.commands.push(command);
    }
}
