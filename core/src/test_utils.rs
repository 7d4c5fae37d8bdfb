//! Shared test utilities for unit and scenario tests

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use battlelink_shared::{AbsoluteSide, BattleCheckpoint, CreatureState, HeroPosition, HeroState, SideState};

use crate::config::SyncConfig;
use crate::net::battle::{
    GuestSession, HostEvent, HostSession, LinkControl, LinkModel, MemoryReceiver, MessageChannel,
    MirrorEvent, SessionMode, WireFrame, memory_link,
};
use crate::net::battle::transport::ChannelError;
use crate::save_store::MemoryCheckpointStore;

// ============================================================================
// Fixtures
// ============================================================================

pub fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

/// Two heroes per side at 80/100 and 45/100, one 10/10 creature per side.
pub fn sample_checkpoint() -> BattleCheckpoint {
    fn side(left: &str, center: &str, creature: &str) -> SideState {
        let mut lead = HeroState::new(HeroPosition::Left, left, 80, 100);
        lead.creatures.push(CreatureState::new(creature, 10, 10));
        SideState {
            heroes: vec![lead, HeroState::new(HeroPosition::Center, center, 45, 100)],
            hand: vec!["Fireball".to_string(), "Heal".to_string()],
            deck: vec!["Ice Bolt".to_string(); 5],
            graveyard: Vec::new(),
            gold: 4,
        }
    }

    BattleCheckpoint {
        turn: 3,
        battle_active: true,
        winner: None,
        host: side("Alice", "Cecilia", "Skeleton Archer"),
        guest: side("Darge", "Ida", "Front Soldier"),
        delayed_effects: Vec::new(),
    }
}

/// Authority handle the tests can mutate while a host session reads it.
pub fn shared_battle() -> Rc<RefCell<BattleCheckpoint>> {
    Rc::new(RefCell::new(sample_checkpoint()))
}

/// Set a hero's HP directly in a checkpoint.
pub fn set_hero_hp(battle: &mut BattleCheckpoint, side: AbsoluteSide, position: HeroPosition, hp: i32) {
    if let Some(hero) = battle.side_mut(side).hero_mut(position) {
        hero.hp = hp;
        hero.alive = hp > 0;
    }
}

// ============================================================================
// Recording channel
// ============================================================================

/// Channel that records every frame. Clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingChannel {
    frames: Rc<RefCell<Vec<WireFrame>>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything recorded so far.
    pub fn take(&self) -> Vec<WireFrame> {
        std::mem::take(&mut *self.frames.borrow_mut())
    }

    /// Tags of everything recorded so far, without consuming it.
    pub fn kinds(&self) -> Vec<String> {
        self.frames.borrow().iter().map(|f| f.kind().to_string()).collect()
    }
}

impl MessageChannel for RecordingChannel {
    fn send(&mut self, frame: &WireFrame) -> Result<(), ChannelError> {
        self.frames.borrow_mut().push(frame.clone());
        Ok(())
    }
}

/// Host session over a recording channel and an in-memory store.
pub fn recording_host(
    mode: SessionMode,
) -> (HostSession, RecordingChannel, MemoryCheckpointStore, Rc<RefCell<BattleCheckpoint>>) {
    let channel = RecordingChannel::new();
    let store = MemoryCheckpointStore::new();
    let battle = shared_battle();
    let host = HostSession::new(
        SyncConfig::default(),
        mode,
        Box::new(channel.clone()),
        Box::new(battle.clone()),
        Box::new(store.clone()),
    );
    (host, channel, store, battle)
}

/// Guest session over a recording channel.
pub fn recording_guest() -> (GuestSession, RecordingChannel) {
    let channel = RecordingChannel::new();
    let guest = GuestSession::new(
        &SyncConfig::default(),
        Box::new(channel.clone()),
        sample_checkpoint(),
    );
    (guest, channel)
}

// ============================================================================
// Host + guest harness
// ============================================================================

/// A host and a guest joined by an in-memory link.
pub struct Harness {
    pub host: HostSession,
    pub guest: GuestSession,
    pub link: LinkControl,
    pub battle: Rc<RefCell<BattleCheckpoint>>,
    pub store: MemoryCheckpointStore,
    pub t0: Instant,
    host_rx: MemoryReceiver,
    guest_rx: MemoryReceiver,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_model(LinkModel::RELIABLE)
    }

    pub fn with_model(model: LinkModel) -> Self {
        let (host_end, guest_end, link) = memory_link(model);
        let battle = shared_battle();
        let store = MemoryCheckpointStore::new();
        let config = SyncConfig::default();

        let host = HostSession::new(
            config.clone(),
            SessionMode::Networked,
            Box::new(host_end.sender),
            Box::new(battle.clone()),
            Box::new(store.clone()),
        );
        let guest = GuestSession::new(&config, Box::new(guest_end.sender), sample_checkpoint());

        Self {
            host,
            guest,
            link,
            battle,
            store,
            t0: Instant::now(),
            host_rx: host_end.receiver,
            guest_rx: guest_end.receiver,
        }
    }

    /// Instant `n` milliseconds after the harness started.
    pub fn at(&self, n: u64) -> Instant {
        self.t0 + ms(n)
    }

    /// Deliver frames in both directions until the link is quiet.
    pub fn deliver(&mut self, now: Instant) {
        loop {
            let to_guest = self.guest_rx.drain();
            let to_host = self.host_rx.drain();
            if to_guest.is_empty() && to_host.is_empty() {
                break;
            }
            for text in to_guest {
                self.guest.receive_raw(&text, now);
            }
            for text in to_host {
                self.host.receive_raw(&text, now);
            }
        }
    }

    /// Deliver, poll both sides, deliver again.
    pub fn step(&mut self, now: Instant) -> (Vec<HostEvent>, Vec<MirrorEvent>) {
        self.deliver(now);
        let host_events = self.host.poll(now);
        let guest_events = self.guest.poll(now);
        self.deliver(now);
        (host_events, guest_events)
    }

    /// Step every `tick` ms from `from` to `to` (inclusive), collecting events.
    pub fn run(&mut self, from: u64, to: u64, tick: u64) -> (Vec<HostEvent>, Vec<MirrorEvent>) {
        let mut host_events = Vec::new();
        let mut guest_events = Vec::new();
        let mut t = from;
        while t <= to {
            let (h, g) = self.step(self.at(t));
            host_events.extend(h);
            guest_events.extend(g);
            t += tick.max(1);
        }
        (host_events, guest_events)
    }
}
