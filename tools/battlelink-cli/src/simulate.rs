//! Simulate command - scripted host/guest battle over an in-memory link
//!
//! Runs on a virtual clock, so a 30 second battle finishes instantly and the
//! same seed always produces the same run. The host plays random damage,
//! creature hits, position swaps and turn changes while the link drops
//! frames; the guest goes offline and comes back on the configured schedule.
//! A final resync at the end shows whether the mirror converged.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use battlelink_core::config::{self, SyncConfig};
use battlelink_core::net::battle::messages::{
    BattleEnded, CreatureDamageApplied, CreatureTarget, DamageApplied, HeroTarget, PositionSwap,
    TurnStarted,
};
use battlelink_core::net::battle::{
    GuestSession, HostEvent, HostSession, LinkControl, LinkModel, MemoryReceiver, PresenceUpdate,
    ResyncTrigger, SessionMode, kinds, memory_link,
};
use battlelink_core::save_store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use battlelink_shared::{
    AbsoluteSide, BattleCheckpoint, CreatureState, HeroPosition, HeroState, SideState,
};
use clap::Args;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

/// Arguments for the simulate command
#[derive(Args)]
pub struct SimulateArgs {
    /// Virtual seconds to simulate
    #[arg(long, default_value_t = 30)]
    pub seconds: u64,

    /// Clock step in milliseconds
    #[arg(long, default_value_t = 50)]
    pub tick_ms: u64,

    /// Probability a frame is lost (0.0 - 1.0)
    #[arg(long, default_value_t = 0.05)]
    pub loss: f64,

    /// Probability a frame arrives twice (0.0 - 1.0)
    #[arg(long, default_value_t = 0.0)]
    pub duplicate: f64,

    /// Seed for the link and the battle script
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Second at which the guest drops out
    #[arg(long, default_value_t = 10)]
    pub disconnect_at: u64,

    /// Second at which the guest comes back
    #[arg(long, default_value_t = 14)]
    pub reconnect_at: u64,

    /// Keep the guest connected the whole time
    #[arg(long)]
    pub stable: bool,

    /// Guest never sends the reconnection handshake
    #[arg(long)]
    pub no_handshake: bool,

    /// Delay between reconnecting and the handshake, in milliseconds
    #[arg(long, default_value_t = 200)]
    pub ready_delay_ms: u64,

    /// Battle speed multiplier
    #[arg(long, default_value_t = 1.0)]
    pub speed: f32,

    /// Config file (defaults to the platform config)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Persist the battle to this file on pause and resume
    #[arg(long)]
    pub save: Option<PathBuf>,
}

/// Execute the simulate command
pub fn execute(args: SimulateArgs) -> Result<()> {
    if args.tick_ms == 0 {
        bail!("--tick-ms must be positive");
    }
    if !(0.0..=1.0).contains(&args.loss) || !(0.0..=1.0).contains(&args.duplicate) {
        bail!("--loss and --duplicate must be between 0 and 1");
    }
    if !args.stable && args.reconnect_at <= args.disconnect_at {
        bail!("--reconnect-at must come after --disconnect-at");
    }

    let config = match &args.config {
        Some(path) => config::load_from(path)?,
        None => config::load(),
    };
    let problems = config.validate();
    if !problems.is_empty() {
        bail!("Invalid config: {}", problems.join("; "));
    }

    let mut sim = Simulation::new(&args, config);
    sim.run(&args)?;
    sim.finish();
    sim.report();
    Ok(())
}

/// Counters collected during a run
#[derive(Debug, Default)]
struct Stats {
    actions: u32,
    pauses: u32,
    resumes: u32,
    restarts: u32,
    guest_events: usize,
}

struct Simulation {
    host: HostSession,
    guest: GuestSession,
    host_rx: MemoryReceiver,
    guest_rx: MemoryReceiver,
    link: LinkControl,
    battle: Rc<RefCell<BattleCheckpoint>>,
    rng: Pcg64Mcg,
    config: SyncConfig,
    start: Instant,
    /// Virtual milliseconds since `start`
    clock: u64,
    swaps: u32,
    stats: Stats,
}

impl Simulation {
    fn new(args: &SimulateArgs, config: SyncConfig) -> Self {
        let (host_end, guest_end, link) = memory_link(LinkModel {
            loss: args.loss,
            duplicate: args.duplicate,
            seed: args.seed,
        });
        let battle = Rc::new(RefCell::new(demo_battle()));

        let store: Box<dyn CheckpointStore> = match &args.save {
            Some(path) => Box::new(FileCheckpointStore::new(path.clone())),
            None => Box::new(MemoryCheckpointStore::new()),
        };
        let mut host = HostSession::new(
            config.clone(),
            SessionMode::Networked,
            Box::new(host_end.sender),
            Box::new(battle.clone()),
            store,
        );
        host.set_speed(args.speed);

        let initial = battle.borrow().clone();
        let guest = GuestSession::new(&config, Box::new(guest_end.sender), initial);

        tracing::info!(
            seed = args.seed,
            loss = args.loss,
            duplicate = args.duplicate,
            seconds = args.seconds,
            "Simulation starting"
        );

        Self {
            host,
            guest,
            host_rx: host_end.receiver,
            guest_rx: guest_end.receiver,
            link,
            battle,
            rng: Pcg64Mcg::seed_from_u64(args.seed.wrapping_mul(0x9e37_79b9_7f4a_7c15)),
            config,
            start: Instant::now(),
            clock: 0,
            swaps: 0,
            stats: Stats::default(),
        }
    }

    fn now(&self) -> Instant {
        self.start + Duration::from_millis(self.clock)
    }

    // ========================================================================
    // Main loop
    // ========================================================================

    fn run(&mut self, args: &SimulateArgs) -> Result<()> {
        let end = args.seconds * 1000;
        let action_interval = (400.0 / args.speed.max(0.1)) as u64;
        let mut next_action = action_interval;
        let mut disconnect = (!args.stable).then_some(args.disconnect_at * 1000);
        let mut reconnect = (!args.stable).then_some(args.reconnect_at * 1000);
        let mut ready_at = None;

        while self.clock <= end {
            let now = self.now();

            if disconnect.is_some_and(|at| self.clock >= at) {
                disconnect = None;
                tracing::info!(t_ms = self.clock, "Guest drops out");
                self.link.set_online(false);
                self.host.on_presence(PresenceUpdate::OFFLINE, now);
            }
            if reconnect.is_some_and(|at| self.clock >= at) {
                reconnect = None;
                tracing::info!(t_ms = self.clock, "Guest comes back");
                self.link.set_online(true);
                self.host.on_presence(PresenceUpdate::ONLINE, now);
                if !args.no_handshake {
                    ready_at = Some(self.clock + args.ready_delay_ms);
                }
            }
            if ready_at.is_some_and(|at| self.clock >= at) {
                ready_at = None;
                self.guest.announce_ready();
            }

            self.step(now);

            let active = {
                let battle = self.battle.borrow();
                battle.battle_active && !battle.is_decided()
            };
            if active && self.host.may_advance() && self.clock >= next_action {
                self.act()?;
                next_action = self.clock + action_interval;
            }

            self.clock += args.tick_ms;
        }
        Ok(())
    }

    /// Deliver, poll both sides, deliver again.
    fn step(&mut self, now: Instant) {
        self.deliver(now);
        for event in self.host.poll(now) {
            match event {
                HostEvent::Paused { .. } => self.stats.pauses += 1,
                HostEvent::Resumed { .. } => self.stats.resumes += 1,
                HostEvent::SimulationRestart => self.stats.restarts += 1,
                _ => {}
            }
            tracing::debug!(?event, "Host event");
        }
        self.stats.guest_events += self.guest.poll(now).len();
        self.deliver(now);
    }

    fn deliver(&mut self, now: Instant) {
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

    /// Final resync, then run until it settles.
    fn finish(&mut self) {
        let now = self.now();
        self.host.begin_resync(
            ResyncTrigger::HostDetected {
                reason: "end of simulation".to_string(),
            },
            now,
        );

        let deadline = self.clock + self.config.resync.ack_timeout_ms + 1000;
        while self.host.resync_in_flight() && self.clock <= deadline {
            self.clock += 50;
            let now = self.now();
            self.step(now);
        }
    }

    // ========================================================================
    // Battle script
    // ========================================================================

    fn act(&mut self) -> Result<()> {
        self.stats.actions += 1;
        match self.rng.random_range(0..10) {
            0 => self.swap(),
            1 | 2 => self.hit_creature(),
            3 => self.next_turn(),
            _ => self.hit_hero(),
        }
    }

    fn random_side(&mut self) -> AbsoluteSide {
        if self.rng.random_bool(0.5) {
            AbsoluteSide::Host
        } else {
            AbsoluteSide::Guest
        }
    }

    fn hit_hero(&mut self) -> Result<()> {
        let side = self.random_side();
        let alive: Vec<HeroPosition> = self
            .battle
            .borrow()
            .side(side)
            .heroes
            .iter()
            .filter(|h| h.alive)
            .map(|h| h.position)
            .collect();
        if alive.is_empty() {
            return Ok(());
        }
        let position = alive[self.rng.random_range(0..alive.len())];
        let damage = self.rng.random_range(3..=12);

        let new_hp = {
            let mut battle = self.battle.borrow_mut();
            let Some(hero) = battle.side_mut(side).hero_mut(position) else {
                return Ok(());
            };
            hero.hp = (hero.hp - damage).max(0);
            hero.alive = hero.hp > 0;
            hero.hp
        };

        self.host.broadcast(
            kinds::DAMAGE_APPLIED,
            &DamageApplied {
                target: HeroTarget { side, position },
                damage,
                new_hp,
                source: Some("simulation".to_string()),
            },
        )?;

        let wiped = self.battle.borrow().side(side).heroes.iter().all(|h| !h.alive);
        if wiped {
            self.end_battle(side.opposite())?;
        }
        Ok(())
    }

    fn hit_creature(&mut self) -> Result<()> {
        let side = self.random_side();
        let target = {
            let battle = self.battle.borrow();
            battle.side(side).heroes.iter().find_map(|hero| {
                hero.creatures
                    .iter()
                    .position(|c| c.alive)
                    .map(|index| (hero.position, index, hero.creatures[index].clone()))
            })
        };
        let Some((hero_position, index, creature)) = target else {
            return self.hit_hero();
        };

        let damage = self.rng.random_range(1..=4);
        let new_hp = (creature.hp - damage).max(0);
        let died = new_hp == 0;
        {
            let mut battle = self.battle.borrow_mut();
            if let Some(c) = battle
                .side_mut(side)
                .hero_mut(hero_position)
                .and_then(|h| h.creatures.get_mut(index))
            {
                c.hp = new_hp;
                c.alive = !died;
            }
        }

        self.host.broadcast(
            kinds::CREATURE_DAMAGE_APPLIED,
            &CreatureDamageApplied {
                target: CreatureTarget {
                    side,
                    hero_position,
                    creature_index: index,
                    creature_name: creature.name,
                    creature_hp: Some(creature.hp),
                },
                damage,
                new_hp,
                died,
            },
        )?;
        Ok(())
    }

    fn swap(&mut self) -> Result<()> {
        let side = self.random_side();
        let from = HeroPosition::ALL[self.rng.random_range(0..3)];
        let to = HeroPosition::ALL[(from as usize + self.rng.random_range(1..3)) % 3];

        {
            let mut battle = self.battle.borrow_mut();
            let heroes = &mut battle.side_mut(side).heroes;
            let Some(a) = heroes.iter().position(|h| h.position == from) else {
                return Ok(());
            };
            let b = heroes.iter().position(|h| h.position == to);
            heroes[a].position = to;
            if let Some(b) = b {
                heroes[b].position = from;
            }
        }

        self.swaps += 1;
        self.host.broadcast(
            kinds::EXPEDITION_POSITION_SWAP,
            &PositionSwap {
                side,
                from,
                to,
                id: Some(format!("swap-{}", self.swaps)),
            },
        )?;
        Ok(())
    }

    fn next_turn(&mut self) -> Result<()> {
        let turn = {
            let mut battle = self.battle.borrow_mut();
            battle.turn += 1;
            battle.turn
        };
        self.host.broadcast(kinds::TURN_STARTED, &TurnStarted { turn })?;
        Ok(())
    }

    fn end_battle(&mut self, winner: AbsoluteSide) -> Result<()> {
        {
            let mut battle = self.battle.borrow_mut();
            battle.battle_active = false;
            battle.winner = Some(winner);
        }
        tracing::info!(?winner, t_ms = self.clock, "Battle decided");
        self.host.broadcast(
            kinds::BATTLE_ENDED,
            &BattleEnded {
                winner: Some(winner),
            },
        )?;
        Ok(())
    }

    // ========================================================================
    // Report
    // ========================================================================

    fn report(&self) {
        let authority = self.battle.borrow();
        let host_sum = authority.checksum().ok();
        let guest_sum = self.guest.state().checksum().ok();
        let (completed, failed) = self.host.resync_stats();

        println!("=== Simulation Summary ===");
        println!("  Virtual time:  {:.1} s", self.clock as f64 / 1000.0);
        println!("  Turn:          {}", authority.turn);
        if let Some(winner) = authority.winner {
            println!("  Winner:        {winner:?}");
        }
        println!("  Actions:       {}", self.stats.actions);
        println!(
            "  Frames:        {} sent, {} dropped",
            self.link.sent(),
            self.link.dropped()
        );
        println!(
            "  Pauses:        {} ({} resumed, {} ms paused)",
            self.stats.pauses,
            self.stats.resumes,
            self.host.total_pause().as_millis()
        );
        println!("  Restarts:      {}", self.stats.restarts);
        println!("  Resyncs:       {completed} confirmed, {failed} unconfirmed");
        println!("  Latency:       {} ms", self.host.latency().as_millis());
        println!("  Guest events:  {}", self.stats.guest_events);
        println!("  Queued swaps:  {}", self.guest.queued_swaps());
        match (host_sum, guest_sum) {
            (Some(h), Some(g)) if h == g => println!("  Mirror:        in sync ({h:016x})"),
            (Some(h), Some(g)) => println!("  Mirror:        DIVERGED (host {h:016x}, guest {g:016x})"),
            _ => println!("  Mirror:        checksum unavailable"),
        }
    }
}

/// Three heroes a side, one creature under each left hero.
fn demo_battle() -> BattleCheckpoint {
    fn side(names: [&str; 3], creature: &str) -> SideState {
        let mut heroes: Vec<HeroState> = HeroPosition::ALL
            .into_iter()
            .zip(names)
            .zip([100, 80, 90])
            .map(|((position, name), hp)| HeroState::new(position, name, hp, hp))
            .collect();
        heroes[0].creatures.push(CreatureState::new(creature, 10, 10));
        SideState {
            heroes,
            hand: vec!["Fireball".to_string(), "Ice Bolt".to_string(), "Heal".to_string()],
            deck: vec!["Poisoned Meat".to_string(); 10],
            graveyard: Vec::new(),
            gold: 0,
        }
    }

    BattleCheckpoint {
        turn: 1,
        battle_active: true,
        winner: None,
        host: side(["Alice", "Cecilia", "Darge"], "Skeleton Archer"),
        guest: side(["Ida", "Kazena", "Medea"], "Front Soldier"),
        delayed_effects: Vec::new(),
    }
}
