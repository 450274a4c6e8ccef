//! Round state machine
//!
//! `CrashGame` owns the registry, the live round and the history log. It is
//! synchronous: every client action and every timer firing is a method call
//! that returns a [`Step`] listing the messages to deliver and, if the phase
//! needs one, the next timer to arm. The network loop is the only caller, so
//! all mutations are serialized through it.
//!
//! Phases run `Idle -> Countdown -> Running -> Crashed -> (Idle | Countdown)`.

use crate::config::GameConfig;
use crate::crash::{generate_crash_point, next_multiplier};
use crate::history::GameHistory;
use crate::registry::PlayerRegistry;
use crate::utils::{get_timestamp, unix_seconds};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use shared::{format_multiplier, ClientEvent, ConnectionId, GameResult, Phase, ServerEvent, Snapshot};
use std::time::Duration;

/// One outbound message and its audience
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Broadcast(ServerEvent),
    Direct(ConnectionId, ServerEvent),
}

/// Timers that drive the round forward. At most one is pending at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    CountdownTick,
    MultiplierTick,
    Cooldown,
}

impl TimerKind {
    /// Phase in which this timer is meaningful; a firing in any other phase is stale
    fn phase(&self) -> Phase {
        match self {
            TimerKind::CountdownTick => Phase::Countdown,
            TimerKind::MultiplierTick => Phase::Running,
            TimerKind::Cooldown => Phase::Crashed,
        }
    }
}

/// Effects of one state machine operation, in delivery order
#[derive(Debug, Default)]
pub struct Step {
    pub dispatches: Vec<Dispatch>,
    /// Timer to arm, replacing any pending one
    pub timer: Option<TimerKind>,
}

impl Step {
    fn broadcast(&mut self, event: ServerEvent) {
        self.dispatches.push(Dispatch::Broadcast(event));
    }

    fn direct(&mut self, id: ConnectionId, event: ServerEvent) {
        self.dispatches.push(Dispatch::Direct(id, event));
    }

    fn arm(&mut self, timer: TimerKind) {
        self.timer = Some(timer);
    }
}

pub struct CrashGame<R = StdRng> {
    config: GameConfig,
    registry: PlayerRegistry,
    history: GameHistory,
    phase: Phase,
    multiplier: f64,
    time_left: u32,
    /// Drawn when the round starts running, cleared when it crashes
    crash_point: Option<f64>,
    rng: R,
}

impl CrashGame<StdRng> {
    pub fn new(config: GameConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<R: Rng> CrashGame<R> {
    pub fn with_rng(config: GameConfig, rng: R) -> Self {
        let registry = PlayerRegistry::new(config.starting_balance);
        let time_left = config.countdown_secs;
        Self {
            config,
            registry,
            history: GameHistory::new(),
            phase: Phase::Idle,
            multiplier: 1.0,
            time_left,
            crash_point: None,
            rng,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn history(&self) -> &GameHistory {
        &self.history
    }

    pub fn timer_delay(&self, timer: TimerKind) -> Duration {
        match timer {
            TimerKind::CountdownTick => self.config.countdown_tick,
            TimerKind::MultiplierTick => self.config.multiplier_tick,
            TimerKind::Cooldown => self.config.cooldown,
        }
    }

    /// Everything a freshly connected client needs to render the table
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            is_active: self.phase == Phase::Running,
            phase: self.phase,
            current_multiplier: self.multiplier,
            countdown_active: self.phase == Phase::Countdown,
            time_to_start: self.time_left,
            recent_games: self.history.recent_games(),
            players: self.registry.participants().map(|p| p.summary()).collect(),
            game_history: self.history.results(),
        }
    }

    pub fn connect(&self, id: ConnectionId) -> ServerEvent {
        info!("New connection: {}", id);
        ServerEvent::InitState(self.snapshot())
    }

    pub fn handle(&mut self, id: ConnectionId, event: ClientEvent) -> Step {
        match event {
            ClientEvent::RegisterPlayer { username } => self.register(id, &username),
            ClientEvent::PlaceBet { bet } => self.place_bet(id, &bet),
            ClientEvent::CashOut => self.cash_out(id),
            ClientEvent::SetAutoCashout { multiplier } => self.set_auto_cashout(id, &multiplier),
            ClientEvent::ChatMessage { message } => self.chat(id, &message),
        }
    }

    pub fn register(&mut self, id: ConnectionId, username: &str) -> Step {
        let mut step = Step::default();
        match self.registry.register(id, username) {
            Ok(player) => {
                step.direct(
                    id,
                    ServerEvent::PlayerRegistered {
                        id,
                        username: player.username.clone(),
                        balance: player.balance,
                    },
                );
                step.direct(id, ServerEvent::success());
            }
            Err(e) => {
                warn!("Registration rejected for {} ({:?}): {}", id, e.kind(), e);
                step.direct(id, ServerEvent::failure(e.to_string()));
            }
        }
        step
    }

    pub fn place_bet(&mut self, id: ConnectionId, amount: &Value) -> Step {
        let mut step = Step::default();
        match self.registry.place_bet(id, amount, self.phase) {
            Ok(receipt) => {
                step.direct(id, receipt.confirmation());
                step.direct(id, ServerEvent::success());
                step.broadcast(receipt.announcement());

                // Bets during cooldown wait for the cooldown timer instead.
                if self.phase == Phase::Idle {
                    self.begin_countdown(&mut step);
                }
            }
            Err(e) => {
                warn!("Bet rejected for {} ({:?}): {}", id, e.kind(), e);
                step.direct(id, ServerEvent::failure(e.to_string()));
            }
        }
        step
    }

    pub fn cash_out(&mut self, id: ConnectionId) -> Step {
        let mut step = Step::default();
        match self.registry.cash_out(id, self.phase, self.multiplier) {
            Some(cash_out) => {
                step.direct(id, cash_out.confirmation());
                step.broadcast(cash_out.announcement());
            }
            None => debug!("Ignored cash-out from {} in phase {}", id, self.phase.as_str()),
        }
        step
    }

    pub fn set_auto_cashout(&mut self, id: ConnectionId, raw: &Value) -> Step {
        let mut step = Step::default();
        if let Some(multiplier) = self.registry.set_auto_cashout(id, raw) {
            step.direct(id, ServerEvent::AutoCashoutSet { multiplier });
        }
        step
    }

    pub fn chat(&mut self, id: ConnectionId, message: &str) -> Step {
        let mut step = Step::default();
        let message = message.trim();
        if message.is_empty() {
            return step;
        }
        if let Some(player) = self.registry.find_by_connection(id) {
            info!("[CHAT] {}: {}", player.username, message);
            step.broadcast(ServerEvent::ChatMessage {
                username: player.username.clone(),
                message: message.to_string(),
                timestamp: get_timestamp(),
            });
        }
        step
    }

    /// Drops the connection's player. A stake in the live round is forfeited.
    pub fn disconnect(&mut self, id: ConnectionId) -> Step {
        let mut step = Step::default();
        if let Some(player) = self.registry.unregister(id) {
            if player.in_round && player.bet > 0 {
                info!(
                    "{} left with {} at stake in phase {}",
                    player.username,
                    player.bet,
                    self.phase.as_str()
                );
            }
            step.broadcast(ServerEvent::PlayerDisconnected {
                id,
                username: player.username,
            });
        }
        step
    }

    /// Advances the round when its pending timer fires
    pub fn on_timer(&mut self, timer: TimerKind) -> Step {
        let mut step = Step::default();
        if timer.phase() != self.phase {
            debug!("Stale {:?} timer in phase {}", timer, self.phase.as_str());
            return step;
        }

        match timer {
            TimerKind::CountdownTick => self.countdown_tick(&mut step),
            TimerKind::MultiplierTick => self.multiplier_tick(&mut step),
            TimerKind::Cooldown => self.finish_cooldown(&mut step),
        }
        step
    }

    /// Enters the countdown; a no-op once a countdown or run is in progress
    fn begin_countdown(&mut self, step: &mut Step) {
        if matches!(self.phase, Phase::Countdown | Phase::Running) {
            return;
        }

        info!("Countdown started");
        self.phase = Phase::Countdown;
        self.time_left = self.config.countdown_secs;
        if self.time_left == 0 {
            self.start_round(step);
            return;
        }

        step.broadcast(ServerEvent::CountdownStart {
            time_left: self.time_left,
        });
        step.arm(TimerKind::CountdownTick);
    }

    /// Announces the second that just elapsed, starting the round after the last one
    fn countdown_tick(&mut self, step: &mut Step) {
        step.broadcast(ServerEvent::CountdownUpdate {
            time_left: self.time_left,
        });
        self.time_left = self.time_left.saturating_sub(1);
        if self.time_left == 0 {
            self.start_round(step);
            return;
        }
        step.arm(TimerKind::CountdownTick);
    }

    fn start_round(&mut self, step: &mut Step) {
        let crash_point = generate_crash_point(&mut self.rng);
        self.crash_point = Some(crash_point);
        self.phase = Phase::Running;
        self.multiplier = 1.0;
        self.time_left = 0;

        let active_players: Vec<_> = self.registry.participants().map(|p| p.active()).collect();
        info!(
            "Round started with {} players, crash point {:.2}x",
            active_players.len(),
            crash_point
        );

        step.broadcast(ServerEvent::GameStart { active_players });
        step.arm(TimerKind::MultiplierTick);
    }

    /// One multiplier step
    ///
    /// A step that reaches the crash point ends the round without being
    /// published, so nobody can cash out at or beyond it. Otherwise auto
    /// cash-outs are settled before any message of this tick goes out.
    fn multiplier_tick(&mut self, step: &mut Step) {
        let crash_point = match self.crash_point {
            Some(point) => point,
            None => {
                warn!("Running round without a crash point");
                self.crash(step);
                return;
            }
        };

        let next = next_multiplier(self.multiplier, &mut self.rng);
        if next >= crash_point {
            self.crash(step);
            return;
        }

        self.multiplier = next;
        let cash_outs = self.registry.auto_cash_out(next);
        debug!("Multiplier {:.2}x", next);

        step.broadcast(ServerEvent::MultiplierUpdate { multiplier: next });
        for cash_out in cash_outs {
            step.direct(cash_out.id, cash_out.confirmation());
            step.broadcast(cash_out.announcement());
        }
        step.arm(TimerKind::MultiplierTick);
    }

    fn crash(&mut self, step: &mut Step) {
        let crash_point = self.crash_point.take().unwrap_or(self.multiplier);
        self.phase = Phase::Crashed;

        let result = GameResult {
            multiplier: crash_point,
            timestamp: unix_seconds(),
            players: self.registry.settle_round(),
        };
        info!(
            "Crashed at {:.2}x ({} players)",
            crash_point,
            result.players.len()
        );
        self.history.record(result.clone());

        step.broadcast(ServerEvent::GameCrash {
            crash_point: format_multiplier(crash_point),
            game_result: result,
        });
        step.arm(TimerKind::Cooldown);
    }

    fn finish_cooldown(&mut self, step: &mut Step) {
        self.phase = Phase::Idle;
        self.time_left = self.config.countdown_secs;
        if self.registry.any_ready() {
            self.begin_countdown(step);
        } else {
            debug!("No bets waiting; table idle");
        }
    }
}
