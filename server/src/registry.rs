//! Player registration, bets and cash-outs
//!
//! This module owns every player record on the server:
//! - Registration keyed by connection, with unique display names
//! - Bet placement and balance debits
//! - Manual and automatic cash-outs during a running round
//! - Settlement of in-round fields when a round crashes
//!
//! The registry never decides *when* a round starts or ends; callers pass in
//! the current phase and multiplier, and the round state machine reacts to
//! what the registry reports back.

use crate::error::GameError;
use log::info;
use serde_json::Value;
use shared::{
    payout, ActivePlayer, ConnectionId, Phase, PlayerOutcome, PlayerSummary, ServerEvent,
};
use std::collections::BTreeMap;

/// A registered player and their stake in the current round
///
/// Balances only move at two points: the bet is debited when it is placed,
/// and winnings are credited at cash-out. Losing bets need no settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: ConnectionId,
    pub username: String,
    pub balance: u64,
    /// Stake in the current (or next) round, zero when not playing
    pub bet: u64,
    /// Takes part in the round being counted down or run
    pub in_round: bool,
    /// Has a bet waiting; drives whether a new countdown starts after cooldown
    pub ready: bool,
    pub did_cash_out: bool,
    /// Multiplier locked in at cash-out, zero otherwise
    pub cash_out_multiplier: f64,
    pub auto_cashout: Option<f64>,
}

impl Player {
    pub fn new(id: ConnectionId, username: String, balance: u64) -> Self {
        Self {
            id,
            username,
            balance,
            bet: 0,
            in_round: false,
            ready: false,
            did_cash_out: false,
            cash_out_multiplier: 0.0,
            auto_cashout: None,
        }
    }

    /// True while the player can still cash out of a running round
    pub fn is_exposed(&self) -> bool {
        self.in_round && !self.did_cash_out
    }

    fn cash_out(&mut self, multiplier: f64) -> CashOut {
        let winnings = payout(self.bet, multiplier);
        self.did_cash_out = true;
        self.cash_out_multiplier = multiplier;
        self.balance += winnings;

        CashOut {
            id: self.id,
            username: self.username.clone(),
            bet: self.bet,
            multiplier,
            winnings,
            balance: self.balance,
        }
    }

    /// Result line for the round history; profit mirrors the balance movement
    pub fn outcome(&self) -> PlayerOutcome {
        let profit = if self.did_cash_out {
            payout(self.bet, self.cash_out_multiplier) as i64 - self.bet as i64
        } else {
            -(self.bet as i64)
        };

        PlayerOutcome {
            username: self.username.clone(),
            bet: self.bet,
            did_cash_out: self.did_cash_out,
            cash_out_multiplier: self.cash_out_multiplier,
            profit,
        }
    }

    pub fn summary(&self) -> PlayerSummary {
        PlayerSummary {
            id: self.id,
            username: self.username.clone(),
            bet: self.bet,
            did_cash_out: self.did_cash_out,
        }
    }

    pub fn active(&self) -> ActivePlayer {
        ActivePlayer {
            id: self.id,
            username: self.username.clone(),
            bet: self.bet,
        }
    }

    fn reset_round(&mut self) {
        self.bet = 0;
        self.in_round = false;
        self.ready = false;
        self.did_cash_out = false;
        self.cash_out_multiplier = 0.0;
    }
}

/// An accepted bet
#[derive(Debug, Clone, PartialEq)]
pub struct BetReceipt {
    pub id: ConnectionId,
    pub username: String,
    pub bet: u64,
    pub balance: u64,
}

impl BetReceipt {
    pub fn confirmation(&self) -> ServerEvent {
        ServerEvent::BetConfirmed {
            bet: self.bet,
            balance: self.balance,
        }
    }

    pub fn announcement(&self) -> ServerEvent {
        ServerEvent::PlayerBet {
            id: self.id,
            username: self.username.clone(),
            bet: self.bet,
        }
    }
}

/// A completed cash-out, manual or automatic
#[derive(Debug, Clone, PartialEq)]
pub struct CashOut {
    pub id: ConnectionId,
    pub username: String,
    pub bet: u64,
    pub multiplier: f64,
    pub winnings: u64,
    pub balance: u64,
}

impl CashOut {
    pub fn confirmation(&self) -> ServerEvent {
        ServerEvent::CashOutConfirmed {
            multiplier: self.multiplier,
            winnings: self.winnings,
            balance: self.balance,
        }
    }

    pub fn announcement(&self) -> ServerEvent {
        ServerEvent::PlayerCashedOut {
            id: self.id,
            username: self.username.clone(),
            bet: self.bet,
            multiplier: self.multiplier,
            winnings: self.winnings,
        }
    }
}

/// Players keyed by connection
///
/// Keys are assigned in connection order, so iteration (and therefore the
/// order of players in round results) is deterministic.
pub struct PlayerRegistry {
    players: BTreeMap<ConnectionId, Player>,
    starting_balance: u64,
}

impl PlayerRegistry {
    pub fn new(starting_balance: u64) -> Self {
        Self {
            players: BTreeMap::new(),
            starting_balance,
        }
    }

    /// Registers a display name for a connection
    ///
    /// The name is trimmed and must be non-empty and not used by any other
    /// registered player. A connection may register only once.
    pub fn register(&mut self, id: ConnectionId, username: &str) -> Result<&Player, GameError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(GameError::InvalidName);
        }
        if self.players.contains_key(&id) {
            return Err(GameError::AlreadyRegistered);
        }
        if self.players.values().any(|p| p.username == username) {
            return Err(GameError::DuplicateName);
        }

        info!("Player registered: {} ({})", username, id);
        let player = Player::new(id, username.to_string(), self.starting_balance);
        Ok(self.players.entry(id).or_insert(player))
    }

    pub fn find_by_connection(&self, id: ConnectionId) -> Option<&Player> {
        self.players.get(&id)
    }

    /// Places a bet for the next round
    ///
    /// Bets are open while no countdown or run is in progress. Nothing is
    /// mutated unless every check passes.
    pub fn place_bet(
        &mut self,
        id: ConnectionId,
        amount: &Value,
        phase: Phase,
    ) -> Result<BetReceipt, GameError> {
        let player = self.players.get_mut(&id).ok_or(GameError::NotRegistered)?;
        let bet = parse_bet(amount).ok_or(GameError::InvalidAmount)?;
        if bet > player.balance {
            return Err(GameError::InsufficientFunds {
                bet,
                balance: player.balance,
            });
        }
        if matches!(phase, Phase::Countdown | Phase::Running) {
            return Err(GameError::RoundNotAcceptingBets);
        }
        // One stake per round
        if player.in_round {
            return Err(GameError::AlreadyBet);
        }

        player.balance -= bet;
        player.bet = bet;
        player.in_round = true;
        player.ready = true;
        player.did_cash_out = false;
        player.cash_out_multiplier = 0.0;
        info!("Bet accepted: {} placed {}", player.username, bet);

        Ok(BetReceipt {
            id,
            username: player.username.clone(),
            bet,
            balance: player.balance,
        })
    }

    /// Cashes a player out at `multiplier`
    ///
    /// Returns None, without error, unless the round is running and the
    /// player is still exposed.
    pub fn cash_out(&mut self, id: ConnectionId, phase: Phase, multiplier: f64) -> Option<CashOut> {
        if phase != Phase::Running {
            return None;
        }
        let player = self.players.get_mut(&id)?;
        if !player.is_exposed() {
            return None;
        }

        let cash_out = player.cash_out(multiplier);
        info!(
            "Player {} cashed out at {:.2}x and won {}",
            cash_out.username, multiplier, cash_out.winnings
        );
        Some(cash_out)
    }

    /// Cashes out every exposed player whose threshold has been reached
    pub fn auto_cash_out(&mut self, multiplier: f64) -> Vec<CashOut> {
        self.players
            .values_mut()
            .filter(|p| p.is_exposed())
            .filter(|p| p.auto_cashout.map_or(false, |t| t <= multiplier))
            .map(|p| {
                let cash_out = p.cash_out(multiplier);
                info!(
                    "Auto cash-out: {} at {:.2}x won {}",
                    cash_out.username, multiplier, cash_out.winnings
                );
                cash_out
            })
            .collect()
    }

    /// Stores an auto-cash-out threshold; invalid input is ignored
    pub fn set_auto_cashout(&mut self, id: ConnectionId, raw: &Value) -> Option<f64> {
        let threshold = parse_multiplier(raw)?;
        let player = self.players.get_mut(&id)?;
        player.auto_cashout = Some(threshold);
        Some(threshold)
    }

    /// Removes a player; any stake in a live round is forfeited
    pub fn unregister(&mut self, id: ConnectionId) -> Option<Player> {
        let player = self.players.remove(&id)?;
        info!("Player left: {} ({})", player.username, id);
        Some(player)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| p.in_round)
    }

    /// Collects outcomes for everyone in the round, then clears their round fields
    pub fn settle_round(&mut self) -> Vec<PlayerOutcome> {
        let outcomes = self.participants().map(Player::outcome).collect();
        for player in self.players.values_mut().filter(|p| p.in_round) {
            player.reset_round();
        }
        outcomes
    }

    pub fn any_ready(&self) -> bool {
        self.players.values().any(|p| p.ready)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

/// Accepts positive whole amounts given as a JSON number or numeric string
fn parse_bet(value: &Value) -> Option<u64> {
    let amount = match value {
        Value::Number(n) => match n.as_u64() {
            Some(v) => v,
            None => {
                let f = n.as_f64()?;
                if f.fract() != 0.0 || f < 0.0 || f > u64::MAX as f64 {
                    return None;
                }
                f as u64
            }
        },
        Value::String(s) => s.trim().parse::<u64>().ok()?,
        _ => return None,
    };
    (amount > 0).then_some(amount)
}

/// Accepts a positive, finite multiplier given as a JSON number or numeric string
fn parse_multiplier(value: &Value) -> Option<f64> {
    let multiplier = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (multiplier.is_finite() && multiplier > 0.0).then_some(multiplier)
}
