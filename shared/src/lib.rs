use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const STARTING_BALANCE: u64 = 1000;
pub const COUNTDOWN_SECONDS: u32 = 5;
pub const RECENT_GAMES_LEN: usize = 10;
pub const GAME_HISTORY_LEN: usize = 50;
pub const MIN_CRASH_POINT: f64 = 1.0;
pub const MAX_CRASH_POINT: f64 = 15.0;

/// Server-assigned identity of one WebSocket connection
pub type ConnectionId = u64;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Countdown,
    Running,
    Crashed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Countdown => "countdown",
            Phase::Running => "running",
            Phase::Crashed => "crashed",
        }
    }
}

/// Events sent by clients. Framed as `{"event": "...", "data": {...}}`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    RegisterPlayer { username: String },
    // Loosely typed: numeric strings are accepted like numbers.
    PlaceBet { bet: Value },
    CashOut,
    SetAutoCashout { multiplier: Value },
    ChatMessage { message: String },
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Events sent by the server, either to one connection or to everyone.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    InitState(Snapshot),
    Response {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    PlayerRegistered {
        id: ConnectionId,
        username: String,
        balance: u64,
    },
    BetConfirmed {
        bet: u64,
        balance: u64,
    },
    PlayerBet {
        id: ConnectionId,
        username: String,
        bet: u64,
    },
    CashOutConfirmed {
        multiplier: f64,
        winnings: u64,
        balance: u64,
    },
    PlayerCashedOut {
        id: ConnectionId,
        username: String,
        bet: u64,
        multiplier: f64,
        winnings: u64,
    },
    AutoCashoutSet {
        multiplier: f64,
    },
    CountdownStart {
        time_left: u32,
    },
    CountdownUpdate {
        time_left: u32,
    },
    GameStart {
        active_players: Vec<ActivePlayer>,
    },
    MultiplierUpdate {
        multiplier: f64,
    },
    GameCrash {
        crash_point: String,
        game_result: GameResult,
    },
    ChatMessage {
        username: String,
        message: String,
        timestamp: u64,
    },
    PlayerDisconnected {
        id: ConnectionId,
        username: String,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn success() -> Self {
        ServerEvent::Response {
            success: true,
            error: None,
        }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        ServerEvent::Response {
            success: false,
            error: Some(reason.into()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::InitState(_) => "init_state",
            ServerEvent::Response { .. } => "response",
            ServerEvent::PlayerRegistered { .. } => "player_registered",
            ServerEvent::BetConfirmed { .. } => "bet_confirmed",
            ServerEvent::PlayerBet { .. } => "player_bet",
            ServerEvent::CashOutConfirmed { .. } => "cash_out_confirmed",
            ServerEvent::PlayerCashedOut { .. } => "player_cashed_out",
            ServerEvent::AutoCashoutSet { .. } => "auto_cashout_set",
            ServerEvent::CountdownStart { .. } => "countdown_start",
            ServerEvent::CountdownUpdate { .. } => "countdown_update",
            ServerEvent::GameStart { .. } => "game_start",
            ServerEvent::MultiplierUpdate { .. } => "multiplier_update",
            ServerEvent::GameCrash { .. } => "game_crash",
            ServerEvent::ChatMessage { .. } => "chat_message",
            ServerEvent::PlayerDisconnected { .. } => "player_disconnected",
            ServerEvent::Error { .. } => "error",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Full view of the table sent to a client right after it connects
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub is_active: bool,
    pub phase: Phase,
    pub current_multiplier: f64,
    pub countdown_active: bool,
    pub time_to_start: u32,
    pub recent_games: Vec<String>,
    pub players: Vec<PlayerSummary>,
    pub game_history: Vec<GameResult>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSummary {
    pub id: ConnectionId,
    pub username: String,
    pub bet: u64,
    pub did_cash_out: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ActivePlayer {
    pub id: ConnectionId,
    pub username: String,
    pub bet: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct GameResult {
    pub multiplier: f64,
    pub timestamp: f64,
    pub players: Vec<PlayerOutcome>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerOutcome {
    pub username: String,
    pub bet: u64,
    pub did_cash_out: bool,
    pub cash_out_multiplier: f64,
    pub profit: i64,
}

/// Rounds a multiplier to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn format_multiplier(value: f64) -> String {
    format!("{:.2}", value)
}

/// Payout for a cash-out: the stake times the multiplier, floored.
///
/// Multipliers carry two decimals, so the product is taken in hundredths
/// to keep `100 * 2.3` from flooring to 229.
pub fn payout(bet: u64, multiplier: f64) -> u64 {
    let hundredths = (multiplier * 100.0).round().max(0.0) as u64;
    bet.saturating_mul(hundredths) / 100
}
