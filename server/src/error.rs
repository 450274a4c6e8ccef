//! Rejections surfaced to the client that triggered them

use thiserror::Error;

/// Broad class of a rejection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    StateConflict,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("Invalid username")]
    InvalidName,

    #[error("Username is already taken")]
    DuplicateName,

    #[error("Connection is already registered")]
    AlreadyRegistered,

    #[error("Player is not registered")]
    NotRegistered,

    #[error("Invalid bet amount")]
    InvalidAmount,

    #[error("Insufficient funds: bet {bet} exceeds balance {balance}")]
    InsufficientFunds { bet: u64, balance: u64 },

    #[error("Bets for the current round are closed")]
    RoundNotAcceptingBets,

    #[error("Bet already placed for the next round")]
    AlreadyBet,
}

impl GameError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::InvalidName | GameError::InvalidAmount | GameError::InsufficientFunds { .. } => {
                ErrorKind::Validation
            }
            GameError::DuplicateName
            | GameError::AlreadyRegistered
            | GameError::RoundNotAcceptingBets
            | GameError::AlreadyBet => ErrorKind::StateConflict,
            GameError::NotRegistered => ErrorKind::NotFound,
        }
    }
}
