//! Round timings and table constants

use shared::{COUNTDOWN_SECONDS, STARTING_BALANCE};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GameConfig {
    /// Whole seconds announced when a countdown begins
    pub countdown_secs: u32,
    /// Wall-clock length of one countdown second
    pub countdown_tick: Duration,
    /// Interval between multiplier steps while a round runs
    pub multiplier_tick: Duration,
    /// Pause after a crash before the next round may begin
    pub cooldown: Duration,
    pub starting_balance: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            countdown_secs: COUNTDOWN_SECONDS,
            countdown_tick: Duration::from_secs(1),
            multiplier_tick: Duration::from_millis(100),
            cooldown: Duration::from_secs(3),
            starting_balance: STARTING_BALANCE,
        }
    }
}
