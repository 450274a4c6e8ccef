//! Bounded logs of finished rounds, newest first

use shared::{format_multiplier, GameResult, GAME_HISTORY_LEN, RECENT_GAMES_LEN};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct GameHistory {
    recent_games: VecDeque<String>,
    results: VecDeque<GameResult>,
    recent_capacity: usize,
    results_capacity: usize,
}

impl GameHistory {
    pub fn new() -> Self {
        Self::with_capacity(RECENT_GAMES_LEN, GAME_HISTORY_LEN)
    }

    pub fn with_capacity(recent_capacity: usize, results_capacity: usize) -> Self {
        Self {
            recent_games: VecDeque::with_capacity(recent_capacity + 1),
            results: VecDeque::with_capacity(results_capacity + 1),
            recent_capacity,
            results_capacity,
        }
    }

    /// Records a finished round in both logs, evicting the oldest entries past capacity
    pub fn record(&mut self, result: GameResult) {
        self.recent_games
            .push_front(format_multiplier(result.multiplier));
        self.recent_games.truncate(self.recent_capacity);

        self.results.push_front(result);
        self.results.truncate(self.results_capacity);
    }

    /// Crash points of the latest rounds as two-decimal strings
    pub fn recent_games(&self) -> Vec<String> {
        self.recent_games.iter().cloned().collect()
    }

    pub fn results(&self) -> Vec<GameResult> {
        self.results.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&GameResult> {
        self.results.front()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

impl Default for GameHistory {
    fn default() -> Self {
        Self::new()
    }
}
