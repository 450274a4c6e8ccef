//! The single pending phase timer

use crate::game::TimerKind;
use std::future;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Holds at most one armed timer. Arming replaces whatever was pending, so
/// two phase loops can never run side by side.
#[derive(Debug, Default)]
pub struct Scheduler {
    pending: Option<(TimerKind, Instant)>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self { pending: None }
    }

    pub fn arm(&mut self, timer: TimerKind, delay: Duration) {
        self.pending = Some((timer, Instant::now() + delay));
    }

    pub fn pending(&self) -> Option<TimerKind> {
        self.pending.map(|(timer, _)| timer)
    }

    /// Resolves when the armed timer is due, disarming it.
    ///
    /// Never resolves while nothing is armed. Cancel-safe: dropping the
    /// future before it resolves leaves the timer armed.
    pub async fn fired(&mut self) -> TimerKind {
        let (timer, deadline) = match self.pending {
            Some(pending) => pending,
            None => future::pending().await,
        };
        sleep_until(deadline).await;
        self.pending = None;
        timer
    }
}
