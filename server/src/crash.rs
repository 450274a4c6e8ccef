//! Crash point generation and multiplier growth

use rand::Rng;
use shared::{round2, MAX_CRASH_POINT, MIN_CRASH_POINT};

const CRASH_SKEW: f64 = 0.65;
const MIN_STEP: f64 = 0.01;
const STEP_SPREAD: f64 = 0.05;

/// Draws the multiplier at which a round ends, in `[1, 15)`
pub fn generate_crash_point<R: Rng>(rng: &mut R) -> f64 {
    let draw: f64 = rng.gen();
    let point = MIN_CRASH_POINT + draw.powf(CRASH_SKEW) * (MAX_CRASH_POINT - MIN_CRASH_POINT);
    // Open upper bound; powf can round a draw just under 1 up to 1.
    point.min(MAX_CRASH_POINT - 1e-9)
}

/// Advances the multiplier by one tick: a step in `[0.01, 0.06)`, rounded to cents
pub fn next_multiplier<R: Rng>(current: f64, rng: &mut R) -> f64 {
    let draw: f64 = rng.gen();
    let next = round2(current + draw * STEP_SPREAD + MIN_STEP);
    // Rounding can never undo a full cent, but keep the sequence strictly increasing.
    if next <= current {
        round2(current + MIN_STEP)
    } else {
        next
    }
}
