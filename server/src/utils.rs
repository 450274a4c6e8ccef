use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn since_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
}

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    since_epoch().as_millis().min(u64::MAX as u128) as u64
}

// Unix time in fractional seconds, as recorded on round results
pub fn unix_seconds() -> f64 {
    since_epoch().as_secs_f64()
}
