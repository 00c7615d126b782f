//! Time utilities for the simulation clock

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Process start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize process start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 60; // one tick per rendered frame
pub const SYNC_TPS: u32 = 30; // game_state broadcasts per second
pub const INPUT_SEND_TPS: u32 = 20; // client player_input sends per second

/// Delta time of one simulation tick (in seconds)
pub fn tick_delta() -> f32 {
    1.0 / SIMULATION_TPS as f32
}

/// Duration of one simulation tick
pub fn tick_duration() -> Duration {
    Duration::from_micros(1_000_000 / SIMULATION_TPS as u64)
}

/// Convert a duration in seconds to a whole number of ticks (rounded up, at least 1)
pub fn secs_to_ticks(secs: f32) -> u64 {
    ((secs * SIMULATION_TPS as f32).ceil() as u64).max(1)
}

/// Convert a tick count back to seconds
pub fn ticks_to_secs(ticks: u64) -> f32 {
    ticks as f32 / SIMULATION_TPS as f32
}

/// Number of simulation ticks between two sends at `rate` per second.
/// A rate of 0 is unthrottled: send every tick.
pub fn ticks_per_send(rate: u32) -> u32 {
    match rate {
        0 => 1,
        rate => (SIMULATION_TPS / rate).max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_to_ticks_rounds_up() {
        assert_eq!(secs_to_ticks(1.0), 60);
        assert_eq!(secs_to_ticks(0.5), 30);
        assert_eq!(secs_to_ticks(0.001), 1);
        assert_eq!(secs_to_ticks(0.0), 1);
    }

    #[test]
    fn test_send_intervals() {
        assert_eq!(ticks_per_send(SYNC_TPS), 2);
        assert_eq!(ticks_per_send(INPUT_SEND_TPS), 3);
        assert_eq!(ticks_per_send(0), 1);
        assert_eq!(ticks_per_send(240), 1);
        assert!((ticks_to_secs(90) - 1.5).abs() < 1e-6);
    }
}
