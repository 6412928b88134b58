//! Time utilities and simulation rates

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Bot controller period
pub const BOT_TICK_MS: u64 = 100;
/// Round timer period
pub const ROUND_TICK_MS: u64 = 1_000;
/// Delay before a dead bot comes back
pub const BOT_RESPAWN_MS: u64 = 3_000;
/// How long a bot stays in its attack animation
pub const BOT_ATTACK_RECOVERY_MS: u64 = 400;

/// Bot tick delta in seconds for a given period
pub fn tick_delta(period: Duration) -> f32 {
    period.as_secs_f32()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_delta_matches_bot_period() {
        let dt = tick_delta(Duration::from_millis(BOT_TICK_MS));
        assert!((dt - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_uptime_after_init() {
        init_server_time();
        assert!(uptime_secs() < 5);
    }
}
