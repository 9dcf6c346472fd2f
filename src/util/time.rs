//! Time utilities

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Round timer resolution
pub const ROUND_TICK: Duration = Duration::from_secs(1);

/// Fixed step used by in-process combat simulations
pub const SIMULATION_TPS: u32 = 60;

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

/// Seconds per simulation step
pub fn tick_delta() -> f32 {
    1.0 / SIMULATION_TPS as f32
}
