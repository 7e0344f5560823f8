//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// WebSocket sessions currently running.
    pub active_connections: usize,
    /// WebSocket sessions started since the server came up.
    pub total_connections: u64,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, active: usize, total: u64) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        active_connections: active,
        total_connections: total,
    }
}
