//! `/health` endpoint.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// `"ok"` while accepting, `"draining"` otherwise.
    pub status: String,
    /// Seconds since the server was created.
    pub uptime_secs: u64,
    /// Registered connections.
    pub connections: usize,
    /// Whether new WebSocket connections are admitted.
    pub accepting: bool,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, connections: usize, accepting: bool) -> HealthResponse {
    HealthResponse {
        status: if accepting { "ok" } else { "draining" }.into(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections,
        accepting,
    }
}
