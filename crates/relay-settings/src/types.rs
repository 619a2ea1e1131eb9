//! Settings schema.

use serde::{Deserialize, Serialize};

/// Root settings document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// Listener and connection settings.
    pub server: ServerSettings,
    /// Log output settings.
    pub logging: LoggingSettings,
}

/// Listener and connection settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address/URI: `host:port`, `http://host:port/path` or `ws://host:port/path`.
    pub bind: String,
    /// Capacity of each connection's outbound queue.
    pub send_queue_capacity: usize,
    /// Upper bound on writing one frame to one peer, in milliseconds.
    pub send_timeout_ms: u64,
    /// Maximum simultaneous connections.
    pub max_connections: usize,
    /// Maximum inbound frame size in bytes.
    pub max_message_bytes: usize,
    /// How long shutdown waits for connections to close, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "http://localhost:8080/".into(),
            send_queue_capacity: 256,
            send_timeout_ms: 5_000,
            max_connections: 1_024,
            max_message_bytes: 1024 * 1024,
            shutdown_timeout_ms: 5_000,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter (overridden by `RUST_LOG`).
    pub level: String,
    /// `pretty` or `json`.
    pub format: String,
    /// Number of warn+ events retained in memory.
    pub capture_capacity: usize,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
            capture_capacity: 256,
        }
    }
}
