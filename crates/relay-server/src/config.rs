//! Server configuration.

use std::fmt;
use std::time::Duration;

use relay_core::RelayError;
use relay_settings::ServerSettings;
use url::Url;

/// Routes reserved for operational endpoints.
const RESERVED_PATHS: [&str; 2] = ["/health", "/metrics"];

/// Where to listen and which path serves WebSocket upgrades.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindTarget {
    /// Host name or IP literal.
    pub host: String,
    /// TCP port (`0` for auto-assign).
    pub port: u16,
    /// HTTP path of the WebSocket route.
    pub path: String,
}

impl BindTarget {
    /// Parse `host:port`, `http://host:port/path` or `ws://host:port/path`.
    ///
    /// A missing port defaults to 80; a missing path to `/`.
    pub fn parse(input: &str) -> Result<Self, RelayError> {
        let input = input.trim();
        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("ws://{input}")
        };
        let url = Url::parse(&with_scheme)
            .map_err(|e| RelayError::Config(format!("invalid bind address {input:?}: {e}")))?;

        match url.scheme() {
            "http" | "ws" => {}
            other => {
                return Err(RelayError::Config(format!(
                    "unsupported scheme {other:?} in bind address (expected http or ws)"
                )));
            }
        }

        let host = match url.host_str() {
            Some(h) if !h.is_empty() => h.trim_start_matches('[').trim_end_matches(']').to_string(),
            _ => return Err(RelayError::Config(format!("bind address {input:?} has no host"))),
        };
        let port = url.port_or_known_default().unwrap_or(80);

        let path = url.path().trim_end_matches('/');
        let path = if path.is_empty() { "/".to_string() } else { path.to_string() };
        if RESERVED_PATHS.contains(&path.as_str()) {
            return Err(RelayError::Config(format!(
                "websocket path {path} collides with a built-in endpoint"
            )));
        }

        Ok(Self { host, port, path })
    }

    /// `host:port` suitable for `TcpListener::bind`.
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for BindTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws://{}{}", self.socket_addr(), self.path)
    }
}

/// Runtime configuration for [`RelayServer`](crate::RelayServer).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address and WebSocket route.
    pub bind: BindTarget,
    /// Capacity of each connection's outbound queue.
    pub send_queue_capacity: usize,
    /// Upper bound on writing one frame to one peer.
    pub send_timeout: Duration,
    /// Maximum simultaneous connections.
    pub max_connections: usize,
    /// Maximum inbound frame size in bytes.
    pub max_message_bytes: usize,
    /// How long shutdown waits for connections to reach `Closed`.
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Loopback, auto-assigned port, WebSocket on `/`. Used by tests.
    pub fn local() -> Self {
        Self {
            bind: BindTarget {
                host: "127.0.0.1".into(),
                port: 0,
                path: "/".into(),
            },
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        let settings = ServerSettings::default();
        Self {
            bind: BindTarget {
                host: "localhost".into(),
                port: 8080,
                path: "/".into(),
            },
            send_queue_capacity: settings.send_queue_capacity,
            send_timeout: Duration::from_millis(settings.send_timeout_ms),
            max_connections: settings.max_connections,
            max_message_bytes: settings.max_message_bytes,
            shutdown_timeout: Duration::from_millis(settings.shutdown_timeout_ms),
        }
    }
}

impl TryFrom<&ServerSettings> for ServerConfig {
    type Error = RelayError;

    fn try_from(settings: &ServerSettings) -> Result<Self, Self::Error> {
        if settings.send_queue_capacity == 0 {
            return Err(RelayError::Config("sendQueueCapacity must be at least 1".into()));
        }
        if settings.max_connections == 0 {
            return Err(RelayError::Config("maxConnections must be at least 1".into()));
        }
        Ok(Self {
            bind: BindTarget::parse(&settings.bind)?,
            send_queue_capacity: settings.send_queue_capacity,
            send_timeout: Duration::from_millis(settings.send_timeout_ms.max(1)),
            max_connections: settings.max_connections,
            max_message_bytes: settings.max_message_bytes,
            shutdown_timeout: Duration::from_millis(settings.shutdown_timeout_ms),
        })
    }
}
