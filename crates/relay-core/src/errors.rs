//! Error taxonomy.
//!
//! Each type is scoped to the narrowest unit it can affect: one accept
//! attempt, one connection, one per-target send, or one transformed message.
//! None of them is ever surfaced to a client; they exist for operator logs.

use std::time::Duration;

use crate::ids::ConnectionId;

/// Failure accepting or validating one inbound request.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AcceptError {
    /// The request was not a WebSocket upgrade.
    #[error("not a websocket upgrade request: {0}")]
    NotUpgrade(String),
    /// The upgrade was accepted but the handshake did not complete.
    #[error("websocket upgrade failed: {0}")]
    UpgradeFailed(String),
    /// The connection limit was reached.
    #[error("connection limit of {limit} reached")]
    AtCapacity {
        /// Configured maximum.
        limit: usize,
    },
    /// The server is shutting down and no longer admits connections.
    #[error("server is shutting down")]
    ShuttingDown,
}

impl AcceptError {
    /// Short classification string for logging/metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotUpgrade(_) => "not_upgrade",
            Self::UpgradeFailed(_) => "upgrade_failed",
            Self::AtCapacity { .. } => "at_capacity",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

/// Read/write failure on one connection. Terminal for that connection only.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Reading the next frame failed.
    #[error("read failed: {0}")]
    Read(String),
    /// Writing a frame failed.
    #[error("write failed: {0}")]
    Write(String),
    /// Writing a frame did not finish in time.
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Short classification string for logging/metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Read(_) => "read",
            Self::Write(_) => "write",
            Self::Timeout(_) => "timeout",
        }
    }
}

/// Failure handing a broadcast to one target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The target's outbound queue is full; it is not keeping up.
    #[error("outbound queue full")]
    QueueFull,
    /// The target's writer has gone away.
    #[error("connection writer disconnected")]
    Disconnected,
    /// The target is no longer `Open`.
    #[error("connection not open")]
    NotOpen,
}

impl SendError {
    /// Short classification string for logging/metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::QueueFull => "queue_full",
            Self::Disconnected => "disconnected",
            Self::NotOpen => "not_open",
        }
    }
}

/// Failure inside the message transform for one message.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    /// The transform refused the payload.
    #[error("message rejected: {0}")]
    Rejected(String),
    /// The transform panicked.
    #[error("transform panicked")]
    Panicked,
}

impl TransformError {
    /// Short classification string for logging/metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rejected(_) => "rejected",
            Self::Panicked => "panicked",
        }
    }
}

/// Registry misuse.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A connection with this id is already a member.
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),
}

/// Umbrella error for server-level operations.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Binding the listen address failed.
    #[error("failed to bind: {0}")]
    Bind(#[source] std::io::Error),
    /// Configuration was invalid.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// See [`AcceptError`].
    #[error(transparent)]
    Accept(#[from] AcceptError),
    /// See [`TransportError`].
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// See [`SendError`].
    #[error(transparent)]
    Send(#[from] SendError),
    /// See [`TransformError`].
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// See [`RegistryError`].
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl RelayError {
    /// Short classification string for logging/metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bind(_) => "bind",
            Self::Config(_) => "config",
            Self::Accept(e) => e.kind(),
            Self::Transport(e) => e.kind(),
            Self::Send(e) => e.kind(),
            Self::Transform(e) => e.kind(),
            Self::Registry(_) => "already_registered",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_error_kinds() {
        assert_eq!(AcceptError::NotUpgrade("x".into()).kind(), "not_upgrade");
        assert_eq!(AcceptError::UpgradeFailed("x".into()).kind(), "upgrade_failed");
        assert_eq!(AcceptError::AtCapacity { limit: 3 }.kind(), "at_capacity");
        assert_eq!(AcceptError::ShuttingDown.kind(), "shutting_down");
    }

    #[test]
    fn at_capacity_display_includes_limit() {
        let err = AcceptError::AtCapacity { limit: 42 };
        assert_eq!(err.to_string(), "connection limit of 42 reached");
    }

    #[test]
    fn transport_timeout_display() {
        let err = TransportError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "write timed out after 5s");
        assert_eq!(err.kind(), "timeout");
    }

    #[test]
    fn send_error_kinds() {
        assert_eq!(SendError::QueueFull.kind(), "queue_full");
        assert_eq!(SendError::Disconnected.kind(), "disconnected");
        assert_eq!(SendError::NotOpen.kind(), "not_open");
    }

    #[test]
    fn transform_error_display() {
        let err = TransformError::Rejected("too long".into());
        assert_eq!(err.to_string(), "message rejected: too long");
        assert_eq!(TransformError::Panicked.kind(), "panicked");
    }

    #[test]
    fn registry_error_mentions_id() {
        let err = RegistryError::AlreadyRegistered(ConnectionId::from_raw("conn_7"));
        assert!(err.to_string().contains("conn_7"));
    }

    #[test]
    fn relay_error_from_conversions() {
        let err: RelayError = SendError::QueueFull.into();
        assert!(matches!(err, RelayError::Send(SendError::QueueFull)));
        assert_eq!(err.kind(), "queue_full");

        let err: RelayError = TransportError::Read("eof".into()).into();
        assert_eq!(err.to_string(), "read failed: eof");
    }

    #[test]
    fn bind_error_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        let err = RelayError::Bind(io);
        assert_eq!(err.kind(), "bind");
        assert!(err.to_string().contains("in use"));
    }
}
