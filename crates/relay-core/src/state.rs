//! Connection lifecycle state.

use std::fmt;

/// Lifecycle of a single connection.
///
/// `Open` is initial, `Closed` is terminal. A connection may skip `Closing`
/// when the transport fails outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Reading frames and accepting broadcasts.
    Open,
    /// A close was requested; the close handshake is in progress.
    Closing,
    /// Transport released. Terminal.
    Closed,
}

impl ConnectionState {
    /// Compact encoding for atomic storage.
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Open => 0,
            Self::Closing => 1,
            Self::Closed => 2,
        }
    }

    /// Decode from [`as_u8`](Self::as_u8). Unknown values decode as `Closed`.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// Whether `self → next` is a legal lifecycle transition.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::Closing) | (Self::Open, Self::Closed) | (Self::Closing, Self::Closed)
        )
    }

    /// Short lowercase name for logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
