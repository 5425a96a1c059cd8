//! Connection states and the events delivered to each subscriber.

use lw_core::constants::{CLOSE_ABNORMAL, CLOSE_NORMAL};

/// Lifecycle state of a socket as seen by its consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been attempted yet.
    Uninstantiated,
    /// Resolving the target or performing the handshake.
    Connecting,
    /// Connected; sends go straight to the wire.
    Open,
    /// A close was requested and is in progress.
    Closing,
    /// Not connected. A reconnect may be scheduled.
    Closed,
}

impl ConnectionState {
    /// Whether sends are written immediately in this state.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uninstantiated => write!(f, "uninstantiated"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Close code and reason of a finished connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// WebSocket close code.
    pub code: u16,
    /// Human-readable reason.
    pub reason: String,
}

impl CloseInfo {
    /// A normal closure (code 1000).
    pub fn normal(reason: impl Into<String>) -> Self {
        Self { code: CLOSE_NORMAL, reason: reason.into() }
    }

    /// An abnormal closure (code 1006), used for transport failures.
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self { code: CLOSE_ABNORMAL, reason: reason.into() }
    }

    /// Whether this close used the normal closure code.
    pub fn is_normal(&self) -> bool {
        self.code == CLOSE_NORMAL
    }
}

/// An event delivered to one subscriber of a socket, in FIFO order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// The socket moved to a new state. Sent once on attach with the current
    /// state, then on every transition.
    State(ConnectionState),
    /// A text frame (binary frames are decoded lossily as UTF-8).
    Message(String),
    /// A transport or resolution error. The socket may still reconnect.
    Error(String),
    /// The connection closed.
    Closed(CloseInfo),
    /// Reconnect attempts were exhausted. Sent once; no further attempts are
    /// made until the socket is explicitly reconnected.
    ReconnectStopped {
        /// Number of attempts that were made.
        attempts: u32,
    },
}
