//! Global error types for the Livewire client.
//!
//! All error categories across the workspace are unified into a single
//! `LwError` enum with conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using LwError.
pub type LwResult<T> = Result<T, LwError>;

/// Unified error type covering all error categories in Livewire.
#[derive(Error, Debug)]
pub enum LwError {
    // -- Configuration errors --
    /// Failed to load or parse application configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Network errors --
    /// HTTP request failed.
    #[error("http error: {0}")]
    Http(String),

    /// Request or operation timed out.
    #[error("request timeout: {0}")]
    Timeout(String),

    /// Server returned an error response.
    #[error("server error (status {status}): {message}")]
    ServerError {
        /// HTTP status code.
        status: u16,
        /// Error message from server.
        message: String,
    },

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// WebSocket transport error (handshake, read, or write).
    #[error("socket error: {0}")]
    Socket(String),

    /// The socket is closed and cannot carry the request.
    #[error("socket closed")]
    SocketClosed,

    /// An asynchronous URL resolver failed to produce a target.
    #[error("url resolution failed: {0}")]
    Resolve(String),

    // -- Protocol errors --
    /// A frame or line could not be decoded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An operation needed a server-assigned session that does not exist yet.
    #[error("no active session")]
    NoSession,

    // -- File/IO errors --
    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LwError {
    /// Whether the error is a transient connectivity failure worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::Socket(_) | Self::SocketClosed => true,
            Self::ServerError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for LwError {
    fn from(e: serde_json::Error) -> Self {
        LwError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for LwError {
    fn from(e: toml::de::Error) -> Self {
        LwError::Config(e.to_string())
    }
}
