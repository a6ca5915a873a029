//! Error types for the real-time client.
//!
//! Expected network flakiness never surfaces as a panic: transport failures are
//! either bus events or values of these enums. Only malformed arguments
//! (`InvalidEndpoint`) indicate a programmer error.

use thiserror::Error;

/// Failure opening or using the physical link.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    Refused(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("link closed")]
    Closed,
}

/// Errors returned across the `RealtimeClient` facade.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Send attempted outside the Connected state. The payload was dropped.
    #[error("not connected; `{event}` was not sent")]
    NotConnected { event: String },

    /// A single connection attempt failed; the reconnection policy decides what happens next.
    #[error("connect failed: {0}")]
    ConnectFailed(#[from] TransportError),

    /// The reconnection policy gave up. Only an explicit `connect()` starts over.
    #[error("gave up after {attempts} connection attempts")]
    ReconnectExhausted { attempts: u32 },

    /// `disconnect()` was called before the pending connect finished.
    #[error("connect cancelled by disconnect")]
    Cancelled,

    #[error("invalid endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("failed to encode `{event}`: {reason}")]
    Encode { event: String, reason: String },
}

impl ClientError {
    pub fn is_not_connected(&self) -> bool {
        matches!(self, ClientError::NotConnected { .. })
    }
}
