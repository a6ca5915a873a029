//! Event names used on the wire and on the client's local bus.
//!
//! Wire events travel inside an [`Envelope`](crate::Envelope). Local events are
//! published by the client itself and never leave the process.

// =============================================================================
// Client -> Server
// =============================================================================

pub const SUBSCRIBE_TASK: &str = "subscribe_task";
pub const UNSUBSCRIBE_TASK: &str = "unsubscribe_task";
pub const SUBSCRIBE_DASHBOARD: &str = "subscribe_dashboard";
pub const PING: &str = "ping";

// =============================================================================
// Server -> Client
// =============================================================================

/// Greeting the server sends right after the socket opens
pub const CONNECTED: &str = "connected";
pub const PONG: &str = "pong";
pub const TASK_UPDATE: &str = "task_update";
pub const DASHBOARD_UPDATE: &str = "dashboard_update";
pub const ERROR: &str = "error";

// =============================================================================
// Local bus only
// =============================================================================

pub const CLIENT_READY: &str = "client-ready";
pub const SOCKET_DISCONNECTED: &str = "socket:disconnected";
pub const CONNECTION_EXHAUSTED: &str = "connection:exhausted";
pub const CONNECTION_UNRESPONSIVE: &str = "connection:unresponsive";
pub const CLIENT_WARNING: &str = "client:warning";

/// Returns true for names the client publishes itself.
///
/// The server must never be able to forge these, so inbound envelopes carrying
/// them are dropped by the transport.
pub fn is_local(event: &str) -> bool {
    matches!(
        event,
        CLIENT_READY
            | SOCKET_DISCONNECTED
            | CONNECTION_EXHAUSTED
            | CONNECTION_UNRESPONSIVE
            | CLIENT_WARNING
    )
}
