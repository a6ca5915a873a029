//! Event bus and connection-lifecycle types.
//!
//! - `EventBus`: in-process publish/subscribe keyed by event name
//! - `ConnectionHandle` / `ConnectionStateObserver`: read-side views of the connection
//!
//! The transport (in the websocket module) is the only writer of either.

pub mod connection;
pub mod event_bus;

pub use connection::{ConnectionHandle, ConnectionState, ConnectionStateObserver};
pub use event_bus::{listener, EventBus, Listener};
