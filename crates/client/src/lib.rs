//! Fuzzboard client - real-time and REST client for the fuzzing platform.
//!
//! Layout follows the ports-and-adapters split:
//! - `infrastructure`: event bus, WebSocket transport, REST adapter
//! - `ports`: traits at the outbound seams
//! - `application`: use cases over ports and state
//! - `state`: task store and dashboard snapshot
//! - `client`: the `RealtimeClient` facade
//! - `app`: composition root

pub mod app;
pub mod application;
pub mod client;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod ports;
pub mod state;

pub use app::App;
pub use client::RealtimeClient;
pub use config::{ClientConfig, ConnectOptions, HeartbeatConfig, ReconnectConfig};
pub use error::{ClientError, TransportError};
pub use infrastructure::messaging::{
    listener, ConnectionHandle, ConnectionState, ConnectionStateObserver, EventBus, Listener,
};
pub use infrastructure::websocket::{SubscribeOutcome, Subscription};
