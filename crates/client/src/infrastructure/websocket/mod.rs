//! Real-time transport over WebSocket.
//!
//! - `core`: reconnection policy (no runtime types)
//! - `shared`: constants and the inbound frame parser
//! - `link`: the connector seam the transport drives
//! - `desktop`: tokio-tungstenite connector
//! - `transport`: the connection state machine
//! - `subscriptions` / `heartbeat`: channel membership and liveness probes

pub mod core;
pub mod desktop;
pub mod heartbeat;
pub mod link;
pub mod shared;
pub mod subscriptions;
pub mod transport;

pub use self::core::{ReconnectPolicy, RetryDecision};
pub use desktop::WsConnector;
pub use heartbeat::{Heartbeat, PingOutcome, Probe};
pub use link::{CloseReason, Connector, Link, LinkEvent, Outbound, SessionSender};
pub use subscriptions::{SubscribeOutcome, Subscription, SubscriptionManager};
pub use transport::Transport;
