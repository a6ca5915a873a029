//! Fuzzboard Protocol - wire vocabulary shared by the fuzzing server and its dashboard client
//!
//! This crate contains the types that cross the WebSocket boundary:
//! - The `{event, data}` envelope every frame is wrapped in
//! - Event-name constants (wire and local-bus)
//! - Outbound control messages (`ClientEvent`)
//! - Typed views over inbound payloads
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde and serde_json
//! 2. **No business logic** - Pure data types and serialization
//! 3. **Forward compatible** - Unknown events and fields must survive decoding

pub mod envelope;
pub mod events;
pub mod ids;
pub mod messages;
pub mod types;

pub use envelope::Envelope;
pub use ids::TaskId;
pub use messages::ClientEvent;
pub use types::{
    DashboardStats, DashboardUpdate, Pong, ServerError, TaskList, TaskRecord, TaskStatus, TaskUpdate,
};
