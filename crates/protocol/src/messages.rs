//! Control messages the client sends to the server.
//!
//! The server only understands four control events. Everything else the client
//! sends goes through the free-form `send(event, payload)` path.

use serde_json::{json, Value};

use crate::envelope::Envelope;
use crate::events;
use crate::ids::TaskId;

/// Messages from the dashboard client to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// Join the per-task update channel
    SubscribeTask { task_id: TaskId },
    /// Leave the per-task update channel
    UnsubscribeTask { task_id: TaskId },
    /// Join the aggregate dashboard channel
    SubscribeDashboard,
    /// Heartbeat probe
    Ping,
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::SubscribeTask { .. } => events::SUBSCRIBE_TASK,
            ClientEvent::UnsubscribeTask { .. } => events::UNSUBSCRIBE_TASK,
            ClientEvent::SubscribeDashboard => events::SUBSCRIBE_DASHBOARD,
            ClientEvent::Ping => events::PING,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            ClientEvent::SubscribeTask { task_id } | ClientEvent::UnsubscribeTask { task_id } => {
                json!({ "task_id": task_id })
            }
            ClientEvent::SubscribeDashboard | ClientEvent::Ping => json!({}),
        }
    }

    pub fn to_envelope(&self) -> Envelope {
        Envelope::new(self.name(), self.payload())
    }
}
