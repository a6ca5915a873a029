//! Shared helpers for the real-time transport.
//!
//! Runtime-agnostic: no tokio types in here, so the constants and the frame
//! parser can be reused by any connector implementation.

use fuzzboard_protocol::{events, Envelope};

// Reconnection constants (fixed delay, matches the server's reconnection window)
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3_000;

// Heartbeat constants
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 25_000;
pub const DEFAULT_MAX_MISSED_HEARTBEATS: u32 = 3;

/// WebSocket close code the server uses to ask clients to rotate connections
pub const CLOSE_CODE_GOING_AWAY: u16 = 1001;

/// Why an inbound frame was not republished
#[derive(Debug, PartialEq)]
pub enum FrameRejection {
    Malformed(String),
    ReservedEvent(String),
}

/// Decode one inbound text frame.
pub fn parse_frame(text: &str) -> Result<Envelope, FrameRejection> {
    let envelope = Envelope::decode(text).map_err(|e| FrameRejection::Malformed(e.to_string()))?;
    if events::is_local(&envelope.event) {
        return Err(FrameRejection::ReservedEvent(envelope.event));
    }
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_passes_unknown_events_through() {
        let env = parse_frame(r#"{"event":"corpus_grew","data":{"n":5}}"#).unwrap();
        assert_eq!(env.event, "corpus_grew");
    }

    #[test]
    fn test_parse_frame_rejects_local_names() {
        assert_eq!(
            parse_frame(r#"{"event":"client-ready","data":{}}"#),
            Err(FrameRejection::ReservedEvent("client-ready".into()))
        );
    }

    #[test]
    fn test_parse_frame_rejects_garbage() {
        assert!(matches!(
            parse_frame("{"),
            Err(FrameRejection::Malformed(_))
        ));
    }
}
