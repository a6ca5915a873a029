//! The seam between the transport state machine and a physical socket.
//!
//! A [`Connector`] opens a [`Link`]: a pair of channels carrying text frames
//! each way plus a terminal close notification. The tokio-tungstenite connector
//! bridges a real socket onto these channels; tests use an in-memory one.

use async_trait::async_trait;
use tokio::sync::mpsc;

use fuzzboard_protocol::{ClientEvent, Envelope};

use crate::error::{ClientError, TransportError};

use super::shared::CLOSE_CODE_GOING_AWAY;

/// Frames the client writes
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    /// Close the socket from our side
    Close,
}

/// Why a link ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The server asked the client to rotate connections
    GoingAway,
    /// The peer closed with some other code (or none)
    Remote { code: Option<u16>, reason: String },
    /// Transport error
    Error(String),
    /// The application called `disconnect()`
    Local,
}

impl CloseReason {
    pub fn from_close_code(code: Option<u16>, reason: impl Into<String>) -> Self {
        match code {
            Some(CLOSE_CODE_GOING_AWAY) => CloseReason::GoingAway,
            code => CloseReason::Remote {
                code,
                reason: reason.into(),
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CloseReason::GoingAway => "server going away",
            CloseReason::Remote { .. } => "closed by server",
            CloseReason::Error(_) => "transport error",
            CloseReason::Local => "client disconnect",
        }
    }
}

/// What the socket reader reports
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Frame(String),
    Closed(CloseReason),
}

/// An open physical connection, as channels.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub inbound: mpsc::UnboundedReceiver<LinkEvent>,
}

/// Opens physical connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, endpoint: &str) -> Result<Link, TransportError>;
}

/// Write side of the current connection epoch.
#[derive(Clone)]
pub struct SessionSender {
    epoch: u64,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SessionSender {
    pub fn new(epoch: u64, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn send_envelope(&self, envelope: &Envelope) -> Result<(), ClientError> {
        let text = envelope.encode().map_err(|e| ClientError::Encode {
            event: envelope.event.clone(),
            reason: e.to_string(),
        })?;
        self.tx
            .send(Outbound::Text(text))
            .map_err(|_| ClientError::NotConnected {
                event: envelope.event.clone(),
            })
    }

    pub fn send_event(&self, event: &ClientEvent) -> Result<(), ClientError> {
        self.send_envelope(&event.to_envelope())
    }

    pub(crate) fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_mapping() {
        assert_eq!(
            CloseReason::from_close_code(Some(1001), "restart"),
            CloseReason::GoingAway
        );
        assert_eq!(
            CloseReason::from_close_code(Some(1011), "boom"),
            CloseReason::Remote {
                code: Some(1011),
                reason: "boom".into()
            }
        );
    }

    #[test]
    fn test_session_sender_reports_closed_channel_as_not_connected() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = SessionSender::new(1, tx);
        drop(rx);

        let err = sender.send_event(&ClientEvent::Ping).unwrap_err();
        assert!(err.is_not_connected());
    }
}
