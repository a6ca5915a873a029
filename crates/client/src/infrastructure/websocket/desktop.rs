//! WebSocket connector using tokio-tungstenite

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::error::TransportError;

use super::link::{CloseReason, Connector, Link, LinkEvent, Outbound};

/// Opens real WebSocket connections.
///
/// Each link gets a reader and a writer task. The reader turns socket frames
/// into [`LinkEvent`]s and always finishes with exactly one `Closed`; the writer
/// drains the outbound channel and sends a close frame on `Outbound::Close`
/// or when every sender is gone.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn open(&self, endpoint: &str) -> Result<Link, TransportError> {
        let (ws_stream, _response) = connect_async(endpoint).await.map_err(|e| {
            use tokio_tungstenite::tungstenite::Error as WsError;
            match e {
                WsError::Io(io) => TransportError::Refused(io.to_string()),
                other => TransportError::Handshake(other.to_string()),
            }
        })?;
        tracing::info!("Connected to {}", endpoint);

        let (mut write, mut read) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<LinkEvent>();

        tokio::spawn(async move {
            let reason = loop {
                match read.next().await {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx.send(LinkEvent::Frame(text.to_string())).is_err() {
                            // Nobody is listening any more.
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => {
                            if in_tx.send(LinkEvent::Frame(text)).is_err() {
                                return;
                            }
                        }
                        Err(e) => tracing::warn!("Dropping non-UTF-8 binary frame: {}", e),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        let (code, text) = frame
                            .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                            .unwrap_or((None, String::new()));
                        tracing::info!(?code, reason = %text, "Server closed connection");
                        break CloseReason::from_close_code(code, text);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break CloseReason::Error(e.to_string());
                    }
                    None => {
                        break CloseReason::Remote {
                            code: None,
                            reason: "stream ended".to_string(),
                        }
                    }
                }
            };
            let _ = in_tx.send(LinkEvent::Closed(reason));
        });

        tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                match outbound {
                    Outbound::Text(text) => {
                        if let Err(e) = write.send(Message::Text(text.into())).await {
                            tracing::error!("Failed to send message: {}", e);
                            return;
                        }
                    }
                    Outbound::Close => break,
                }
            }
            if let Err(e) = write.send(Message::Close(None)).await {
                tracing::debug!("Close frame not sent: {}", e);
            }
            let _ = write.close().await;
        });

        Ok(Link {
            outbound: out_tx,
            inbound: in_rx,
        })
    }
}
