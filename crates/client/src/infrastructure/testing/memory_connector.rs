//! In-memory connector: the server side of each link is handed to the test.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, watch};

use fuzzboard_protocol::Envelope;

use crate::error::TransportError;
use crate::infrastructure::websocket::{CloseReason, Connector, Link, LinkEvent, Outbound};

#[derive(Default)]
struct Refusals {
    next: u32,
    all: bool,
}

/// Connector whose links end in a [`ServerEnd`] owned by the test.
pub struct MemoryConnector {
    attempts: AtomicU32,
    refusals: Mutex<Refusals>,
    held: watch::Sender<bool>,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

impl MemoryConnector {
    pub fn new() -> (Arc<Self>, MemoryServer) {
        let (accepted, incoming) = mpsc::unbounded_channel();
        let (held, _) = watch::channel(false);
        let connector = Arc::new(Self {
            attempts: AtomicU32::new(0),
            refusals: Mutex::new(Refusals::default()),
            held,
            accepted,
        });
        (connector, MemoryServer { incoming })
    }

    /// Number of `open` calls so far, refused ones included.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Refuse the next `count` opens.
    pub fn refuse_next(&self, count: u32) {
        self.refusals.lock().unwrap_or_else(|p| p.into_inner()).next = count;
    }

    /// Refuse every open until `accept_all` is called.
    pub fn refuse_all(&self) {
        self.refusals.lock().unwrap_or_else(|p| p.into_inner()).all = true;
    }

    pub fn accept_all(&self) {
        let mut refusals = self.refusals.lock().unwrap_or_else(|p| p.into_inner());
        refusals.all = false;
        refusals.next = 0;
    }

    /// Park every `open` call until [`release_opens`](Self::release_opens).
    pub fn hold_opens(&self) {
        self.held.send_replace(true);
    }

    pub fn release_opens(&self) {
        self.held.send_replace(false);
    }

    fn should_refuse(&self) -> bool {
        let mut refusals = self.refusals.lock().unwrap_or_else(|p| p.into_inner());
        if refusals.all {
            return true;
        }
        if refusals.next > 0 {
            refusals.next -= 1;
            return true;
        }
        false
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, endpoint: &str) -> Result<Link, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let mut held = self.held.subscribe();
        let _ = held.wait_for(|held| !*held).await;

        if self.should_refuse() {
            return Err(TransportError::Refused(format!("{endpoint} refused")));
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        self.accepted
            .send(ServerEnd {
                from_client,
                to_client,
            })
            .map_err(|_| TransportError::Refused("memory server dropped".to_string()))?;

        Ok(Link { outbound, inbound })
    }
}

/// Accepts the server ends of opened links.
pub struct MemoryServer {
    incoming: mpsc::UnboundedReceiver<ServerEnd>,
}

impl MemoryServer {
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.incoming.recv().await
    }

    pub fn try_accept(&mut self) -> Option<ServerEnd> {
        self.incoming.try_recv().ok()
    }
}

/// Server side of one in-memory link.
pub struct ServerEnd {
    from_client: mpsc::UnboundedReceiver<Outbound>,
    to_client: mpsc::UnboundedSender<LinkEvent>,
}

impl ServerEnd {
    /// Push an event to the client.
    pub fn push(&self, event: &str, data: Value) {
        match Envelope::new(event, data).encode() {
            Ok(text) => self.push_raw(text),
            Err(e) => tracing::error!(event, "Test envelope did not encode: {}", e),
        }
    }

    /// Push an arbitrary text frame.
    pub fn push_raw(&self, text: impl Into<String>) {
        let _ = self.to_client.send(LinkEvent::Frame(text.into()));
    }

    pub fn close(&self, reason: CloseReason) {
        let _ = self.to_client.send(LinkEvent::Closed(reason));
    }

    /// Close with the rotate-connections code.
    pub fn go_away(&self) {
        self.close(CloseReason::GoingAway);
    }

    /// Next envelope from the client; `None` once the client closed the link.
    pub async fn next_envelope(&mut self) -> Option<Envelope> {
        match self.from_client.recv().await? {
            Outbound::Text(text) => Envelope::decode(&text).ok(),
            Outbound::Close => None,
        }
    }

    /// Envelopes already written by the client, in order.
    pub fn drain_envelopes(&mut self) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(Outbound::Text(text)) = self.from_client.try_recv() {
            if let Ok(envelope) = Envelope::decode(&text) {
                out.push(envelope);
            }
        }
        out
    }

    /// True when the client sent a close or dropped its writer.
    pub fn client_closed(&mut self) -> bool {
        loop {
            match self.from_client.try_recv() {
                Ok(Outbound::Close) => return true,
                Ok(Outbound::Text(_)) => continue,
                Err(mpsc::error::TryRecvError::Empty) => return false,
                Err(mpsc::error::TryRecvError::Disconnected) => return true,
            }
        }
    }
}
