//! Transport Connection: owns the single physical connection.
//!
//! A supervisor task runs per `connect()`: it opens links through the
//! [`Connector`], republishes inbound frames on the bus, and hands every
//! unexpected close to the [`ReconnectPolicy`]. Only this module writes the
//! connection state.
//!
//! Lock order: `supervisor` before `session`. Neither is held while the bus
//! dispatches.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use fuzzboard_protocol::{events, Envelope};

use crate::config::{ConnectOptions, ReconnectConfig};
use crate::error::ClientError;
use crate::infrastructure::messaging::{
    ConnectionHandle, ConnectionState, ConnectionStateObserver, EventBus,
};

use super::core::{ReconnectPolicy, RetryDecision};
use super::heartbeat::Heartbeat;
use super::link::{CloseReason, Connector, LinkEvent, Outbound, SessionSender};
use super::shared::{parse_frame, FrameRejection};
use super::subscriptions::SubscriptionManager;

/// Where the current supervisor run stands, as seen by `connect()` callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptOutcome {
    Pending,
    Ready(u64),
    Exhausted(u32),
    Cancelled,
}

struct Supervisor {
    generation: u64,
    cancel: CancellationToken,
    outcome: watch::Receiver<AttemptOutcome>,
}

struct Session {
    sender: SessionSender,
    cancel: CancellationToken,
}

pub struct Transport {
    connector: Arc<dyn Connector>,
    bus: EventBus,
    subscriptions: Arc<SubscriptionManager>,
    heartbeat: Arc<Heartbeat>,
    endpoint: String,
    reconnect: ReconnectConfig,
    state: watch::Sender<ConnectionState>,
    live_epoch: Arc<AtomicU64>,
    next_epoch: AtomicU64,
    next_generation: AtomicU64,
    supervisor: Mutex<Option<Supervisor>>,
    session: Mutex<Option<Session>>,
}

impl Transport {
    pub fn new(
        connector: Arc<dyn Connector>,
        bus: EventBus,
        subscriptions: Arc<SubscriptionManager>,
        heartbeat: Arc<Heartbeat>,
        endpoint: impl Into<String>,
        reconnect: ReconnectConfig,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            connector,
            bus,
            subscriptions,
            heartbeat,
            endpoint: endpoint.into(),
            reconnect,
            state,
            live_epoch: Arc::new(AtomicU64::new(0)),
            next_epoch: AtomicU64::new(0),
            next_generation: AtomicU64::new(0),
            supervisor: Mutex::new(None),
            session: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn observer(&self) -> ConnectionStateObserver {
        ConnectionStateObserver::new(self.state.subscribe())
    }

    /// Write side of the live epoch, if any.
    pub fn session(&self) -> Option<SessionSender> {
        let session = self.session.lock().unwrap_or_else(|p| p.into_inner());
        session.as_ref().map(|s| s.sender.clone())
    }

    /// Connect (or join the connect already in flight).
    ///
    /// Resolves on the first successful open. Options only apply when this call
    /// starts a new supervisor run.
    pub async fn connect(
        self: &Arc<Self>,
        endpoint: Option<&str>,
        options: &ConnectOptions,
    ) -> Result<ConnectionHandle, ClientError> {
        let endpoint = endpoint.unwrap_or(&self.endpoint).to_string();
        validate_endpoint(&endpoint)?;

        let mut outcome = {
            let mut slot = self.supervisor.lock().unwrap_or_else(|p| p.into_inner());
            match slot.as_ref() {
                Some(running) => {
                    tracing::debug!("Connect already in progress; waiting on it");
                    running.outcome.clone()
                }
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
                    let cancel = CancellationToken::new();
                    let (outcome_tx, outcome_rx) = watch::channel(AttemptOutcome::Pending);
                    *slot = Some(Supervisor {
                        generation,
                        cancel: cancel.clone(),
                        outcome: outcome_rx.clone(),
                    });

                    let transport = Arc::clone(self);
                    let config = options.apply(self.reconnect);
                    tokio::spawn(async move {
                        transport
                            .supervise(generation, endpoint, config, cancel, outcome_tx)
                            .await;
                    });
                    outcome_rx
                }
            }
        };

        let settled = match outcome
            .wait_for(|o| *o != AttemptOutcome::Pending)
            .await
            .map(|value| *value)
        {
            Ok(value) => value,
            // Supervisor gone; its last word is still in the channel.
            Err(_) => *outcome.borrow(),
        };

        match settled {
            AttemptOutcome::Ready(epoch) => Ok(ConnectionHandle::new(
                epoch,
                Arc::clone(&self.live_epoch),
                self.state.subscribe(),
            )),
            AttemptOutcome::Exhausted(attempts) => Err(ClientError::ReconnectExhausted { attempts }),
            AttemptOutcome::Pending | AttemptOutcome::Cancelled => Err(ClientError::Cancelled),
        }
    }

    /// Tear down: cancel any pending attempt, close the socket, keep subscriptions.
    pub fn disconnect(&self) {
        let (supervisor, session) = {
            let mut supervisor = self.supervisor.lock().unwrap_or_else(|p| p.into_inner());
            let mut session = self.session.lock().unwrap_or_else(|p| p.into_inner());
            (supervisor.take(), session.take())
        };

        if let Some(supervisor) = supervisor {
            supervisor.cancel.cancel();
        }
        if let Some(session) = session {
            session.sender.close();
            session.cancel.cancel();
            self.subscriptions.detach(session.sender.epoch());
        }

        let previous = self.state.send_replace(ConnectionState::Disconnected);
        if previous == ConnectionState::Connected {
            tracing::info!("Disconnected");
            self.bus.emit(
                events::SOCKET_DISCONNECTED,
                &json!({ "reason": CloseReason::Local.label() }),
            );
        }
    }

    /// Send one application event on the live connection.
    pub fn send(&self, event: &str, payload: Value) -> Result<(), ClientError> {
        let envelope = Envelope::new(event, payload);
        let result = match self.session() {
            Some(session) => session.send_envelope(&envelope),
            None => Err(ClientError::NotConnected {
                event: event.to_string(),
            }),
        };
        if let Err(ClientError::NotConnected { event }) = &result {
            self.warn_not_connected(&format!("`{event}` not sent: not connected"));
        }
        result
    }

    /// Publish the single local warning for an operation attempted while not connected.
    pub fn warn_not_connected(&self, message: &str) {
        tracing::warn!("{}", message);
        self.bus
            .emit(events::CLIENT_WARNING, &json!({ "message": message }));
    }

    async fn supervise(
        self: Arc<Self>,
        generation: u64,
        endpoint: String,
        config: ReconnectConfig,
        cancel: CancellationToken,
        outcome: watch::Sender<AttemptOutcome>,
    ) {
        let mut policy = ReconnectPolicy::new(config);
        let mut delay = Duration::ZERO;

        let finished = loop {
            if !delay.is_zero() {
                tracing::info!(delay_ms = delay.as_millis() as u64, "Reconnecting after delay");
                tokio::select! {
                    _ = cancel.cancelled() => break AttemptOutcome::Cancelled,
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            if !self.set_attempt_state(generation, ConnectionState::Connecting) {
                break AttemptOutcome::Cancelled;
            }
            let opened = tokio::select! {
                _ = cancel.cancelled() => break AttemptOutcome::Cancelled,
                opened = self.connector.open(&endpoint) => opened,
            };

            let link = match opened {
                Ok(link) => link,
                Err(e) => {
                    tracing::warn!(
                        attempt = policy.failures() + 1,
                        max = policy.max_attempts(),
                        "Failed to connect to {}: {}",
                        endpoint,
                        e
                    );
                    if !self.set_attempt_state(generation, ConnectionState::Disconnected) {
                        break AttemptOutcome::Cancelled;
                    }
                    match policy.record_failure() {
                        RetryDecision::RetryAfter(next) => {
                            delay = next;
                            continue;
                        }
                        RetryDecision::GiveUp { attempts } => {
                            tracing::error!(attempts, "Giving up on {}", endpoint);
                            self.bus
                                .emit(events::CONNECTION_EXHAUSTED, &json!({ "attempts": attempts }));
                            break AttemptOutcome::Exhausted(attempts);
                        }
                    }
                }
            };
            policy.record_success();

            let Some((sender, session_cancel)) = self.install(generation, link.outbound.clone())
            else {
                let _ = link.outbound.send(Outbound::Close);
                break AttemptOutcome::Cancelled;
            };
            let epoch = sender.epoch();
            tracing::info!(epoch, "Connected to {}", endpoint);
            self.bus.emit(
                events::CLIENT_READY,
                &json!({ "timestamp": Utc::now().timestamp_millis() }),
            );
            outcome.send_replace(AttemptOutcome::Ready(epoch));

            let heartbeat = Arc::clone(&self.heartbeat);
            let monitor_sender = sender.clone();
            let monitor_cancel = session_cancel.clone();
            tokio::spawn(async move { heartbeat.monitor(monitor_sender, monitor_cancel).await });

            let reason = self.read_frames(link.inbound, &session_cancel).await;
            self.end_session(epoch, &reason);

            if cancel.is_cancelled() {
                break AttemptOutcome::Cancelled;
            }
            outcome.send_replace(AttemptOutcome::Pending);
            if reason == CloseReason::GoingAway {
                policy.record_going_away();
            }
            delay = policy.next_delay();
        };

        outcome.send_replace(finished);
        self.retire(generation);
        tracing::debug!(generation, outcome = ?finished, "Connection supervisor finished");
    }

    /// Start a connection epoch. Fails when the supervisor was cancelled or
    /// replaced while the link was opening.
    fn install(
        &self,
        generation: u64,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Option<(SessionSender, CancellationToken)> {
        let supervisor = self.supervisor.lock().unwrap_or_else(|p| p.into_inner());
        let running = supervisor.as_ref().filter(|s| s.generation == generation)?;

        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let sender = SessionSender::new(epoch, outbound);
        let cancel = running.cancel.child_token();
        {
            let mut session = self.session.lock().unwrap_or_else(|p| p.into_inner());
            *session = Some(Session {
                sender: sender.clone(),
                cancel: cancel.clone(),
            });
        }
        self.live_epoch.store(epoch, Ordering::SeqCst);
        // Replay goes out before the state flips, so no application subscribe
        // can overtake it.
        self.subscriptions.attach(sender.clone());
        self.state.send_replace(ConnectionState::Connected);
        Some((sender, cancel))
    }

    async fn read_frames(
        &self,
        mut inbound: mpsc::UnboundedReceiver<LinkEvent>,
        cancel: &CancellationToken,
    ) -> CloseReason {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return CloseReason::Local,
                event = inbound.recv() => event,
            };
            match event {
                Some(LinkEvent::Frame(text)) => self.dispatch(&text),
                Some(LinkEvent::Closed(reason)) => return reason,
                None => return CloseReason::Error("link dropped".to_string()),
            }
        }
    }

    fn dispatch(&self, text: &str) {
        match parse_frame(text) {
            Ok(envelope) => {
                match envelope.event.as_str() {
                    events::ERROR => tracing::error!("Server error: {}", envelope.data),
                    events::CONNECTED => tracing::debug!("Server acknowledged connection"),
                    _ => {}
                }
                self.bus.emit(&envelope.event, &envelope.data);
            }
            Err(FrameRejection::Malformed(e)) => {
                tracing::warn!("Failed to parse server message: {}", e);
            }
            Err(FrameRejection::ReservedEvent(event)) => {
                tracing::warn!(event, "Ignoring server message using a local event name");
            }
        }
    }

    fn end_session(&self, epoch: u64, reason: &CloseReason) {
        let ended = {
            let mut session = self.session.lock().unwrap_or_else(|p| p.into_inner());
            match session.as_ref() {
                Some(s) if s.sender.epoch() == epoch => session.take(),
                _ => None,
            }
        };
        // `disconnect()` already took the session and reported it.
        let Some(ended) = ended else {
            return;
        };

        ended.cancel.cancel();
        self.subscriptions.detach(epoch);
        let previous = self.state.send_replace(ConnectionState::Disconnected);
        tracing::info!(epoch, reason = ?reason, "Connection closed");
        if previous == ConnectionState::Connected {
            self.bus.emit(
                events::SOCKET_DISCONNECTED,
                &json!({ "reason": reason.label() }),
            );
        }
    }

    fn set_attempt_state(&self, generation: u64, state: ConnectionState) -> bool {
        let supervisor = self.supervisor.lock().unwrap_or_else(|p| p.into_inner());
        if supervisor.as_ref().map(|s| s.generation) != Some(generation) {
            return false;
        }
        self.state.send_replace(state);
        true
    }

    fn retire(&self, generation: u64) {
        let mut supervisor = self.supervisor.lock().unwrap_or_else(|p| p.into_inner());
        if supervisor.as_ref().map(|s| s.generation) == Some(generation) {
            *supervisor = None;
        }
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), ClientError> {
    let invalid = |reason: String| ClientError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };
    let url = url::Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(invalid(format!("unsupported scheme `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_endpoint() {
        assert!(validate_endpoint("ws://localhost:5000/ws").is_ok());
        assert!(validate_endpoint("wss://fuzz.example.com/ws").is_ok());
        assert!(matches!(
            validate_endpoint("http://localhost:5000"),
            Err(ClientError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            validate_endpoint("not a url"),
            Err(ClientError::InvalidEndpoint { .. })
        ));
    }
}
