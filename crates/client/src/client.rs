//! Real-Time Client: the one object the rest of the application talks to.
//!
//! Composes the event bus, the transport connection, the subscription manager
//! and the heartbeat monitor. Cloning is cheap; every clone drives the same
//! connection. Expected network trouble never shows up as a panic or an `Err`
//! from `send`-style calls beyond `NotConnected`; it arrives as bus events.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use fuzzboard_protocol::TaskId;

use crate::config::{ClientConfig, ConnectOptions};
use crate::error::ClientError;
use crate::infrastructure::messaging::{
    ConnectionHandle, ConnectionState, ConnectionStateObserver, EventBus, Listener,
};
use crate::infrastructure::websocket::{
    Connector, Heartbeat, PingOutcome, Probe, SubscribeOutcome, Subscription,
    SubscriptionManager, Transport, WsConnector,
};

#[derive(Clone)]
pub struct RealtimeClient {
    bus: EventBus,
    transport: Arc<Transport>,
    subscriptions: Arc<SubscriptionManager>,
    heartbeat: Arc<Heartbeat>,
}

impl RealtimeClient {
    /// Build a client over an arbitrary connector.
    pub fn new(config: &ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let bus = EventBus::new();
        let subscriptions = Arc::new(SubscriptionManager::new());
        let heartbeat = Arc::new(Heartbeat::new(bus.clone(), config.heartbeat));
        let transport = Arc::new(Transport::new(
            connector,
            bus.clone(),
            Arc::clone(&subscriptions),
            Arc::clone(&heartbeat),
            config.ws_url.clone(),
            config.reconnect,
        ));
        Self {
            bus,
            transport,
            subscriptions,
            heartbeat,
        }
    }

    /// Build a client that speaks WebSocket through tokio-tungstenite.
    pub fn websocket(config: &ClientConfig) -> Self {
        Self::new(config, Arc::new(WsConnector::new()))
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to the configured endpoint.
    ///
    /// Resolves immediately when already connected, and joins the attempt in
    /// flight when one is running.
    pub async fn connect(&self) -> Result<ConnectionHandle, ClientError> {
        self.transport
            .connect(None, &ConnectOptions::default())
            .await
    }

    /// Connect to `endpoint` with per-call reconnection overrides.
    pub async fn connect_with(
        &self,
        endpoint: &str,
        options: ConnectOptions,
    ) -> Result<ConnectionHandle, ClientError> {
        self.transport.connect(Some(endpoint), &options).await
    }

    /// Close the connection and cancel any pending reconnect. Subscriptions
    /// are kept and replayed by the next `connect()`.
    pub fn disconnect(&self) {
        self.transport.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn state(&self) -> ConnectionState {
        self.transport.state()
    }

    pub fn observer(&self) -> ConnectionStateObserver {
        self.transport.observer()
    }

    pub fn endpoint(&self) -> &str {
        self.transport.endpoint()
    }

    // =========================================================================
    // Events
    // =========================================================================

    pub fn on(&self, event: &str, callback: Listener) {
        self.bus.on(event, callback);
    }

    pub fn off(&self, event: &str, callback: &Listener) {
        self.bus.off(event, callback);
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Send an application event. Outside the Connected state the payload is
    /// dropped, one `client:warning` is published and `NotConnected` returned.
    pub fn send(&self, event: &str, payload: Value) -> Result<(), ClientError> {
        self.transport.send(event, payload)
    }

    // =========================================================================
    // Channels
    // =========================================================================

    pub fn subscribe_task(&self, task_id: TaskId) -> SubscribeOutcome {
        let outcome = self.subscriptions.subscribe_task(task_id);
        self.report(outcome, || format!("subscription to task {task_id} will be sent on connect"));
        outcome
    }

    pub fn unsubscribe_task(&self, task_id: TaskId) -> SubscribeOutcome {
        let outcome = self.subscriptions.unsubscribe_task(task_id);
        self.report(outcome, || format!("unsubscribe from task {task_id} not sent: not connected"));
        outcome
    }

    pub fn subscribe_dashboard(&self) -> SubscribeOutcome {
        let outcome = self.subscriptions.subscribe_dashboard();
        self.report(outcome, || {
            "dashboard subscription will be sent on connect".to_string()
        });
        outcome
    }

    /// Forget the dashboard subscription locally; returns whether it was active.
    pub fn unsubscribe_dashboard(&self) -> bool {
        self.subscriptions.unsubscribe_dashboard()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.subscriptions.active()
    }

    // =========================================================================
    // Heartbeat
    // =========================================================================

    /// Probe the server. `None` on timeout, supersession, or no connection.
    pub async fn ping(&self) -> Option<Value> {
        match self.heartbeat.probe(self.transport.session()).await {
            PingOutcome::NotConnected => {
                self.transport.warn_not_connected("ping not sent: not connected");
                None
            }
            outcome => outcome.into_payload(),
        }
    }

    /// Probe waiting for a `pong`, if any.
    pub fn outstanding_probe(&self) -> Option<Probe> {
        self.heartbeat.outstanding()
    }

    pub fn last_round_trip(&self) -> Option<Duration> {
        self.heartbeat.last_round_trip()
    }

    fn report(&self, outcome: SubscribeOutcome, message: impl FnOnce() -> String) {
        if outcome == SubscribeOutcome::NotConnected {
            self.transport.warn_not_connected(&message());
        }
    }
}
