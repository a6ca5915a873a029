//! Heartbeat Monitor: ping/pong liveness probes.
//!
//! At most one probe is outstanding. A new probe supersedes the previous one:
//! the old caller resolves without a payload and its `pong` listener is removed
//! right away, so the bus never accumulates stale listeners.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use fuzzboard_protocol::{events, ClientEvent};

use crate::config::HeartbeatConfig;
use crate::infrastructure::messaging::{listener, EventBus, Listener};

use super::link::SessionSender;

/// Metadata of one liveness probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    pub correlation_id: Uuid,
    pub sent_at: DateTime<Utc>,
}

/// How a probe ended
#[derive(Debug, Clone, PartialEq)]
pub enum PingOutcome {
    /// The server answered; carries the `pong` payload
    Pong(Value),
    /// No answer inside the timeout window
    TimedOut,
    /// A newer probe replaced this one before it was answered
    Superseded,
    /// There was no connection to send the probe on
    NotConnected,
}

impl PingOutcome {
    pub fn into_payload(self) -> Option<Value> {
        match self {
            PingOutcome::Pong(payload) => Some(payload),
            _ => None,
        }
    }
}

struct Outstanding {
    probe: Probe,
    resolve: oneshot::Sender<Value>,
    listener: Listener,
}

type Slot = Arc<Mutex<Option<Outstanding>>>;

pub struct Heartbeat {
    bus: EventBus,
    config: HeartbeatConfig,
    outstanding: Slot,
    last_round_trip: Mutex<Option<Duration>>,
}

impl Heartbeat {
    pub fn new(bus: EventBus, config: HeartbeatConfig) -> Self {
        Self {
            bus,
            config,
            outstanding: Arc::new(Mutex::new(None)),
            last_round_trip: Mutex::new(None),
        }
    }

    pub fn config(&self) -> HeartbeatConfig {
        self.config
    }

    /// Probe currently waiting for a `pong`, if any.
    pub fn outstanding(&self) -> Option<Probe> {
        let slot = self.outstanding.lock().unwrap_or_else(|p| p.into_inner());
        slot.as_ref().map(|o| o.probe)
    }

    /// Round-trip time of the last answered probe.
    pub fn last_round_trip(&self) -> Option<Duration> {
        *self.last_round_trip.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Send one probe and wait for the reply or the timeout.
    pub async fn probe(&self, session: Option<SessionSender>) -> PingOutcome {
        let Some(session) = session else {
            return PingOutcome::NotConnected;
        };

        let (resolve, reply) = oneshot::channel();
        let probe = Probe {
            correlation_id: Uuid::new_v4(),
            sent_at: Utc::now(),
        };
        let pong_listener = self.pong_listener(probe.correlation_id);

        let previous = {
            let mut slot = self.outstanding.lock().unwrap_or_else(|p| p.into_inner());
            slot.replace(Outstanding {
                probe,
                resolve,
                listener: pong_listener.clone(),
            })
        };
        if let Some(previous) = previous {
            tracing::debug!(
                correlation_id = %previous.probe.correlation_id,
                "Heartbeat probe superseded"
            );
            self.bus.off(events::PONG, &previous.listener);
            // Dropping `previous.resolve` wakes the superseded caller.
        }

        self.bus.on(events::PONG, pong_listener.clone());
        let _cleanup = ProbeCleanup {
            bus: &self.bus,
            slot: &self.outstanding,
            listener: pong_listener,
            correlation_id: probe.correlation_id,
        };

        if let Err(e) = session.send_event(&ClientEvent::Ping) {
            tracing::debug!("Heartbeat not sent: {}", e);
            return PingOutcome::NotConnected;
        }

        let started = Instant::now();
        match tokio::time::timeout(self.config.timeout, reply).await {
            Ok(Ok(payload)) => {
                let rtt = started.elapsed();
                *self
                    .last_round_trip
                    .lock()
                    .unwrap_or_else(|p| p.into_inner()) = Some(rtt);
                tracing::trace!(rtt_ms = rtt.as_millis() as u64, "Heartbeat answered");
                PingOutcome::Pong(payload)
            }
            Ok(Err(_)) => PingOutcome::Superseded,
            Err(_) => {
                tracing::debug!(
                    timeout_ms = self.config.timeout.as_millis() as u64,
                    "Heartbeat timed out"
                );
                PingOutcome::TimedOut
            }
        }
    }

    /// Periodic probing for one connection epoch. Returns when `cancel` fires
    /// or the session goes away.
    pub async fn monitor(&self, session: SessionSender, cancel: CancellationToken) {
        let Some(period) = self.config.interval else {
            return;
        };
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut missed = 0u32;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return,
                outcome = self.probe(Some(session.clone())) => outcome,
            };

            match outcome {
                PingOutcome::Pong(_) => missed = 0,
                PingOutcome::TimedOut => {
                    missed += 1;
                    tracing::warn!(missed, "Server did not answer heartbeat");
                    if missed == self.config.max_missed {
                        self.bus
                            .emit(events::CONNECTION_UNRESPONSIVE, &json!({ "missed": missed }));
                    }
                }
                PingOutcome::Superseded => {}
                PingOutcome::NotConnected => return,
            }
        }
    }

    fn pong_listener(&self, correlation_id: Uuid) -> Listener {
        let slot = Arc::clone(&self.outstanding);
        listener(move |payload| {
            let mut slot = slot.lock().unwrap_or_else(|p| p.into_inner());
            if slot.as_ref().map(|o| o.probe.correlation_id) == Some(correlation_id) {
                if let Some(outstanding) = slot.take() {
                    let _ = outstanding.resolve.send(payload.clone());
                }
            }
        })
    }
}

/// Deregisters a probe's listener however its `probe()` call ends, including
/// when the caller drops the future.
struct ProbeCleanup<'a> {
    bus: &'a EventBus,
    slot: &'a Slot,
    listener: Listener,
    correlation_id: Uuid,
}

impl Drop for ProbeCleanup<'_> {
    fn drop(&mut self) {
        self.bus.off(events::PONG, &self.listener);
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        if slot.as_ref().map(|o| o.probe.correlation_id) == Some(self.correlation_id) {
            slot.take();
        }
    }
}
