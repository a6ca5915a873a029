//! Subscription Manager: the channels the application wants, across reconnects.
//!
//! The server forgets a client's subscriptions when its socket drops, so the
//! manager keeps the wanted set locally and replays it every time a connection
//! epoch starts. Membership changes regardless of connection state; the wire
//! message goes out only while a session is attached.

use std::sync::Mutex;

use fuzzboard_protocol::{ClientEvent, TaskId};

use super::link::SessionSender;

/// A logical channel layered over the physical connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subscription {
    Task(TaskId),
    Dashboard,
}

impl Subscription {
    fn subscribe_event(self) -> ClientEvent {
        match self {
            Subscription::Task(task_id) => ClientEvent::SubscribeTask { task_id },
            Subscription::Dashboard => ClientEvent::SubscribeDashboard,
        }
    }
}

/// Result of a subscribe/unsubscribe call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    /// Membership changed and the control message went out
    Sent,
    /// Nothing to do: already in (or already absent from) the set
    AlreadyActive,
    /// Membership changed but there is no connection; replayed on the next connect
    NotConnected,
}

#[derive(Default)]
struct State {
    /// Insertion-ordered set
    active: Vec<Subscription>,
    session: Option<SessionSender>,
}

#[derive(Default)]
pub struct SubscriptionManager {
    state: Mutex<State>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_task(&self, task_id: TaskId) -> SubscribeOutcome {
        self.add(Subscription::Task(task_id))
    }

    pub fn unsubscribe_task(&self, task_id: TaskId) -> SubscribeOutcome {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let entry = Subscription::Task(task_id);
        let Some(index) = state.active.iter().position(|s| *s == entry) else {
            return SubscribeOutcome::AlreadyActive;
        };
        state.active.remove(index);
        send(
            state.session.as_ref(),
            &ClientEvent::UnsubscribeTask { task_id },
        )
    }

    pub fn subscribe_dashboard(&self) -> SubscribeOutcome {
        self.add(Subscription::Dashboard)
    }

    /// Drop the dashboard flag locally. The server has no matching message; its
    /// side of the subscription ends with the connection.
    pub fn unsubscribe_dashboard(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let before = state.active.len();
        state.active.retain(|s| *s != Subscription::Dashboard);
        state.active.len() != before
    }

    /// Active subscriptions in insertion order.
    pub fn active(&self) -> Vec<Subscription> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.active.clone()
    }

    pub fn is_subscribed(&self, subscription: Subscription) -> bool {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.active.contains(&subscription)
    }

    /// Attach a new connection epoch and replay every active subscription.
    ///
    /// Runs under the manager's lock, so a concurrent subscribe call is either
    /// part of the replay or sent after it, never interleaved.
    pub(crate) fn attach(&self, session: SessionSender) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        for subscription in &state.active {
            if let Err(e) = session.send_event(&subscription.subscribe_event()) {
                tracing::warn!(?subscription, "Replay failed: {}", e);
            }
        }
        let replayed = state.active.len();
        tracing::debug!(epoch = session.epoch(), replayed, "Subscriptions replayed");
        state.session = Some(session);
        replayed
    }

    /// Detach the epoch that just ended. Later epochs are left alone.
    pub(crate) fn detach(&self, epoch: u64) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.session.as_ref().map(SessionSender::epoch) == Some(epoch) {
            state.session = None;
        }
    }

    fn add(&self, subscription: Subscription) -> SubscribeOutcome {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if state.active.contains(&subscription) {
            return SubscribeOutcome::AlreadyActive;
        }
        state.active.push(subscription);
        send(state.session.as_ref(), &subscription.subscribe_event())
    }
}

fn send(session: Option<&SessionSender>, event: &ClientEvent) -> SubscribeOutcome {
    match session.map(|s| s.send_event(event)) {
        Some(Ok(())) => SubscribeOutcome::Sent,
        Some(Err(e)) => {
            tracing::debug!("Control message not sent: {}", e);
            SubscribeOutcome::NotConnected
        }
        None => SubscribeOutcome::NotConnected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::websocket::link::Outbound;
    use fuzzboard_protocol::Envelope;
    use tokio::sync::mpsc;

    fn session(epoch: u64) -> (SessionSender, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SessionSender::new(epoch, tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(Outbound::Text(text)) = rx.try_recv() {
            out.push(Envelope::decode(&text).unwrap());
        }
        out
    }

    #[test]
    fn test_membership_changes_while_detached() {
        let manager = SubscriptionManager::new();

        assert_eq!(
            manager.subscribe_task(TaskId::new(1)),
            SubscribeOutcome::NotConnected
        );
        assert_eq!(manager.subscribe_dashboard(), SubscribeOutcome::NotConnected);
        assert_eq!(
            manager.active(),
            vec![Subscription::Task(TaskId::new(1)), Subscription::Dashboard]
        );

        assert_eq!(
            manager.unsubscribe_task(TaskId::new(1)),
            SubscribeOutcome::NotConnected
        );
        assert_eq!(manager.active(), vec![Subscription::Dashboard]);
    }

    #[test]
    fn test_duplicate_subscribe_sends_once() {
        let manager = SubscriptionManager::new();
        let (sender, mut rx) = session(1);
        manager.attach(sender);

        assert_eq!(manager.subscribe_task(TaskId::new(5)), SubscribeOutcome::Sent);
        assert_eq!(
            manager.subscribe_task(TaskId::new(5)),
            SubscribeOutcome::AlreadyActive
        );
        assert_eq!(manager.subscribe_dashboard(), SubscribeOutcome::Sent);
        assert_eq!(
            manager.subscribe_dashboard(),
            SubscribeOutcome::AlreadyActive
        );

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].event, "subscribe_task");
        assert_eq!(sent[0].data["task_id"], 5);
        assert_eq!(sent[1].event, "subscribe_dashboard");
    }

    #[test]
    fn test_attach_replays_in_insertion_order() {
        let manager = SubscriptionManager::new();
        manager.subscribe_task(TaskId::new(3));
        manager.subscribe_dashboard();
        manager.subscribe_task(TaskId::new(1));

        let (sender, mut rx) = session(2);
        assert_eq!(manager.attach(sender), 3);

        let sent: Vec<(String, serde_json::Value)> = drain(&mut rx)
            .into_iter()
            .map(|e| (e.event, e.data))
            .collect();
        assert_eq!(
            sent,
            vec![
                ("subscribe_task".into(), serde_json::json!({"task_id": 3})),
                ("subscribe_dashboard".into(), serde_json::json!({})),
                ("subscribe_task".into(), serde_json::json!({"task_id": 1})),
            ]
        );
    }

    #[test]
    fn test_unsubscribe_unknown_task_is_noop() {
        let manager = SubscriptionManager::new();
        let (sender, mut rx) = session(1);
        manager.attach(sender);

        assert_eq!(
            manager.unsubscribe_task(TaskId::new(9)),
            SubscribeOutcome::AlreadyActive
        );
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_detach_ignores_stale_epoch() {
        let manager = SubscriptionManager::new();
        let (sender, mut rx) = session(4);
        manager.attach(sender);

        manager.detach(3);
        assert_eq!(manager.subscribe_dashboard(), SubscribeOutcome::Sent);

        manager.detach(4);
        assert_eq!(
            manager.subscribe_task(TaskId::new(2)),
            SubscribeOutcome::NotConnected
        );
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_unsubscribe_dashboard_clears_flag() {
        let manager = SubscriptionManager::new();
        manager.subscribe_dashboard();
        assert!(manager.unsubscribe_dashboard());
        assert!(!manager.unsubscribe_dashboard());
        assert!(!manager.is_subscribed(Subscription::Dashboard));
    }
}
