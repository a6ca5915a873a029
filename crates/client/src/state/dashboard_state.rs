//! Dashboard state: the last aggregate snapshot, replaced wholesale.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;

use fuzzboard_protocol::{events, DashboardStats, DashboardUpdate};

use crate::infrastructure::messaging::{listener, EventBus, Listener};

#[derive(Clone)]
pub struct DashboardState {
    snapshot: Arc<watch::Sender<Option<Value>>>,
}

impl Default for DashboardState {
    fn default() -> Self {
        let (snapshot, _) = watch::channel(None);
        Self {
            snapshot: Arc::new(snapshot),
        }
    }
}

impl DashboardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot. Dashboard payloads are complete, so nothing is merged.
    pub fn replace(&self, snapshot: Value) {
        self.snapshot.send_replace(Some(snapshot));
    }

    pub fn snapshot(&self) -> Option<Value> {
        self.snapshot.borrow().clone()
    }

    /// Counters from the snapshot.
    ///
    /// Accepts the push shape (`{stats, timestamp}`) and the bare counters the
    /// REST endpoint returns.
    pub fn stats(&self) -> Option<DashboardStats> {
        let snapshot = self.snapshot.borrow();
        let value = snapshot.as_ref()?;
        serde_json::from_value::<DashboardUpdate>(value.clone())
            .map(|update| update.stats)
            .or_else(|_| serde_json::from_value::<DashboardStats>(value.clone()))
            .ok()
    }

    pub fn watch(&self) -> watch::Receiver<Option<Value>> {
        self.snapshot.subscribe()
    }

    pub fn attach(&self, bus: &EventBus) -> Listener {
        let state = self.clone();
        let callback = listener(move |payload| state.replace(payload.clone()));
        bus.on(events::DASHBOARD_UPDATE, callback.clone());
        callback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_updates_replace_without_merging() {
        let bus = EventBus::new();
        let dashboard = DashboardState::new();
        dashboard.attach(&bus);

        bus.emit(
            "dashboard_update",
            &json!({"stats": {"total_tasks": 4, "total_crashes": 1}, "timestamp": "t1"}),
        );
        bus.emit("dashboard_update", &json!({"stats": {"total_tasks": 5}}));

        assert_eq!(
            dashboard.snapshot(),
            Some(json!({"stats": {"total_tasks": 5}}))
        );
        let stats = dashboard.stats().unwrap();
        assert_eq!(stats.total_tasks, 5);
        assert_eq!(stats.total_crashes, 0);
    }

    #[test]
    fn test_stats_reads_rest_shape() {
        let dashboard = DashboardState::new();
        assert!(dashboard.stats().is_none());

        dashboard.replace(json!({"total_tasks": 2, "running_tasks": 1}));
        assert_eq!(dashboard.stats().unwrap().running_tasks, 1);
    }
}
