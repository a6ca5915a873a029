//! Event Bus for delivering real-time events to the rest of the application.
//!
//! Maps an event name to an ordered list of listeners. Dispatch is synchronous
//! and follows registration order. The bus knows nothing about the transport:
//! the connection republishes decoded frames here and the stores and views
//! listen.

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use serde_json::Value;

/// A registered callback.
///
/// Identity is the allocation: `off` removes a registration only when handed a
/// clone of the same `Arc` that was passed to `on`.
pub type Listener = Arc<dyn Fn(&Value) + Send + Sync + 'static>;

/// Wrap a closure as a [`Listener`].
pub fn listener(callback: impl Fn(&Value) + Send + Sync + 'static) -> Listener {
    Arc::new(callback)
}

#[derive(Default)]
struct Registry {
    listeners: HashMap<String, Vec<Listener>>,
    /// Events currently being dispatched, per dispatching thread
    in_flight: HashSet<(String, ThreadId)>,
}

/// Event bus shared between the transport and its consumers.
///
/// Cloning is cheap and every clone sees the same registrations.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<Registry>>,
}

impl EventBus {
    /// Create a new EventBus with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `event`.
    ///
    /// Registering the same listener twice is allowed and both registrations fire.
    pub fn on(&self, event: &str, callback: Listener) {
        let mut registry = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        registry
            .listeners
            .entry(event.to_string())
            .or_default()
            .push(callback);
    }

    /// Remove the first registration of `callback` for `event`. No-op if absent.
    pub fn off(&self, event: &str, callback: &Listener) {
        let mut registry = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let Some(list) = registry.listeners.get_mut(event) else {
            return;
        };
        if let Some(index) = list.iter().position(|l| same_listener(l, callback)) {
            list.remove(index);
        }
        if list.is_empty() {
            registry.listeners.remove(event);
        }
    }

    /// Invoke every listener registered for `event`, in registration order.
    ///
    /// Listeners run against a snapshot taken before the first call, so a
    /// listener may register or remove listeners without affecting this
    /// dispatch. A panicking listener is logged and the rest still run.
    ///
    /// Emitting an event from inside one of its own listeners is a cycle: the
    /// nested emit is dropped and logged instead of recursing.
    pub fn emit(&self, event: &str, payload: &Value) {
        let key = (event.to_string(), thread::current().id());
        let snapshot = {
            let mut registry = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            if registry.in_flight.contains(&key) {
                tracing::warn!(event, "Dropping recursive emit from inside its own listener");
                return;
            }
            let Some(list) = registry.listeners.get(event) else {
                return;
            };
            let snapshot = list.clone();
            registry.in_flight.insert(key.clone());
            snapshot
        };

        let _guard = InFlightGuard {
            registry: &self.inner,
            key: Some(key),
        };

        for (index, callback) in snapshot.iter().enumerate() {
            if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
                tracing::error!(event, listener = index, "Event listener panicked");
            }
        }
    }

    /// Remove every listener for `event`, or for all events when `None`.
    pub fn remove_all(&self, event: Option<&str>) {
        let mut registry = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match event {
            Some(event) => {
                registry.listeners.remove(event);
            }
            None => registry.listeners.clear(),
        }
    }

    /// Number of registrations for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        let registry = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        registry.listeners.get(event).map_or(0, Vec::len)
    }
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Clears the in-flight marker even if a listener unwinds past `emit`.
struct InFlightGuard<'a> {
    registry: &'a Mutex<Registry>,
    key: Option<(String, ThreadId)>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            let mut registry = self.registry.lock().unwrap_or_else(|p| p.into_inner());
            registry.in_flight.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn recorder(log: &Arc<Mutex<Vec<String>>>, tag: &str) -> Listener {
        let log = Arc::clone(log);
        let tag = tag.to_string();
        listener(move |_| log.lock().unwrap().push(tag.clone()))
    }

    #[test]
    fn test_emit_follows_registration_order() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.on("task_update", recorder(&log, "a"));
        bus.on("task_update", recorder(&log, "b"));
        bus.on("task_update", recorder(&log, "c"));
        bus.on("dashboard_update", recorder(&log, "other"));

        bus.emit("task_update", &json!({"id": 1}));

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_duplicate_registration_fires_twice_and_off_removes_one() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = Arc::clone(&count);
        let cb = listener(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.on("pong", cb.clone());
        bus.on("pong", cb.clone());
        bus.emit("pong", &json!({}));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        bus.off("pong", &cb);
        assert_eq!(bus.listener_count("pong"), 1);
        bus.emit("pong", &json!({}));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_off_unknown_listener_is_noop() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let registered = recorder(&log, "kept");
        bus.on("error", registered);

        bus.off("error", &recorder(&log, "never-registered"));
        bus.off("missing", &recorder(&log, "x"));

        assert_eq!(bus.listener_count("error"), 1);
    }

    #[test]
    fn test_off_keeps_order_of_remaining_listeners() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder(&log, "a");
        let b = recorder(&log, "b");
        let c = recorder(&log, "c");
        bus.on("e", a);
        bus.on("e", b.clone());
        bus.on("e", c);

        bus.off("e", &b);
        bus.emit("e", &json!(null));

        assert_eq!(*log.lock().unwrap(), vec!["a", "c"]);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.on("task_update", recorder(&log, "before"));
        bus.on("task_update", listener(|_| panic!("listener bug")));
        bus.on("task_update", recorder(&log, "after"));

        bus.emit("task_update", &json!({}));
        bus.emit("task_update", &json!({}));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["before", "after", "before", "after"]
        );
    }

    #[test]
    fn test_recursive_emit_of_same_event_is_broken() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU32::new(0));

        let bus_clone = bus.clone();
        let count_clone = Arc::clone(&count);
        bus.on(
            "loop",
            listener(move |payload| {
                count_clone.fetch_add(1, Ordering::SeqCst);
                bus_clone.emit("loop", payload);
            }),
        );

        bus.emit("loop", &json!({}));
        assert_eq!(count.load(Ordering::SeqCst), 1);

        // The guard is released afterwards.
        bus.emit("loop", &json!({}));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_may_emit_a_different_event() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let bus_clone = bus.clone();
        bus.on(
            "first",
            listener(move |payload| bus_clone.emit("second", payload)),
        );
        bus.on("second", recorder(&log, "second"));

        bus.emit("first", &json!({}));
        assert_eq!(*log.lock().unwrap(), vec!["second"]);
    }

    #[test]
    fn test_listener_removing_itself_mid_dispatch() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let slot: Arc<Mutex<Option<Listener>>> = Arc::new(Mutex::new(None));
        let bus_clone = bus.clone();
        let slot_clone = Arc::clone(&slot);
        let log_clone = Arc::clone(&log);
        let once = listener(move |_| {
            log_clone.lock().unwrap().push("once".to_string());
            if let Some(me) = slot_clone.lock().unwrap().take() {
                bus_clone.off("e", &me);
            }
        });
        *slot.lock().unwrap() = Some(once.clone());

        bus.on("e", once);
        bus.on("e", recorder(&log, "steady"));

        bus.emit("e", &json!({}));
        bus.emit("e", &json!({}));

        assert_eq!(*log.lock().unwrap(), vec!["once", "steady", "steady"]);
    }

    #[test]
    fn test_remove_all_for_one_event_or_everything() {
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        bus.on("a", recorder(&log, "a"));
        bus.on("b", recorder(&log, "b"));
        bus.on("c", recorder(&log, "c"));

        bus.remove_all(Some("a"));
        assert_eq!(bus.listener_count("a"), 0);
        assert_eq!(bus.listener_count("b"), 1);

        bus.remove_all(None);
        assert_eq!(bus.listener_count("b"), 0);
        assert_eq!(bus.listener_count("c"), 0);
    }
}
