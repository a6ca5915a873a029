//! Task store: the application's view of every fuzzing task.
//!
//! Fed by REST loads and by `task_update` events from the real-time client.
//! Observers get change notifications through a `watch` channel.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::watch;

use fuzzboard_protocol::{events, TaskId, TaskRecord};

use crate::infrastructure::messaging::{listener, EventBus, Listener};

/// Everything the store holds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskStoreState {
    /// Newest first
    pub tasks: Vec<TaskRecord>,
    /// Task open in a detail view
    pub current: Option<TaskRecord>,
    pub loading: bool,
}

/// What `apply_update` did with a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateApplied {
    Merged(TaskId),
    Inserted(TaskId),
}

#[derive(Clone)]
pub struct TaskStore {
    state: Arc<watch::Sender<TaskStoreState>>,
}

impl Default for TaskStore {
    fn default() -> Self {
        let (state, _) = watch::channel(TaskStoreState::default());
        Self {
            state: Arc::new(state),
        }
    }
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tasks(&self, tasks: Vec<TaskRecord>) {
        self.state.send_modify(|state| state.tasks = tasks);
    }

    pub fn set_current_task(&self, task: Option<TaskRecord>) {
        self.state.send_modify(|state| state.current = task);
    }

    /// Insert at the head of the list.
    pub fn add_task(&self, task: TaskRecord) {
        self.state.send_modify(|state| state.tasks.insert(0, task));
    }

    /// Merge `updates` into the task with `task_id`, and into the current task
    /// if it is that one. Returns false if the task is not in the list.
    pub fn update_task(&self, task_id: TaskId, updates: &Map<String, Value>) -> bool {
        let mut found = false;
        self.state.send_if_modified(|state| {
            if let Some(task) = state.tasks.iter_mut().find(|t| t.id() == Some(task_id)) {
                task.merge(updates);
                found = true;
            }
            let mut touched = found;
            if let Some(current) = state.current.as_mut().filter(|c| c.id() == Some(task_id)) {
                current.merge(updates);
                touched = true;
            }
            touched
        });
        found
    }

    pub fn remove_task(&self, task_id: TaskId) -> Option<TaskRecord> {
        let mut removed = None;
        self.state.send_if_modified(|state| {
            let Some(index) = state.tasks.iter().position(|t| t.id() == Some(task_id)) else {
                return false;
            };
            removed = Some(state.tasks.remove(index));
            true
        });
        removed
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.send_if_modified(|state| {
            let changed = state.loading != loading;
            state.loading = loading;
            changed
        });
    }

    /// Apply one `task_update` payload as a merge-patch.
    ///
    /// A known task is shallow-merged; an unknown one is inserted at the head.
    /// The current task is merged too when its id matches. Payloads without a
    /// readable id are ignored.
    pub fn apply_update(&self, payload: &Value) -> Option<UpdateApplied> {
        let Some(patch) = payload.as_object() else {
            tracing::warn!("Ignoring task update that is not an object");
            return None;
        };
        let Some(task_id) = TaskRecord::new(patch.clone()).id() else {
            tracing::warn!("Ignoring task update without a task id");
            return None;
        };

        let mut applied = None;
        self.state.send_modify(|state| {
            match state.tasks.iter_mut().find(|t| t.id() == Some(task_id)) {
                Some(task) => {
                    task.merge(patch);
                    applied = Some(UpdateApplied::Merged(task_id));
                }
                None => {
                    state.tasks.insert(0, TaskRecord::new(patch.clone()));
                    applied = Some(UpdateApplied::Inserted(task_id));
                }
            }
            if let Some(current) = state.current.as_mut() {
                if current.id() == Some(task_id) {
                    current.merge(patch);
                }
            }
        });
        tracing::debug!(%task_id, ?applied, "Task update applied");
        applied
    }

    pub fn get(&self, task_id: TaskId) -> Option<TaskRecord> {
        self.state
            .borrow()
            .tasks
            .iter()
            .find(|t| t.id() == Some(task_id))
            .cloned()
    }

    pub fn snapshot(&self) -> TaskStoreState {
        self.state.borrow().clone()
    }

    pub fn tasks(&self) -> Vec<TaskRecord> {
        self.state.borrow().tasks.clone()
    }

    pub fn current(&self) -> Option<TaskRecord> {
        self.state.borrow().current.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Change notifications for UI bindings.
    pub fn watch(&self) -> watch::Receiver<TaskStoreState> {
        self.state.subscribe()
    }

    /// Register the store's `task_update` listener. Keep the returned listener
    /// to detach it again with `EventBus::off`.
    pub fn attach(&self, bus: &EventBus) -> Listener {
        let store = self.clone();
        let callback = listener(move |payload| {
            store.apply_update(payload);
        });
        bus.on(events::TASK_UPDATE, callback.clone());
        callback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> TaskRecord {
        TaskRecord::from_value(&value).unwrap()
    }

    fn ids(store: &TaskStore) -> Vec<i64> {
        store
            .tasks()
            .iter()
            .filter_map(|t| t.id().map(TaskId::get))
            .collect()
    }

    #[test]
    fn test_update_merges_existing_record() {
        let store = TaskStore::new();
        store.set_tasks(vec![record(json!({"id": 1, "status": "running", "name": "libpng"}))]);

        let applied = store.apply_update(&json!({"id": 1, "status": "paused"}));

        assert_eq!(applied, Some(UpdateApplied::Merged(TaskId::new(1))));
        assert_eq!(
            store.get(TaskId::new(1)).unwrap().into_value(),
            json!({"id": 1, "status": "paused", "name": "libpng"})
        );
    }

    #[test]
    fn test_update_for_unknown_task_inserts_at_head() {
        let store = TaskStore::new();
        store.set_tasks(vec![record(json!({"id": 1, "status": "running"}))]);

        let applied = store.apply_update(&json!({"id": 2, "status": "compiling"}));

        assert_eq!(applied, Some(UpdateApplied::Inserted(TaskId::new(2))));
        assert_eq!(ids(&store), vec![2, 1]);
    }

    #[test]
    fn test_update_keyed_by_task_id_field() {
        let store = TaskStore::new();
        store.set_tasks(vec![record(json!({"id": 7, "status": "running"}))]);

        store.apply_update(&json!({"task_id": 7, "stats": {"total_crashes": 2}}));

        let task = store.get(TaskId::new(7)).unwrap();
        assert_eq!(task.get("stats"), Some(&json!({"total_crashes": 2})));
        assert_eq!(store.tasks().len(), 1);
    }

    #[test]
    fn test_update_without_id_is_ignored() {
        let store = TaskStore::new();
        assert_eq!(store.apply_update(&json!({"status": "running"})), None);
        assert_eq!(store.apply_update(&json!("nope")), None);
        assert!(store.tasks().is_empty());
    }

    #[test]
    fn test_update_also_patches_current_task() {
        let store = TaskStore::new();
        store.set_tasks(vec![record(json!({"id": 3, "status": "running"}))]);
        store.set_current_task(Some(record(json!({"id": 3, "status": "running", "fuzzers": 2}))));

        store.apply_update(&json!({"id": 3, "status": "stopped"}));

        assert_eq!(
            store.current().unwrap().into_value(),
            json!({"id": 3, "status": "stopped", "fuzzers": 2})
        );
    }

    #[test]
    fn test_crud_operations() {
        let store = TaskStore::new();
        store.add_task(record(json!({"id": 1})));
        store.add_task(record(json!({"id": 2})));
        assert_eq!(ids(&store), vec![2, 1]);

        let patch = json!({"status": "paused"});
        assert!(store.update_task(TaskId::new(1), patch.as_object().unwrap()));
        assert!(!store.update_task(TaskId::new(9), patch.as_object().unwrap()));
        assert_eq!(
            store.get(TaskId::new(1)).unwrap().get("status"),
            Some(&json!("paused"))
        );

        assert!(store.remove_task(TaskId::new(2)).is_some());
        assert!(store.remove_task(TaskId::new(2)).is_none());
        assert_eq!(ids(&store), vec![1]);

        store.set_loading(true);
        assert!(store.is_loading());
    }

    #[test]
    fn test_attach_listens_for_task_updates() {
        let bus = EventBus::new();
        let store = TaskStore::new();
        let callback = store.attach(&bus);

        bus.emit("task_update", &json!({"id": 5, "status": "running"}));
        assert_eq!(ids(&store), vec![5]);

        bus.off("task_update", &callback);
        bus.emit("task_update", &json!({"id": 6}));
        assert_eq!(ids(&store), vec![5]);
    }

    #[tokio::test]
    async fn test_watchers_are_notified() {
        let store = TaskStore::new();
        let mut rx = store.watch();

        store.apply_update(&json!({"id": 1, "status": "running"}));

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().tasks.len(), 1);
    }
}
