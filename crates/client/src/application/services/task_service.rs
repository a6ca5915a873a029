//! Task Service - task list, detail and lifecycle use cases
//!
//! Goes through [`TaskApiPort`] for every request and keeps the [`TaskStore`]
//! and [`DashboardState`] in step with the results. Live progress arrives
//! separately as `task_update` events.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use fuzzboard_protocol::{TaskId, TaskRecord, TaskStatus};

use crate::ports::outbound::{ApiError, FuzzerCount, TaskApiPort};
use crate::state::{DashboardState, TaskStore};

/// Lifecycle transition requested by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskAction {
    Start(FuzzerCount),
    Pause,
    Resume,
    Stop,
}

impl TaskAction {
    /// Status shown until the server's own update arrives
    pub fn expected_status(self) -> TaskStatus {
        match self {
            TaskAction::Start(_) | TaskAction::Resume => TaskStatus::Running,
            TaskAction::Pause => TaskStatus::Paused,
            TaskAction::Stop => TaskStatus::Stopped,
        }
    }
}

#[derive(Clone)]
pub struct TaskService {
    api: Arc<dyn TaskApiPort>,
    store: TaskStore,
    dashboard: DashboardState,
}

impl TaskService {
    pub fn new(api: Arc<dyn TaskApiPort>, store: TaskStore, dashboard: DashboardState) -> Self {
        Self {
            api,
            store,
            dashboard,
        }
    }

    pub fn api(&self) -> &Arc<dyn TaskApiPort> {
        &self.api
    }

    /// Reload the task list. Returns the number of tasks.
    pub async fn refresh(&self) -> Result<usize, ApiError> {
        self.store.set_loading(true);
        let result = self.api.list_tasks().await;
        self.store.set_loading(false);

        let tasks = result.inspect_err(|e| tracing::error!("Failed to load tasks: {}", e))?;
        let count = tasks.len();
        self.store.set_tasks(tasks);
        tracing::info!(count, "Task list refreshed");
        Ok(count)
    }

    /// Fetch one task and make it the current task.
    pub async fn load_detail(&self, task_id: TaskId) -> Result<TaskRecord, ApiError> {
        let task = self.api.get_task(task_id).await?;
        self.store.update_task(task_id, task.fields());
        self.store.set_current_task(Some(task.clone()));
        Ok(task)
    }

    /// Run a lifecycle transition and patch the local status on success.
    pub async fn transition(&self, task_id: TaskId, action: TaskAction) -> Result<Value, ApiError> {
        let response = match action {
            TaskAction::Start(fuzzers) => self.api.start_task(task_id, fuzzers).await,
            TaskAction::Pause => self.api.pause_task(task_id).await,
            TaskAction::Resume => self.api.resume_task(task_id).await,
            TaskAction::Stop => self.api.stop_task(task_id).await,
        }
        .inspect_err(|e| tracing::warn!(%task_id, ?action, "Task transition failed: {}", e))?;

        let mut patch = Map::new();
        patch.insert(
            "status".to_string(),
            json!(action.expected_status().as_str()),
        );
        self.store.update_task(task_id, &patch);
        tracing::info!(%task_id, ?action, "Task transition accepted");
        Ok(response)
    }

    pub async fn start(&self, task_id: TaskId, fuzzers: FuzzerCount) -> Result<Value, ApiError> {
        self.transition(task_id, TaskAction::Start(fuzzers)).await
    }

    pub async fn pause(&self, task_id: TaskId) -> Result<Value, ApiError> {
        self.transition(task_id, TaskAction::Pause).await
    }

    pub async fn resume(&self, task_id: TaskId) -> Result<Value, ApiError> {
        self.transition(task_id, TaskAction::Resume).await
    }

    pub async fn stop(&self, task_id: TaskId) -> Result<Value, ApiError> {
        self.transition(task_id, TaskAction::Stop).await
    }

    pub async fn delete(&self, task_id: TaskId) -> Result<(), ApiError> {
        self.api.delete_task(task_id).await?;
        self.store.remove_task(task_id);
        if self.store.current().and_then(|t| t.id()) == Some(task_id) {
            self.store.set_current_task(None);
        }
        Ok(())
    }

    /// Seed the dashboard snapshot over REST; pushes replace it later.
    pub async fn refresh_dashboard(&self) -> Result<(), ApiError> {
        let stats = self.api.dashboard_stats().await?;
        let snapshot =
            serde_json::to_value(stats).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        self.dashboard.replace(snapshot);
        Ok(())
    }
}
