//! Typed views over inbound payloads.
//!
//! The client republishes payloads as raw JSON so unknown fields survive; these
//! types are for consumers that want to read specific fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::TaskId;

// =============================================================================
// Tasks
// =============================================================================

/// Lifecycle status of a fuzzing task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Uploading,
    Compiling,
    Ready,
    Running,
    Paused,
    Completed,
    Failed,
    Stopped,
    /// A status this client does not know yet
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// True once the task engine will not produce further updates
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Stopped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Uploading => "uploading",
            TaskStatus::Compiling => "compiling",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Stopped => "stopped",
            TaskStatus::Unknown => "unknown",
        }
    }
}

/// A `task_update` payload: a merge-patch for one task.
///
/// The task is identified by `id`; payloads produced by the task monitor use
/// `task_id` instead, which is accepted as an alias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    #[serde(alias = "task_id")]
    pub id: TaskId,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub stats: Option<Value>,
    /// Every other field, preserved for the merge
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One task as the server describes it.
///
/// Kept as a JSON object so fields this client does not model survive merges
/// and round-trips. Typed accessors cover the fields the client reads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskRecord(Map<String, Value>);

impl TaskRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build from any JSON value; `None` unless it is an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().cloned().map(Self)
    }

    /// Task id from `id`, falling back to `task_id`.
    pub fn id(&self) -> Option<TaskId> {
        self.0
            .get("id")
            .and_then(TaskId::from_json)
            .or_else(|| self.0.get("task_id").and_then(TaskId::from_json))
    }

    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    pub fn status(&self) -> Option<TaskStatus> {
        self.0
            .get("status")
            .and_then(|s| serde_json::from_value(s.clone()).ok())
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    /// Shallow merge: every top-level field of `patch` overwrites ours.
    pub fn merge(&mut self, patch: &Map<String, Value>) {
        for (key, value) in patch {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

/// Response of `GET /tasks`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaskList {
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,
    #[serde(default)]
    pub total: u64,
}

// =============================================================================
// Dashboard
// =============================================================================

/// Aggregate counters shown on the dashboard
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(default)]
    pub total_tasks: u64,
    #[serde(default)]
    pub running_tasks: u64,
    #[serde(default)]
    pub pending_tasks: u64,
    #[serde(default)]
    pub completed_tasks: u64,
    #[serde(default)]
    pub failed_tasks: u64,
    #[serde(default)]
    pub total_crashes: u64,
    #[serde(default)]
    pub total_executions: u64,
    #[serde(default)]
    pub avg_coverage: f64,
}

/// A `dashboard_update` payload: always a complete aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardUpdate {
    pub stats: DashboardStats,
    #[serde(default)]
    pub timestamp: Option<String>,
}

// =============================================================================
// Heartbeat / errors
// =============================================================================

/// Heartbeat reply
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Pong {
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Server-reported error, shown to the user verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    #[serde(default)]
    pub message: String,
}
