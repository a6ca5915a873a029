//! REST facade of the fuzzing server.
//!
//! Request/response only; the real-time client never goes through here.

use async_trait::async_trait;
use serde_json::Value;

use fuzzboard_protocol::{DashboardStats, TaskId, TaskRecord};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("API request failed: {0}")]
    RequestFailed(String),
    /// Non-success status; `message` is the server's `error` field when present
    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::Status { status: 404, .. })
    }
}

/// Number of parallel fuzzer instances for a task start (1 to 10)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzerCount(u8);

impl FuzzerCount {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;

    pub fn new(count: u8) -> Result<Self, ApiError> {
        if (Self::MIN..=Self::MAX).contains(&count) {
            Ok(Self(count))
        } else {
            Err(ApiError::InvalidArgument(format!(
                "fuzzer count must be between {} and {}, got {count}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for FuzzerCount {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TaskApiPort: Send + Sync {
    // Tasks
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, ApiError>;
    async fn get_task(&self, task_id: TaskId) -> Result<TaskRecord, ApiError>;
    async fn task_stats(&self, task_id: TaskId) -> Result<Value, ApiError>;
    async fn delete_task(&self, task_id: TaskId) -> Result<(), ApiError>;

    // Lifecycle
    async fn start_task(&self, task_id: TaskId, fuzzers: FuzzerCount) -> Result<Value, ApiError>;
    async fn pause_task(&self, task_id: TaskId) -> Result<Value, ApiError>;
    async fn resume_task(&self, task_id: TaskId) -> Result<Value, ApiError>;
    async fn stop_task(&self, task_id: TaskId) -> Result<Value, ApiError>;

    // Results
    async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError>;
    async fn crashes(&self, task_id: Option<TaskId>) -> Result<Value, ApiError>;
    async fn coverage(&self, task_id: Option<TaskId>) -> Result<Value, ApiError>;
    async fn export_report(&self, task_id: Option<TaskId>) -> Result<Vec<u8>, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuzzer_count_bounds() {
        assert!(FuzzerCount::new(0).is_err());
        assert_eq!(FuzzerCount::new(1).unwrap().get(), 1);
        assert_eq!(FuzzerCount::new(10).unwrap().get(), 10);
        assert!(matches!(
            FuzzerCount::new(11),
            Err(ApiError::InvalidArgument(_))
        ));
        assert_eq!(FuzzerCount::default().get(), 1);
    }
}
