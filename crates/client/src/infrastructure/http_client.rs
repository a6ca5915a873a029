//! REST client for the fuzzing server, implementing [`TaskApiPort`] with reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use fuzzboard_protocol::{DashboardStats, TaskId, TaskList, TaskRecord};

use crate::config::DEFAULT_API_URL;
use crate::ports::outbound::{ApiError, FuzzerCount, TaskApiPort};

/// Client for the server's `/tasks` and `/results` endpoints
#[derive(Clone)]
pub struct HttpTaskApi {
    client: Client,
    base_url: String,
}

impl HttpTaskApi {
    pub fn new(base_url: &str) -> Self {
        Self::with_timeout(base_url, 30)
    }

    pub fn with_timeout(base_url: &str, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        task_id: Option<TaskId>,
    ) -> Result<T, ApiError> {
        let mut request = self.client.get(self.url(path));
        if let Some(task_id) = task_id {
            request = request.query(&[("taskId", task_id.get())]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;
        decode(check(response).await?).await
    }

    async fn post_action(&self, path: &str, body: Option<Value>) -> Result<Value, ApiError> {
        let mut request = self.client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;
        decode(check(response).await?).await
    }
}

impl Default for HttpTaskApi {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

/// Turn a non-success status into `ApiError::Status`, preferring the server's
/// `{"error": ...}` message over the raw body.
async fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::RequestFailed(e.to_string()))?;
    Err(ApiError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    response
        .json()
        .await
        .map_err(|e| ApiError::InvalidResponse(e.to_string()))
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

#[async_trait]
impl TaskApiPort for HttpTaskApi {
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, ApiError> {
        let list: TaskList = self.get_json("/tasks", None).await?;
        tracing::debug!(total = list.total, "Fetched task list");
        Ok(list.tasks)
    }

    async fn get_task(&self, task_id: TaskId) -> Result<TaskRecord, ApiError> {
        self.get_json(&format!("/tasks/{task_id}"), None).await
    }

    async fn task_stats(&self, task_id: TaskId) -> Result<Value, ApiError> {
        self.get_json(&format!("/tasks/{task_id}/stats"), None).await
    }

    async fn delete_task(&self, task_id: TaskId) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.url(&format!("/tasks/{task_id}")))
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;
        check(response).await?;
        Ok(())
    }

    async fn start_task(&self, task_id: TaskId, fuzzers: FuzzerCount) -> Result<Value, ApiError> {
        self.post_action(
            &format!("/tasks/{task_id}/start"),
            Some(json!({ "fuzzer_count": fuzzers.get() })),
        )
        .await
    }

    async fn pause_task(&self, task_id: TaskId) -> Result<Value, ApiError> {
        self.post_action(&format!("/tasks/{task_id}/pause"), None)
            .await
    }

    async fn resume_task(&self, task_id: TaskId) -> Result<Value, ApiError> {
        self.post_action(&format!("/tasks/{task_id}/resume"), None)
            .await
    }

    async fn stop_task(&self, task_id: TaskId) -> Result<Value, ApiError> {
        self.post_action(&format!("/tasks/{task_id}/stop"), None)
            .await
    }

    async fn dashboard_stats(&self) -> Result<DashboardStats, ApiError> {
        self.get_json("/results/dashboard", None).await
    }

    async fn crashes(&self, task_id: Option<TaskId>) -> Result<Value, ApiError> {
        self.get_json("/results/crashes", task_id).await
    }

    async fn coverage(&self, task_id: Option<TaskId>) -> Result<Value, ApiError> {
        self.get_json("/results/coverage", task_id).await
    }

    async fn export_report(&self, task_id: Option<TaskId>) -> Result<Vec<u8>, ApiError> {
        let mut request = self.client.get(self.url("/results/export"));
        if let Some(task_id) = task_id {
            request = request.query(&[("taskId", task_id.get())]);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;
        let bytes = check(response)
            .await?
            .bytes()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let api = HttpTaskApi::new("http://localhost:5000/api/");
        assert_eq!(api.base_url(), "http://localhost:5000/api");
        assert_eq!(api.url("/tasks/3"), "http://localhost:5000/api/tasks/3");
    }

    #[test]
    fn test_error_message_prefers_error_field() {
        assert_eq!(error_message(r#"{"error": "task not found"}"#), "task not found");
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");
    }
}
