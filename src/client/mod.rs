//! Remote task client.
//!
//! Fetch and submit both go to the same endpoint: an empty body pulls a
//! task, a body with the two results and the task id submits one. The
//! service signals success with `code == 0` in the response body; HTTP 401
//! means the credential is no longer accepted and is surfaced immediately
//! so the worker can refresh instead of burning retry attempts.

pub mod retry;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::compute::{TaskResult, TaskSpec};
use crate::error::ClientError;
use crate::shutdown::Shutdown;
use crate::token::claims;

pub use retry::{RetryPolicy, Retryable};

/// Seam for the remote task operations, mockable in worker tests.
#[async_trait]
pub trait TaskApi: Send + Sync {
    /// Pull one unit of work for `token`.
    async fn fetch_task(&self, token: &str, shutdown: &Shutdown)
    -> Result<TaskSpec, ClientError>;

    /// Submit the computed result for `task_id`.
    async fn submit_result(
        &self,
        token: &str,
        result: &TaskResult,
        task_id: &str,
        shutdown: &Shutdown,
    ) -> Result<(), ClientError>;
}

/// HTTP client for the open_compute task service.
pub struct TaskClient {
    http: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl TaskClient {
    pub fn new(http: Client, base_url: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            retry,
        }
    }

    fn task_url(&self) -> String {
        format!("{}/open_compute/finish/task", self.base_url)
    }

    /// One fetch attempt, cancellable by shutdown.
    async fn fetch_once(&self, token: &str, shutdown: &Shutdown) -> Result<TaskSpec, ClientError> {
        let request = async {
            let resp = self
                .http
                .post(self.task_url())
                .header("token", token)
                .json(&serde_json::json!({}))
                .send()
                .await?;

            if resp.status().as_u16() == 401 {
                return Err(ClientError::CredentialRejected);
            }

            let body: ApiResponse<TaskData> = resp.json().await?;
            if body.code != 0 {
                return Err(ClientError::ServiceCode { code: body.code });
            }
            let data = body.data.ok_or_else(|| ClientError::InvalidResponse {
                reason: "fetch response has code 0 but no data".to_string(),
            })?;

            Ok(TaskSpec {
                matrix_size: data.matrix_size,
                seed1: data.seed1,
                seed2: data.seed2,
                task_id: data.task_id,
            })
        };

        tokio::select! {
            result = request => result,
            _ = shutdown.wait() => Err(ClientError::Cancelled),
        }
    }

    /// One submit attempt, cancellable by shutdown.
    async fn submit_once(
        &self,
        token: &str,
        result: &TaskResult,
        task_id: &str,
        shutdown: &Shutdown,
    ) -> Result<(), ClientError> {
        let payload = serde_json::json!({
            "result_1": format!("{:.10}", result.r1),
            "result_2": format!("{:.10}", result.r2),
            "task_id": task_id,
        });

        let request = async {
            let resp = self
                .http
                .post(self.task_url())
                .header("token", token)
                .json(&payload)
                .send()
                .await?;

            if resp.status().as_u16() == 401 {
                return Err(ClientError::CredentialRejected);
            }

            let body: ApiResponse<SubmitData> = resp.json().await?;
            if body.code != 0 {
                return Err(ClientError::ServiceCode { code: body.code });
            }
            // Acceptance needs the explicit flag on top of code 0.
            if !body.data.map(|d| d.calc_status).unwrap_or(false) {
                return Err(ClientError::InvalidResponse {
                    reason: "result not accepted (calc_status false)".to_string(),
                });
            }
            Ok(())
        };

        tokio::select! {
            result = request => result,
            _ = shutdown.wait() => Err(ClientError::Cancelled),
        }
    }
}

#[async_trait]
impl TaskApi for TaskClient {
    async fn fetch_task(
        &self,
        token: &str,
        shutdown: &Shutdown,
    ) -> Result<TaskSpec, ClientError> {
        let token_label = claims::label(token);
        let result = self
            .retry
            .run(shutdown, |attempt| {
                if attempt > 0 {
                    tracing::debug!(token = %token_label, attempt, "retrying task fetch");
                }
                self.fetch_once(token, shutdown)
            })
            .await;

        match result {
            Ok(task) => {
                tracing::info!(
                    token = %token_label,
                    task_id = %task.task_id,
                    matrix_size = task.matrix_size,
                    "task received"
                );
                Ok(task)
            }
            Err(e @ (ClientError::CredentialRejected | ClientError::Cancelled)) => Err(e),
            Err(e) => Err(ClientError::FetchFailed {
                attempts: self.retry.max_attempts,
                reason: e.to_string(),
            }),
        }
    }

    async fn submit_result(
        &self,
        token: &str,
        result: &TaskResult,
        task_id: &str,
        shutdown: &Shutdown,
    ) -> Result<(), ClientError> {
        let token_label = claims::label(token);
        let outcome = self
            .retry
            .run(shutdown, |attempt| {
                if attempt > 0 {
                    tracing::debug!(token = %token_label, attempt, "retrying result submission");
                }
                self.submit_once(token, result, task_id, shutdown)
            })
            .await;

        match outcome {
            Ok(()) => {
                tracing::info!(token = %token_label, task_id, "result accepted");
                Ok(())
            }
            Err(e @ (ClientError::CredentialRejected | ClientError::Cancelled)) => Err(e),
            Err(e) => Err(ClientError::SubmitFailed {
                attempts: self.retry.max_attempts,
                reason: e.to_string(),
            }),
        }
    }
}

// Wire types for the task endpoint.

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    code: i64,
    // Missing field deserializes as None; no default attribute, which would
    // put a Default bound on T.
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TaskData {
    matrix_size: usize,
    seed1: u64,
    seed2: u64,
    task_id: String,
}

#[derive(Debug, Deserialize)]
struct SubmitData {
    #[serde(default)]
    calc_status: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_response_parses() {
        let body = r#"{"code":0,"data":{"matrix_size":2,"seed1":1,"seed2":2,"task_id":"t-9"}}"#;
        let parsed: ApiResponse<TaskData> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.code, 0);
        let data = parsed.data.unwrap();
        assert_eq!(data.matrix_size, 2);
        assert_eq!(data.task_id, "t-9");
    }

    #[test]
    fn test_error_response_without_data_parses() {
        let body = r#"{"code":1102}"#;
        let parsed: ApiResponse<TaskData> = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.code, 1102);
        assert!(parsed.data.is_none());
    }

    #[test]
    fn test_null_data_parses_for_both_payload_types() {
        // The envelope must deserialize without data even though the data
        // structs themselves have no Default.
        let body = r#"{"code":7,"data":null}"#;
        let as_task: ApiResponse<TaskData> = serde_json::from_str(body).unwrap();
        assert!(as_task.data.is_none());
        let as_submit: ApiResponse<SubmitData> = serde_json::from_str(body).unwrap();
        assert!(as_submit.data.is_none());
    }

    #[test]
    fn test_submit_response_defaults_calc_status_false() {
        let body = r#"{"code":0,"data":{}}"#;
        let parsed: ApiResponse<SubmitData> = serde_json::from_str(body).unwrap();
        assert!(!parsed.data.unwrap().calc_status);
    }
}
