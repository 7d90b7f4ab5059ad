//! Inference dispatcher: the service that fans a prompt out to miners.
//!
//! The pipeline talks to it through [`InferenceDispatcher`] so tests and
//! alternative backends can stand in for the HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use coordination::TaskId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Endpoint;
use crate::errors::DispatchError;

/// Body of a dispatch call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchRequest {
    pub prompt: String,
    pub worker_count: u32,
    pub correlation_id: String,
}

#[derive(Debug, Deserialize)]
struct DispatchResponse {
    task_id: TaskId,
}

/// Point-in-time view of a dispatched task.
///
/// Arrays may be shorter than the requested worker count at any point
/// before the task completes. `outputs[i]` was produced by `worker_ids[i]`
/// when that entry exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskSnapshot {
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub worker_ids: Vec<String>,
    #[serde(default)]
    pub assigned_workers: Vec<String>,
}

impl TaskSnapshot {
    /// Number of non-blank outputs.
    pub fn payload_count(&self) -> usize {
        self.outputs.iter().filter(|o| !o.trim().is_empty()).count()
    }
}

/// Dispatches prompts to miners and reports their outputs.
#[async_trait]
pub trait InferenceDispatcher: Send + Sync {
    /// Dispatch a prompt; returns the task id.
    async fn dispatch(&self, request: &DispatchRequest) -> Result<TaskId, DispatchError>;

    /// Fetch the current outputs for a task.
    async fn snapshot(&self, task_id: &str) -> Result<TaskSnapshot, DispatchError>;
}

/// Map a non-success status to [`DispatchError::Status`].
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, DispatchError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(DispatchError::Status {
        status,
        body: coordination::ensemble::truncate_chars(&body, 300),
    })
}

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, DispatchError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| DispatchError::Request(format!("Failed to create HTTP client: {e}")))
}

pub(crate) fn authorize(
    builder: reqwest::RequestBuilder,
    endpoint: &Endpoint,
) -> reqwest::RequestBuilder {
    match endpoint.api_key.as_deref() {
        Some(key) => builder.bearer_auth(key),
        None => builder,
    }
}

/// JSON-over-HTTP dispatcher client.
///
/// `POST {base}/tasks` dispatches, `GET {base}/tasks/{id}` snapshots.
pub struct HttpDispatcher {
    endpoint: Endpoint,
    client: reqwest::Client,
}

impl HttpDispatcher {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Result<Self, DispatchError> {
        Ok(Self {
            endpoint,
            client: build_client(timeout)?,
        })
    }

    fn tasks_url(&self) -> String {
        format!("{}/tasks", self.endpoint.url.trim_end_matches('/'))
    }

    /// `{base}/tasks/{id}` with the id percent-encoded as one path segment.
    fn task_url(&self, task_id: &str) -> Result<reqwest::Url, DispatchError> {
        let mut url = reqwest::Url::parse(&self.tasks_url())
            .map_err(|e| DispatchError::Request(format!("Invalid dispatcher URL: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| DispatchError::Request("Dispatcher URL cannot take a path".to_string()))?
            .push(task_id);
        Ok(url)
    }
}

#[async_trait]
impl InferenceDispatcher for HttpDispatcher {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<TaskId, DispatchError> {
        let response = authorize(self.client.post(self.tasks_url()), &self.endpoint)
            .json(request)
            .send()
            .await?;
        let body: DispatchResponse = ensure_success(response).await?.json().await?;

        if body.task_id.trim().is_empty() {
            return Err(DispatchError::Parse("empty task_id".to_string()));
        }
        debug!(task_id = %body.task_id, workers = request.worker_count, "Task dispatched");
        Ok(body.task_id)
    }

    async fn snapshot(&self, task_id: &str) -> Result<TaskSnapshot, DispatchError> {
        let url = self.task_url(task_id)?;
        let response = authorize(self.client.get(url), &self.endpoint)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_defaults_missing_arrays() {
        let snap: TaskSnapshot = serde_json::from_str(r#"{"outputs":["a"," "]}"#).unwrap();
        assert_eq!(snap.outputs.len(), 2);
        assert!(snap.worker_ids.is_empty());
        assert!(snap.assigned_workers.is_empty());
        assert_eq!(snap.payload_count(), 1);
    }

    #[test]
    fn dispatch_request_serializes() {
        let req = DispatchRequest {
            prompt: "p".into(),
            worker_count: 3,
            correlation_id: "c".into(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["worker_count"], 3);
        assert_eq!(json["correlation_id"], "c");
    }

    #[test]
    fn tasks_url_trims_slash() {
        let d = HttpDispatcher::new(Endpoint::new("http://host:1/"), Duration::from_secs(1))
            .unwrap();
        assert_eq!(d.tasks_url(), "http://host:1/tasks");
    }

    #[test]
    fn task_url_encodes_id_as_one_segment() {
        let d = HttpDispatcher::new(Endpoint::new("http://host:1/api/"), Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            d.task_url("task-1").unwrap().as_str(),
            "http://host:1/api/tasks/task-1"
        );
        let url = d.task_url("a/b?c#d").unwrap();
        assert_eq!(url.as_str(), "http://host:1/api/tasks/a%2Fb%3Fc%23d");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);
    }

    #[test]
    fn task_url_rejects_unusable_base() {
        let d = HttpDispatcher::new(Endpoint::new("not a url"), Duration::from_secs(1)).unwrap();
        assert!(matches!(d.task_url("t"), Err(DispatchError::Request(_))));
    }
}
