//! Persistence collaborator boundary
//!
//! The engine never talks to a datastore directly: it produces validated,
//! minimal field sets and trusts the collaborator behind [`TaskStore`] to
//! apply them durably and return the canonical post-write record. `updated_at`
//! on persisted records always comes from the collaborator; the engine's own
//! clock is used only for optimistic pre-confirmation values.

use std::sync::Arc;

use reqwest::Client as ReqwestClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::StoreError;
use crate::task::{Task, TaskDraft, TaskPatch};

/// The authoritative store for one owner's task records.
#[async_trait::async_trait]
pub trait TaskStore: Send + Sync {
    /// All task records for the owner this store is scoped to, in no
    /// particular order.
    async fn fetch(&self) -> Result<Vec<Task>, StoreError>;

    /// Durably creates a task and returns the canonical record, with the
    /// server-assigned id and timestamps.
    async fn create(&self, draft: TaskDraft) -> Result<Task, StoreError>;

    /// Applies a partial update and returns the canonical post-write record.
    async fn patch(&self, id: &str, patch: TaskPatch) -> Result<Task, StoreError>;

    /// Durably deletes a task.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}

/// HTTP store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub base_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Error envelope returned by the tasks API.
#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct TasksEnvelope {
    tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
struct TaskEnvelope {
    task: Task,
}

/// A [`TaskStore`] speaking the tasks HTTP API (`/api/tasks`), scoped to the
/// owner the underlying session is authenticated as.
#[derive(Debug, Clone)]
pub struct HttpStore {
    http_client: Arc<ReqwestClient>,
    config: StoreConfig,
}

impl HttpStore {
    /// Creates a store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates a store with a custom configuration.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            http_client: Arc::new(ReqwestClient::new()),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => Err(StoreError::Api {
                code: envelope.error.code,
                message: envelope.error.message,
            }),
            Err(_) => Err(StoreError::Api {
                code: "http_error".to_string(),
                message: format!("HTTP error: {status}"),
            }),
        }
    }
}

impl Default for HttpStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TaskStore for HttpStore {
    async fn fetch(&self) -> Result<Vec<Task>, StoreError> {
        let response = self
            .http_client
            .get(self.url("/api/tasks"))
            .send()
            .await?;
        let envelope: TasksEnvelope = Self::decode(response).await?;
        Ok(envelope.tasks)
    }

    async fn create(&self, draft: TaskDraft) -> Result<Task, StoreError> {
        let response = self
            .http_client
            .post(self.url("/api/tasks"))
            .json(&draft)
            .send()
            .await?;
        let envelope: TaskEnvelope = Self::decode(response).await?;
        Ok(envelope.task)
    }

    async fn patch(&self, id: &str, patch: TaskPatch) -> Result<Task, StoreError> {
        let response = self
            .http_client
            .patch(self.url(&format!("/api/tasks/{id}")))
            .json(&patch)
            .send()
            .await?;
        let envelope: TaskEnvelope = Self::decode(response).await?;
        Ok(envelope.task)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let response = self
            .http_client
            .delete(self.url(&format!("/api/tasks/{id}")))
            .send()
            .await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => Err(StoreError::Api {
                code: envelope.error.code,
                message: envelope.error.message,
            }),
            Err(_) => Err(StoreError::Api {
                code: "http_error".to_string(),
                message: format!("HTTP error: {status}"),
            }),
        }
    }
}
