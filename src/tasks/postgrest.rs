//! Row-store client for the `tasks` table (`/rest/v1/tasks`).
//!
//! Thin HTTP wrapper over the REST filter syntax (`col=eq.value`,
//! `order=col.desc`). Writes ask for `Prefer: return=representation` so the
//! caller always gets the stored row back; an empty representation on
//! update/delete means the row was not visible, i.e. not found.
//!
//! Requests carry the signed-in user's access token so row-level security
//! applies; without a session the anon key is used.

use std::sync::Arc;
use std::time::Duration;

use reqwest::RequestBuilder;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::TaskRepository;
use super::types::{NewTask, Task, TaskError, TaskPatch};
use crate::auth::AuthClient;
use crate::config::BackendConfig;

const TABLE: &str = "tasks";
const RETURN_REPRESENTATION: &str = "return=representation";

pub struct PostgrestTaskRepository {
    http: reqwest::Client,
    config: BackendConfig,
    auth: Arc<dyn AuthClient>,
}

impl PostgrestTaskRepository {
    /// # Errors
    ///
    /// Returns [`TaskError::InvalidResponse`] if the HTTP client cannot be built.
    pub fn new(config: BackendConfig, auth: Arc<dyn AuthClient>) -> Result<Self, TaskError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| TaskError::InvalidResponse(format!("http client build failed: {e}")))?;
        Ok(Self { http, config, auth })
    }

    fn table_url(&self) -> String {
        format!("{}/{TABLE}", self.config.rest_url())
    }

    async fn bearer(&self) -> String {
        match self.auth.get_session().await {
            Ok(Some(session)) => session.access_token,
            Ok(None) => self.config.anon_key.clone(),
            Err(e) => {
                warn!(error = %e, "no usable session for task request; using anon key");
                self.config.anon_key.clone()
            }
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<String, TaskError> {
        let response = request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(self.bearer().await)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;

        if !(200..300).contains(&status) {
            return Err(parse_error(status, &text));
        }
        Ok(text)
    }
}

fn transport_error(e: reqwest::Error) -> TaskError {
    warn!(error = %e, "task request failed");
    TaskError::Transport
}

fn id_filter(id: Uuid) -> [(&'static str, String); 1] {
    [("id", format!("eq.{id}"))]
}

#[async_trait::async_trait]
impl TaskRepository for PostgrestTaskRepository {
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Task>, TaskError> {
        let query = [
            ("select", "*".to_owned()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "created_at.desc".to_owned()),
        ];
        let body = self.send(self.http.get(self.table_url()).query(&query)).await?;
        let tasks = parse_rows(&body)?;
        debug!(%user_id, count = tasks.len(), "tasks fetched");
        Ok(tasks)
    }

    async fn insert(&self, task: NewTask) -> Result<Task, TaskError> {
        let request = self.http.post(self.table_url()).header("Prefer", RETURN_REPRESENTATION).json(&[task]);
        let body = self.send(request).await?;
        parse_rows(&body)?
            .into_iter()
            .next()
            .ok_or_else(|| TaskError::InvalidResponse("insert returned no row".into()))
    }

    async fn update(&self, id: Uuid, patch: TaskPatch) -> Result<Task, TaskError> {
        let request = self
            .http
            .patch(self.table_url())
            .query(&id_filter(id))
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&patch);
        let body = self.send(request).await?;
        parse_rows(&body)?.into_iter().next().ok_or(TaskError::NotFound(id))
    }

    async fn delete(&self, id: Uuid) -> Result<(), TaskError> {
        let request = self
            .http
            .delete(self.table_url())
            .query(&id_filter(id))
            .header("Prefer", RETURN_REPRESENTATION);
        let body = self.send(request).await?;
        if parse_rows(&body)?.is_empty() {
            return Err(TaskError::NotFound(id));
        }
        Ok(())
    }
}

// =============================================================================
// PARSING
// =============================================================================

pub(crate) fn parse_rows(json: &str) -> Result<Vec<Task>, TaskError> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(json).map_err(|e| TaskError::InvalidResponse(e.to_string()))
}

/// Error bodies look like `{"code","message","details","hint"}`.
pub(crate) fn parse_error(status: u16, body: &str) -> TaskError {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let field = |name: &str| {
        parsed
            .as_ref()
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    };
    let Some(mut message) = field("message") else {
        return TaskError::Rejected { status, message: format!("Request failed with status {status}") };
    };
    if let Some(details) = field("details") {
        message = format!("{message} ({details})");
    }
    if let Some(hint) = field("hint") {
        message = format!("{message}. Hint: {hint}");
    }
    TaskError::Rejected { status, message }
}

#[cfg(test)]
#[path = "postgrest_test.rs"]
mod tests;
