//! Task types — the `tasks` row, write payloads, errors and list stats.

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;
use time::macros::format_description;
use uuid::Uuid;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// Required input was missing; raised before any network call.
    #[error("{0}")]
    Validation(String),

    /// No row with this id is visible to the current user.
    #[error("task {0} not found")]
    NotFound(Uuid),

    /// The row store refused the request.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The row store could not be reached.
    #[error("Unable to reach the task service")]
    Transport,

    /// The row store answered with a body we could not understand.
    #[error("unexpected response from the task service: {0}")]
    InvalidResponse(String),

    /// A task operation was attempted without a signed-in user.
    #[error("not signed in")]
    NotSignedIn,
}

// =============================================================================
// ROW
// =============================================================================

/// One row of the `tasks` table. Ids and timestamps are assigned remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Insert payload. The store fills `id`, `completed` and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub user_id: Uuid,
}

/// Partial update; `None` fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

impl TaskPatch {
    #[must_use]
    pub fn edit(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self { title: Some(title.into()), description: Some(description.into()), completed: None }
    }

    #[must_use]
    pub fn completed(completed: bool) -> Self {
        Self { completed: Some(completed), ..Self::default() }
    }

    /// Apply the set fields to `task`. Timestamps are the store's business.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
    }
}

// =============================================================================
// STATS / DISPLAY
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Percentage of completed tasks, rounded half up; `0` for no tasks.
    pub completion_rate: usize,
}

impl TaskStats {
    #[must_use]
    pub fn from_tasks(tasks: &[Task]) -> Self {
        let total = tasks.len();
        let completed = tasks.iter().filter(|t| t.completed).count();
        let completion_rate = if total == 0 { 0 } else { (completed * 200 + total) / (total * 2) };
        Self { total, completed, pending: total - completed, completion_rate }
    }
}

/// Coarse relative age: `Just now`, `5h ago`, `3d ago`, `2w ago`.
#[must_use]
pub fn time_ago(created_at: OffsetDateTime, now: OffsetDateTime) -> String {
    let hours = (now - created_at).whole_hours();
    if hours < 1 {
        return "Just now".into();
    }
    if hours < 24 {
        return format!("{hours}h ago");
    }
    let days = hours / 24;
    if days < 7 {
        return format!("{days}d ago");
    }
    format!("{}w ago", days / 7)
}

/// `May 1, 2024`
#[must_use]
pub fn short_date(at: OffsetDateTime) -> String {
    at.format(format_description!("[month repr:short] [day padding:none], [year]"))
        .unwrap_or_else(|_| at.date().to_string())
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
