//! Tasks — row-store contract, HTTP implementation and the local list store.
//!
//! ARCHITECTURE
//! ============
//! `TaskRepository` is the remote source of truth; `store::TaskStore` is the
//! per-user cache patched only after the repository confirms a write.

pub mod postgrest;
pub mod store;
pub mod types;

use uuid::Uuid;

pub use store::TaskStore;
pub use types::{NewTask, Task, TaskError, TaskPatch, TaskStats};

/// Row-store operations on the `tasks` table.
#[async_trait::async_trait]
pub trait TaskRepository: Send + Sync {
    /// All tasks owned by `user_id`, newest first.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] if the store rejects or cannot serve the query.
    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Task>, TaskError>;

    /// Insert and return the stored row with its assigned id and timestamps.
    ///
    /// # Errors
    ///
    /// Returns a [`TaskError`] if the insert is rejected.
    async fn insert(&self, task: NewTask) -> Result<Task, TaskError>;

    /// Apply `patch` to row `id` and return the updated row.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] if no such row exists.
    async fn update(&self, id: Uuid, patch: TaskPatch) -> Result<Task, TaskError>;

    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] if no such row exists.
    async fn delete(&self, id: Uuid) -> Result<(), TaskError>;
}
