//! Task list store — the signed-in user's tasks as last confirmed by the row
//! store.
//!
//! DESIGN
//! ======
//! The local list is a cache that is only patched after the repository
//! confirms a write (no optimistic updates). Every patch is keyed by task id,
//! so concurrent mutations on different tasks never clobber each other. Two
//! responses for the same task, or two overlapping fetches, resolve as
//! last-response-wins.
//!
//! Each call captures the user it was issued for. A response that lands after
//! the user changed (sign-out, account switch) is dropped, so the list only
//! ever holds rows of the current user.
//!
//! Errors go into a single most-recent-error slot; any later success clears
//! it. The lock is a `std::sync::Mutex` held only for in-memory updates,
//! never across an await.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::TaskRepository;
use super::types::{NewTask, Task, TaskError, TaskPatch, TaskStats};
use crate::auth::User;
use crate::session::SessionState;

pub const MSG_TITLE_REQUIRED: &str = "Title is required";
pub const MSG_UPDATE_FAILED: &str = "Failed to update task";
pub const MSG_DELETE_FAILED: &str = "Failed to delete task";

struct StoreState {
    user: Option<User>,
    tasks: Vec<Task>,
    last_error: Option<String>,
    loading: bool,
    refreshing: bool,
}

impl StoreState {
    fn user_id(&self) -> Option<Uuid> {
        self.user.as_ref().map(|u| u.id)
    }
}

/// Cheap-to-clone handle; all clones share one list.
#[derive(Clone)]
pub struct TaskStore {
    repo: Arc<dyn TaskRepository>,
    state: Arc<Mutex<StoreState>>,
}

impl TaskStore {
    #[must_use]
    pub fn new(repo: Arc<dyn TaskRepository>) -> Self {
        Self {
            repo,
            state: Arc::new(Mutex::new(StoreState {
                user: None,
                tasks: Vec::new(),
                last_error: None,
                loading: true,
                refreshing: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // =========================================================================
    // IDENTITY
    // =========================================================================

    /// Switch the store to `user`. Returns `true` when the identity changed
    /// to a present user, i.e. when the caller should fetch.
    pub fn set_user(&self, user: Option<User>) -> bool {
        let mut state = self.lock();
        let next_id = user.as_ref().map(|u| u.id);
        if state.user_id() == next_id {
            state.user = user;
            return false;
        }
        debug!(from = ?state.user_id(), to = ?next_id, "task store user changed");
        state.user = user;
        state.tasks.clear();
        state.last_error = None;
        state.loading = next_id.is_some();
        state.refreshing = false;
        next_id.is_some()
    }

    /// Keep the store in step with the session: every identity change
    /// (including absent to present) clears the list and refetches.
    ///
    /// Fetches run on their own tasks so the next identity change is applied
    /// immediately; a fetch that lands after it is discarded by `fetch`.
    pub fn follow_session(&self, mut session: watch::Receiver<SessionState>) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            loop {
                let user = session.borrow_and_update().user().cloned();
                if store.set_user(user) {
                    let fetcher = store.clone();
                    tokio::spawn(async move {
                        let _ = fetcher.fetch().await;
                    });
                }
                if session.changed().await.is_err() {
                    debug!("session channel closed; task store stops following");
                    break;
                }
            }
        })
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Load the current user's tasks, newest first. Without a user this only
    /// clears the loading flags.
    ///
    /// On failure the previous list is kept and the error is recorded.
    ///
    /// # Errors
    ///
    /// Returns the repository's error.
    pub async fn fetch(&self) -> Result<(), TaskError> {
        let current = self.lock().user_id();
        let Some(user_id) = current else {
            let mut state = self.lock();
            state.loading = false;
            state.refreshing = false;
            return Ok(());
        };

        let result = self.repo.list_for_user(user_id).await;

        let mut state = self.lock();
        if state.user_id() != Some(user_id) {
            debug!(%user_id, "discarding task list fetched for a previous user");
            return result.map(|_| ());
        }
        state.loading = false;
        state.refreshing = false;
        match result {
            Ok(tasks) => {
                debug!(%user_id, count = tasks.len(), "task list replaced");
                state.tasks = tasks;
                state.last_error = None;
                Ok(())
            }
            Err(e) => {
                warn!(%user_id, error = %e, "task fetch failed; keeping previous list");
                state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Pull-to-refresh: flag `refreshing` for the duration of a fetch.
    ///
    /// # Errors
    ///
    /// Returns the repository's error.
    pub async fn refresh(&self) -> Result<(), TaskError> {
        self.lock().refreshing = true;
        self.fetch().await
    }

    // =========================================================================
    // WRITES
    // =========================================================================

    /// # Errors
    ///
    /// [`TaskError::Validation`] for a blank title (no repository call),
    /// [`TaskError::NotSignedIn`] without a user, otherwise the repository's
    /// error.
    pub async fn create(&self, title: &str, description: &str) -> Result<Task, TaskError> {
        let title = self.require_title(title)?;
        let user_id = self.require_user()?;
        let new_task = NewTask { title, description: description.trim().to_owned(), user_id };

        let result = self.repo.insert(new_task).await;
        let task = self.settle(user_id, result, None, |tasks, task| tasks.insert(0, task.clone()))?;
        info!(task_id = %task.id, "task created");
        Ok(task)
    }

    /// Replace title and description of task `id`.
    ///
    /// # Errors
    ///
    /// Same as [`TaskStore::create`], plus [`TaskError::NotFound`].
    pub async fn update(&self, id: Uuid, title: &str, description: &str) -> Result<Task, TaskError> {
        let title = self.require_title(title)?;
        let user_id = self.require_user()?;

        let result = self.repo.update(id, TaskPatch::edit(title, description.trim())).await;
        self.settle(user_id, result, None, |tasks, updated| replace_by_id(tasks, updated))
    }

    /// Flip `completed` on the stored task with `task.id`.
    ///
    /// # Errors
    ///
    /// Returns the repository's error; the list is left unchanged and the
    /// error slot reads [`MSG_UPDATE_FAILED`].
    pub async fn toggle_complete(&self, task: &Task) -> Result<Task, TaskError> {
        let user_id = self.require_user()?;
        let completed = !task.completed;

        let result = self.repo.update(task.id, TaskPatch::completed(completed)).await;
        self.settle(user_id, result, Some(MSG_UPDATE_FAILED), |tasks, updated| {
            if let Some(entry) = tasks.iter_mut().find(|t| t.id == updated.id) {
                entry.completed = completed;
                entry.updated_at = updated.updated_at;
            }
        })
    }

    /// # Errors
    ///
    /// Returns the repository's error (including [`TaskError::NotFound`]); the
    /// list is left unchanged and the error slot reads [`MSG_DELETE_FAILED`].
    pub async fn delete(&self, id: Uuid) -> Result<(), TaskError> {
        let user_id = self.require_user()?;

        let result = self.repo.delete(id).await;
        self.settle(user_id, result, Some(MSG_DELETE_FAILED), |tasks, _| tasks.retain(|t| t.id != id))?;
        info!(task_id = %id, "task deleted");
        Ok(())
    }

    fn require_title(&self, title: &str) -> Result<String, TaskError> {
        let title = title.trim();
        if title.is_empty() {
            self.lock().last_error = Some(MSG_TITLE_REQUIRED.into());
            return Err(TaskError::Validation(MSG_TITLE_REQUIRED.into()));
        }
        Ok(title.to_owned())
    }

    fn require_user(&self) -> Result<Uuid, TaskError> {
        let mut state = self.lock();
        state.user_id().ok_or_else(|| {
            state.last_error = Some(TaskError::NotSignedIn.to_string());
            TaskError::NotSignedIn
        })
    }

    /// Apply a confirmed write to the local list, or record its failure.
    /// Responses for a user other than the current one touch nothing.
    fn settle<T>(
        &self,
        issued_for: Uuid,
        result: Result<T, TaskError>,
        failure_message: Option<&str>,
        apply: impl FnOnce(&mut Vec<Task>, &T),
    ) -> Result<T, TaskError> {
        let mut state = self.lock();
        if state.user_id() != Some(issued_for) {
            debug!(%issued_for, "discarding task response for a previous user");
            return result;
        }
        match &result {
            Ok(value) => {
                apply(&mut state.tasks, value);
                state.last_error = None;
            }
            Err(e) => {
                warn!(error = %e, "task operation failed");
                state.last_error = Some(failure_message.map_or_else(|| e.to_string(), str::to_owned));
            }
        }
        result
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.lock().loading
    }

    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        self.lock().refreshing
    }

    #[must_use]
    pub fn stats(&self) -> TaskStats {
        TaskStats::from_tasks(&self.lock().tasks)
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.lock().user.clone()
    }
}

fn replace_by_id(tasks: &mut [Task], updated: &Task) {
    if let Some(entry) = tasks.iter_mut().find(|t| t.id == updated.id) {
        *entry = updated.clone();
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
