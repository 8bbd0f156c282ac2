//! taskdeck — session and task-list core for a hosted-backend to-do app.
//!
//! ARCHITECTURE
//! ============
//! - `auth` talks to the identity provider and publishes auth events.
//! - `session::SessionManager` turns those events into one observable
//!   identity and handles the sign-out redirect through `navigation`.
//! - `tasks::TaskStore` follows that identity and keeps the user's task list
//!   in step with the row store.

pub mod auth;
pub mod config;
pub mod navigation;
pub mod session;
pub mod storage;
pub mod tasks;

#[cfg(test)]
mod test_helpers;

pub use config::BackendConfig;
pub use session::{SessionManager, SessionState};
pub use tasks::TaskStore;
