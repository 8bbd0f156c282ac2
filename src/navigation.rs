//! Navigation contract used by auth-driven redirects.
//!
//! SYSTEM CONTEXT
//! ==============
//! The session manager never renders anything; it only asks the host to move
//! between entry screens. Hosts implement [`Navigator`] with two operations:
//! reset the history and go somewhere, or simply go somewhere.

use std::sync::{Mutex, PoisonError};

use tracing::{error, info, warn};

use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Tasks,
}

impl Route {
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "/(auth)/login",
            Self::Tasks => "/(tabs)",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("navigation to {route} failed: {reason}")]
pub struct NavigationError {
    pub route: Route,
    pub reason: String,
}

pub trait Navigator: Send + Sync {
    /// Drop the navigation history and show `route`.
    ///
    /// # Errors
    ///
    /// Returns a [`NavigationError`] if the host cannot reset its stack.
    fn reset_and_go_to(&self, route: Route) -> Result<(), NavigationError>;

    /// Push `route` on top of the current history.
    ///
    /// # Errors
    ///
    /// Returns a [`NavigationError`] if the host cannot navigate.
    fn go_to(&self, route: Route) -> Result<(), NavigationError>;
}

/// Where the launch screen should send the user, or `None` while the
/// session is still being resolved.
#[must_use]
pub fn entry_route(state: &SessionState) -> Option<Route> {
    if state.loading {
        return None;
    }
    Some(if state.user().is_some() { Route::Tasks } else { Route::Login })
}

/// Guarded screens bounce to login once auth has loaded without a user.
#[must_use]
pub fn should_redirect_unauth(state: &SessionState) -> bool {
    !state.loading && state.user().is_none()
}

/// Best-effort post-sign-out redirect: reset to login, else plain navigate.
/// Never retries beyond the single fallback.
pub fn redirect_to_login(navigator: &dyn Navigator) {
    info!("redirecting to login after sign out");
    if let Err(e) = navigator.reset_and_go_to(Route::Login) {
        warn!(error = %e, "navigation reset failed; falling back to plain navigation");
        if let Err(e) = navigator.go_to(Route::Login) {
            error!(error = %e, "fallback navigation failed");
        }
    }
}

// =============================================================================
// LOG NAVIGATOR
// =============================================================================

/// Headless navigator: keeps a route history and logs each move.
#[derive(Default)]
pub struct LogNavigator {
    history: Mutex<Vec<Route>>,
}

impl LogNavigator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn current(&self) -> Option<Route> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).last().copied()
    }

    #[must_use]
    pub fn history(&self) -> Vec<Route> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Navigator for LogNavigator {
    fn reset_and_go_to(&self, route: Route) -> Result<(), NavigationError> {
        let mut history = self.history.lock().unwrap_or_else(PoisonError::into_inner);
        history.clear();
        history.push(route);
        info!(%route, "navigation reset");
        Ok(())
    }

    fn go_to(&self, route: Route) -> Result<(), NavigationError> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner).push(route);
        info!(%route, "navigated");
        Ok(())
    }
}

#[cfg(test)]
#[path = "navigation_test.rs"]
mod tests;
