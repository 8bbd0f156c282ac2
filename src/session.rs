//! Session manager — the process-wide identity as an explicit context object.
//!
//! DESIGN
//! ======
//! One `SessionManager` per app (or per test). It owns the published
//! [`SessionState`] in a `watch` channel so dependents (the task store, entry
//! routing) react to identity changes without polling.
//!
//! Every state change flows through [`reduce`], a pure function over
//! [`Transition`]s. The initial session lookup and the provider's event
//! stream both feed the reducer unconditionally, so the last one to land wins.
//!
//! LIFECYCLE
//! =========
//! `new` → `initialize` → ... → `shutdown` (or drop). After shutdown the
//! liveness flag suppresses late results from in-flight calls; the calls
//! themselves are not cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::credentials::validate_sign_in;
use crate::auth::{AuthClient, AuthError, AuthEvent, AuthStateChange, Session, User};
use crate::navigation::{Navigator, redirect_to_login};

/// Delay between clearing local state on sign-out and redirecting, so the
/// cleared state is committed before the login screen mounts.
pub const REDIRECT_DELAY: Duration = Duration::from_millis(100);

// =============================================================================
// STATE
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    Loading,
    Authenticated,
    Unauthenticated,
}

/// Snapshot of the current identity.
///
/// `user` is derived from `session`, so one is present exactly when the
/// other is. `loading` starts `true` and flips to `false` once, on the first
/// session resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub session: Option<Session>,
    pub loading: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self { phase: SessionPhase::Uninitialized, session: None, loading: true }
    }
}

impl SessionState {
    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|s| &s.user)
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

#[derive(Debug, Clone)]
pub enum Transition {
    /// Provider mounted; waiting for the first resolution.
    Start,
    /// Result of the initial persisted-session lookup.
    Restored(Option<Session>),
    /// Provider-reported change.
    Changed(AuthStateChange),
    /// Local clear after a confirmed sign-out.
    SignedOutLocally,
}

fn resolved(session: Option<Session>) -> SessionState {
    let phase = if session.is_some() { SessionPhase::Authenticated } else { SessionPhase::Unauthenticated };
    SessionState { phase, session, loading: false }
}

#[must_use]
pub fn reduce(state: &SessionState, transition: &Transition) -> SessionState {
    match transition {
        Transition::Start if state.phase == SessionPhase::Uninitialized => {
            SessionState { phase: SessionPhase::Loading, ..state.clone() }
        }
        Transition::Start => state.clone(),
        Transition::Restored(session) => resolved(session.clone()),
        Transition::Changed(change) => resolved(change.session.clone()),
        Transition::SignedOutLocally => SessionState {
            phase: if state.loading { state.phase } else { SessionPhase::Unauthenticated },
            session: None,
            loading: state.loading,
        },
    }
}

// =============================================================================
// MANAGER
// =============================================================================

struct Shared {
    state: watch::Sender<SessionState>,
    alive: AtomicBool,
    /// Set while a sign-out redirect is scheduled or done; re-armed by the
    /// next authenticated session.
    redirect_armed: AtomicBool,
    navigator: Arc<dyn Navigator>,
    redirect: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    /// Apply one transition unless torn down. Returns whether it was applied.
    fn apply(&self, transition: &Transition) -> bool {
        if !self.alive.load(Ordering::Acquire) {
            debug!(?transition, "session manager torn down; dropping state update");
            return false;
        }
        self.state.send_modify(|state| *state = reduce(state, transition));
        if self.state.borrow().is_authenticated() {
            self.redirect_armed.store(false, Ordering::Release);
        }
        true
    }

    fn schedule_redirect(self: &Arc<Self>) {
        if self.redirect_armed.swap(true, Ordering::AcqRel) {
            return;
        }
        let navigator = Arc::clone(&self.navigator);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(REDIRECT_DELAY).await;
            redirect_to_login(navigator.as_ref());
        });
        *lock(&self.redirect) = Some(handle);
    }
}

pub struct SessionManager {
    auth: Arc<dyn AuthClient>,
    shared: Arc<Shared>,
    started: AtomicBool,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    #[must_use]
    pub fn new(auth: Arc<dyn AuthClient>, navigator: Arc<dyn Navigator>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            auth,
            shared: Arc::new(Shared {
                state,
                alive: AtomicBool::new(true),
                redirect_armed: AtomicBool::new(false),
                navigator,
                redirect: Mutex::new(None),
            }),
            started: AtomicBool::new(false),
            listener: Mutex::new(None),
        }
    }

    /// Subscribe to provider events, then resolve the persisted session.
    ///
    /// Events may land before the lookup resolves; both update the state in
    /// arrival order. A failed lookup counts as "no session". Calling this
    /// more than once, or after shutdown, does nothing.
    pub async fn initialize(&self) {
        if !self.shared.alive.load(Ordering::Acquire) || self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.apply(&Transition::Start);

        let mut subscription = self.auth.subscribe();
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            while let Some(change) = subscription.next().await {
                let user_id = change.session.as_ref().map(|s| s.user.id);
                info!(event = change.event.as_str(), ?user_id, "auth state change");
                let signed_out = change.event == AuthEvent::SignedOut;
                if shared.apply(&Transition::Changed(change)) && signed_out {
                    shared.schedule_redirect();
                }
            }
            debug!("auth subscription closed");
        });
        *lock(&self.listener) = Some(handle);

        let restored = match self.auth.get_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "initial session lookup failed; treating as signed out");
                None
            }
        };
        info!(authenticated = restored.is_some(), "initial session resolved");
        self.shared.apply(&Transition::Restored(restored));
    }

    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] for empty input, otherwise whatever
    /// the provider reported. Local state changes via the resulting event.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError> {
        validate_sign_in(email, password)?;
        info!("sign up requested");
        self.auth
            .sign_up(email, password)
            .await
            .inspect_err(|e| warn!(error = %e, "sign up failed"))
    }

    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] for empty input, otherwise whatever
    /// the provider reported. Local state changes via the resulting event.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), AuthError> {
        validate_sign_in(email, password)?;
        info!("sign in requested");
        self.auth
            .sign_in_with_password(email, password)
            .await
            .inspect_err(|e| warn!(error = %e, "sign in failed"))
    }

    /// Sign out, clear local identity in one update, and schedule the
    /// redirect to login.
    ///
    /// # Errors
    ///
    /// Returns the provider's error; local state is untouched in that case.
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        info!("sign out requested");
        self.auth.sign_out().await.inspect_err(|e| warn!(error = %e, "sign out failed"))?;
        if self.shared.apply(&Transition::SignedOutLocally) {
            self.shared.schedule_redirect();
        }
        Ok(())
    }

    /// Stop applying state updates and cancel the event subscription.
    pub fn shutdown(&self) {
        if self.shared.alive.swap(false, Ordering::AcqRel) {
            info!("session manager shut down");
        }
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
    }

    /// Wait for a scheduled sign-out redirect to run, if one is pending.
    pub async fn settle_redirect(&self) {
        let handle = lock(&self.shared.redirect).take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn user(&self) -> Option<User> {
        self.shared.state.borrow().user().cloned()
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.shared.state.borrow().loading
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
