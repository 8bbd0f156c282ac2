//! Auth — the external identity provider seen through one async trait.
//!
//! DESIGN
//! ======
//! `AuthClient` is the contract the session manager consumes: a one-shot
//! session lookup, a cancellable stream of state-change events, and the three
//! credential operations. `gotrue::GoTrueClient` implements it over HTTP;
//! tests swap in an in-memory fake.
//!
//! Events travel over a `tokio::sync::broadcast` channel wrapped by
//! [`AuthEventBus`]. Each subscriber gets its own [`AuthSubscription`];
//! dropping it is the unsubscribe.

pub mod credentials;
pub mod gotrue;
pub mod types;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

pub use types::{AuthError, AuthEvent, AuthStateChange, Session, User};

const EVENT_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// CLIENT CONTRACT
// =============================================================================

/// Provider-neutral auth contract. Enables mocking in tests.
#[async_trait::async_trait]
pub trait AuthClient: Send + Sync {
    /// Return the current persisted session, if any.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] if the session could not be restored.
    async fn get_session(&self) -> Result<Option<Session>, AuthError>;

    /// Subscribe to auth-state changes emitted after this call.
    fn subscribe(&self) -> AuthSubscription;

    /// Register a new email/password account.
    ///
    /// # Errors
    ///
    /// Returns the provider's rejection (e.g. duplicate email) or a transport error.
    async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError>;

    /// Sign in with an existing email/password pair.
    ///
    /// # Errors
    ///
    /// Returns the provider's rejection (e.g. bad credentials) or a transport error.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<(), AuthError>;

    /// End the current session.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the provider could not be told.
    async fn sign_out(&self) -> Result<(), AuthError>;
}

// =============================================================================
// EVENT STREAM
// =============================================================================

/// Fan-out sender for auth-state changes.
#[derive(Clone)]
pub struct AuthEventBus {
    tx: broadcast::Sender<AuthStateChange>,
}

impl AuthEventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Deliver a change to every live subscription. No subscribers is fine.
    pub fn emit(&self, event: AuthEvent, session: Option<Session>) {
        let _ = self.tx.send(AuthStateChange { event, session });
    }

    #[must_use]
    pub fn subscribe(&self) -> AuthSubscription {
        AuthSubscription { rx: self.tx.subscribe() }
    }
}

impl Default for AuthEventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A live subscription to auth-state changes. Drop to unsubscribe.
pub struct AuthSubscription {
    rx: broadcast::Receiver<AuthStateChange>,
}

impl AuthSubscription {
    /// Wait for the next change, in provider order.
    ///
    /// Returns `None` once the provider side is gone. If this subscriber fell
    /// behind, the overwritten events are skipped.
    pub async fn next(&mut self) -> Option<AuthStateChange> {
        loop {
            match self.rx.recv().await {
                Ok(change) => return Some(change),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "auth subscription lagged; skipping stale events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
