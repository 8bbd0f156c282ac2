//! Auth types — identity, session, state-change events and errors.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by auth operations.
///
/// Expected failures (bad credentials, duplicate account) arrive as
/// `Rejected` with the provider's message. Transport failures collapse into a
/// generic message; the cause is logged where it happens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Required input was missing; raised before any network call.
    #[error("{0}")]
    Validation(String),

    /// The auth provider refused the request.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// The auth provider could not be reached.
    #[error("Unable to reach the authentication service")]
    Transport,

    /// The auth provider answered with a body we could not understand.
    #[error("unexpected response from the authentication service: {0}")]
    InvalidResponse(String),

    /// An operation needed a session and none exists.
    #[error("Auth session missing!")]
    MissingSession,
}

impl AuthError {
    /// HTTP status of a provider rejection, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// The authenticated user, as reported by the auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

impl User {
    /// Local part of the email, or `"User"` when unknown.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .filter(|local| !local.is_empty())
            .unwrap_or("User")
    }

    /// Uppercased first character of the email, or `'U'`.
    #[must_use]
    pub fn initial(&self) -> char {
        self.email
            .as_deref()
            .and_then(|email| email.chars().next())
            .map_or('U', |c| c.to_uppercase().next().unwrap_or(c))
    }
}

/// Proof of an authenticated identity, including a renewable token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Unix seconds at which `access_token` stops being accepted.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: User,
}

fn default_token_type() -> String {
    "bearer".into()
}

impl Session {
    /// True when the access token expires within `margin_secs` of `now`.
    /// Sessions without an expiry never count as expired.
    #[must_use]
    pub fn is_expired_within(&self, margin_secs: i64, now: i64) -> bool {
        self.expires_at.is_some_and(|exp| exp - margin_secs <= now)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Kind of auth-state change reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

impl AuthEvent {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InitialSession => "INITIAL_SESSION",
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
        }
    }
}

/// One `(event, session)` pair from the auth-state stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStateChange {
    pub event: AuthEvent,
    pub session: Option<Session>,
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
