//! Hosted auth API client (`/auth/v1`).
//!
//! DESIGN
//! ======
//! Thin HTTP wrapper around the email/password, refresh and logout endpoints.
//! The client owns the authoritative copy of the session: it restores it from
//! the credential store on first use, persists every new session, and emits
//! an [`AuthStateChange`] for each transition so subscribers never poll.
//!
//! Response parsing lives in free functions (`parse_session`, `parse_error`)
//! so it can be tested without a server.
//!
//! TRADE-OFFS
//! ==========
//! The session slot is a `tokio::sync::Mutex` held across the refresh and
//! logout round-trips. Concurrent callers wait instead of racing two refreshes
//! with the same single-use refresh token.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{AuthError, AuthEvent, Session, User};
use super::{AuthClient, AuthEventBus, AuthSubscription};
use crate::config::BackendConfig;
use crate::storage::CredentialStore;

/// Refresh this many seconds before the access token lapses.
pub const EXPIRY_MARGIN_SECS: i64 = 90;
pub const AUTO_REFRESH_TICK: Duration = Duration::from_secs(30);

// =============================================================================
// CLIENT
// =============================================================================

struct SessionSlot {
    loaded: bool,
    session: Option<Session>,
}

pub struct GoTrueClient {
    http: reqwest::Client,
    config: BackendConfig,
    storage: Arc<dyn CredentialStore>,
    storage_key: String,
    events: AuthEventBus,
    slot: Mutex<SessionSlot>,
}

impl GoTrueClient {
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidResponse`] if the HTTP client cannot be built.
    pub fn new(config: BackendConfig, storage: Arc<dyn CredentialStore>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .build()
            .map_err(|e| AuthError::InvalidResponse(format!("http client build failed: {e}")))?;
        let storage_key = config.storage_key();
        Ok(Self {
            http,
            config,
            storage,
            storage_key,
            events: AuthEventBus::new(),
            slot: Mutex::new(SessionSlot { loaded: false, session: None }),
        })
    }

    /// Exchange the stored refresh token for a new session.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingSession`] when signed out, the provider's
    /// rejection (after which the local session is dropped), or a transport error.
    pub async fn refresh_session(&self) -> Result<Session, AuthError> {
        let mut slot = self.slot.lock().await;
        self.ensure_loaded(&mut slot);
        let refresh_token = slot.session.as_ref().map(|s| s.refresh_token.clone()).ok_or(AuthError::MissingSession)?;
        self.refresh_locked(&mut slot, &refresh_token).await
    }

    /// Spawn a background loop that refreshes the session shortly before it
    /// expires. Abort the returned handle to stop it.
    #[must_use]
    pub fn spawn_auto_refresh(self: &Arc<Self>) -> JoinHandle<()> {
        let client = Arc::clone(self);
        info!(tick_secs = AUTO_REFRESH_TICK.as_secs(), "auth auto-refresh started");
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(AUTO_REFRESH_TICK).await;
                if let Err(e) = client.refresh_if_due().await {
                    warn!(error = %e, "auth auto-refresh failed");
                }
            }
        })
    }

    async fn refresh_if_due(&self) -> Result<(), AuthError> {
        let mut slot = self.slot.lock().await;
        self.ensure_loaded(&mut slot);
        let due = slot
            .session
            .as_ref()
            .filter(|s| s.is_expired_within(EXPIRY_MARGIN_SECS, now_unix()))
            .map(|s| s.refresh_token.clone());
        if let Some(refresh_token) = due {
            self.refresh_locked(&mut slot, &refresh_token).await?;
        }
        Ok(())
    }

    async fn refresh_locked(&self, slot: &mut SessionSlot, refresh_token: &str) -> Result<Session, AuthError> {
        let result = self
            .post_json("/token?grant_type=refresh_token", None, &json!({ "refresh_token": refresh_token }))
            .await
            .and_then(|body| parse_session(&body, now_unix()));

        match result {
            Ok(session) => {
                debug!(user_id = %session.user.id, "auth session refreshed");
                self.persist(Some(&session));
                slot.session = Some(session.clone());
                self.events.emit(AuthEvent::TokenRefreshed, Some(session.clone()));
                Ok(session)
            }
            Err(e @ AuthError::Rejected { .. }) => {
                warn!(error = %e, "refresh token rejected; dropping local session");
                self.persist(None);
                slot.session = None;
                self.events.emit(AuthEvent::SignedOut, None);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// First use restores the persisted session and announces it as
    /// `InitialSession`.
    fn ensure_loaded(&self, slot: &mut SessionSlot) {
        if slot.loaded {
            return;
        }
        slot.session = self.load_stored();
        slot.loaded = true;
        if let Some(session) = &slot.session {
            debug!(user_id = %session.user.id, "auth session restored from storage");
            self.events.emit(AuthEvent::InitialSession, Some(session.clone()));
        }
    }

    fn load_stored(&self) -> Option<Session> {
        let raw = match self.storage.get(&self.storage_key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "could not read stored auth session");
                return None;
            }
        };
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(error = %e, "stored auth session is unreadable; discarding");
                if let Err(e) = self.storage.remove(&self.storage_key) {
                    warn!(error = %e, "could not discard stored auth session");
                }
                None
            }
        }
    }

    /// Persistence failures are logged, not surfaced: the in-memory session
    /// stays valid and only survival across restarts is lost.
    fn persist(&self, session: Option<&Session>) {
        let result = match session {
            Some(session) => match serde_json::to_string(session) {
                Ok(raw) => self.storage.set(&self.storage_key, &raw),
                Err(e) => {
                    warn!(error = %e, "could not encode auth session");
                    return;
                }
            },
            None => self.storage.remove(&self.storage_key),
        };
        if let Err(e) = result {
            warn!(error = %e, "could not persist auth session");
        }
    }

    async fn post_json(&self, path: &str, bearer: Option<&str>, body: &Value) -> Result<String, AuthError> {
        let response = self
            .http
            .post(format!("{}{path}", self.config.auth_url()))
            .header("apikey", &self.config.anon_key)
            .bearer_auth(bearer.unwrap_or(&self.config.anon_key))
            .json(body)
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

    async fn establish(&self, session: Session) {
        let mut slot = self.slot.lock().await;
        info!(user_id = %session.user.id, "auth session established");
        self.persist(Some(&session));
        slot.loaded = true;
        slot.session = Some(session.clone());
        self.events.emit(AuthEvent::SignedIn, Some(session));
    }
}

fn transport_error(e: reqwest::Error) -> AuthError {
    warn!(error = %e, "auth request failed");
    AuthError::Transport
}

fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}

#[async_trait::async_trait]
impl AuthClient for GoTrueClient {
    async fn get_session(&self) -> Result<Option<Session>, AuthError> {
        let mut slot = self.slot.lock().await;
        self.ensure_loaded(&mut slot);
        let Some(session) = slot.session.clone() else {
            return Ok(None);
        };
        if !session.is_expired_within(EXPIRY_MARGIN_SECS, now_unix()) {
            return Ok(Some(session));
        }
        match self.refresh_locked(&mut slot, &session.refresh_token).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(AuthError::Rejected { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn subscribe(&self) -> AuthSubscription {
        self.events.subscribe()
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let body = self.post_json("/signup", None, &json!({ "email": email, "password": password })).await?;
        match parse_signup(&body, now_unix())? {
            Some(session) => self.establish(session).await,
            None => info!("sign up accepted; awaiting email confirmation"),
        }
        Ok(())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<(), AuthError> {
        let body = self
            .post_json("/token?grant_type=password", None, &json!({ "email": email, "password": password }))
            .await?;
        let session = parse_session(&body, now_unix())?;
        self.establish(session).await;
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let mut slot = self.slot.lock().await;
        self.ensure_loaded(&mut slot);

        if let Some(session) = slot.session.clone() {
            match self.post_json("/logout?scope=global", Some(&session.access_token), &json!({})).await {
                Ok(_) => {}
                // The provider already forgot this session; finish locally.
                Err(AuthError::Rejected { status: 401 | 403 | 404, .. }) => {
                    debug!("logout found no remote session");
                }
                Err(e) => return Err(e),
            }
        }

        self.persist(None);
        slot.session = None;
        info!("auth session ended");
        self.events.emit(AuthEvent::SignedOut, None);
        Ok(())
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: WireUser,
}

#[derive(Deserialize)]
struct WireUser {
    id: Uuid,
    #[serde(default)]
    email: Option<String>,
}

// =============================================================================
// PARSING
// =============================================================================

/// Parse a token-endpoint body into a [`Session`]. `now` fills in
/// `expires_at` when the provider only sends `expires_in`.
pub(crate) fn parse_session(json: &str, now: i64) -> Result<Session, AuthError> {
    let wire: TokenResponse = serde_json::from_str(json).map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
    Ok(Session {
        access_token: wire.access_token,
        refresh_token: wire.refresh_token,
        token_type: wire.token_type.unwrap_or_else(|| "bearer".into()),
        expires_at: wire.expires_at.or_else(|| wire.expires_in.map(|secs| now + secs)),
        user: User { id: wire.user.id, email: wire.user.email },
    })
}

/// Sign-up answers with a session when the account is confirmed on creation,
/// and with a bare user while email confirmation is pending.
pub(crate) fn parse_signup(json: &str, now: i64) -> Result<Option<Session>, AuthError> {
    let value: Value = serde_json::from_str(json).map_err(|e| AuthError::InvalidResponse(e.to_string()))?;
    if value.get("access_token").is_some_and(Value::is_string) {
        return parse_session(json, now).map(Some);
    }
    Ok(None)
}

/// Map a non-2xx body onto [`AuthError::Rejected`], preferring the most
/// human-readable field the provider sent.
pub(crate) fn parse_error(status: u16, body: &str) -> AuthError {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        ["error_description", "msg", "message", "error"]
            .iter()
            .find_map(|field| value.get(*field).and_then(Value::as_str).map(str::to_owned))
    });
    AuthError::Rejected { status, message: message.unwrap_or_else(|| format!("Request failed with status {status}")) }
}

#[cfg(test)]
#[path = "gotrue_test.rs"]
mod tests;
