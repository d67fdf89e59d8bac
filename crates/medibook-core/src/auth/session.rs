//! Process-wide session state.
//!
//! `SessionStore` is the single owner of "is someone logged in, and who".
//! UI layers read it through `state()` or a `watch` receiver; only the
//! store's own methods and its subscriptions on the `HttpClient` mutate it.
//!
//! Lifecycle: `Initializing` (loading) until `restore_session` finishes, then
//! `Authenticated` or `Anonymous`, switching between the two on login/logout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::IdentityStore;
use crate::api::{ApiError, AuthApi, HttpClient, Subscription};
use crate::models::{AuthResponse, Credential, LoginPayload, UserIdentity};

/// Upper bound on the server-side logout call
const LOGOUT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Initializing,
    Authenticated,
    Anonymous,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub is_logged_in: bool,
    pub user: Option<UserIdentity>,
    pub token: Option<Credential>,
    pub loading: bool,
}

impl SessionState {
    pub fn initializing() -> Self {
        Self {
            is_logged_in: false,
            user: None,
            token: None,
            loading: true,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        if self.loading {
            SessionPhase::Initializing
        } else if self.is_logged_in {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Anonymous
        }
    }

    fn authenticate(&mut self, auth: AuthResponse) {
        self.is_logged_in = true;
        self.user = Some(auth.user);
        self.token = Some(auth.access_token);
    }

    fn clear(&mut self) {
        self.is_logged_in = false;
        self.user = None;
        self.token = None;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::initializing()
    }
}

/// Runs the closure on drop, so cleanup also happens if the future is cancelled
struct Finally<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Drop for Finally<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

pub struct SessionStore {
    auth: AuthApi,
    identity: Arc<dyn IdentityStore>,
    state: Arc<watch::Sender<SessionState>>,
    restore_started: AtomicBool,
    _subscriptions: Vec<Subscription>,
}

impl SessionStore {
    pub fn new(http: HttpClient, identity: Arc<dyn IdentityStore>) -> Self {
        let (tx, _rx) = watch::channel(SessionState::initializing());
        let state = Arc::new(tx);

        let rotated = {
            let state = Arc::clone(&state);
            http.on_credential_refreshed(move |token| {
                let rotated = state.send_if_modified(|s| {
                    if !s.is_logged_in {
                        return false;
                    }
                    s.token = Some(token.clone());
                    true
                });
                if rotated {
                    debug!("Rotated in-memory credential");
                } else {
                    debug!("Ignoring refreshed credential while logged out");
                }
            })
        };
        let expired = {
            let state = Arc::clone(&state);
            http.on_session_expired(move |reason| {
                state.send_modify(SessionState::clear);
                info!(reason = %reason.reason(), "Session expired, sign-in required");
            })
        };

        Self {
            auth: AuthApi::new(http),
            identity,
            state,
            restore_started: AtomicBool::new(false),
            _subscriptions: vec![rotated, expired],
        }
    }

    pub fn http(&self) -> &HttpClient {
        self.auth.http()
    }

    pub fn auth(&self) -> &AuthApi {
        &self.auth
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Receiver that observes every state change
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn is_logged_in(&self) -> bool {
        self.state.borrow().is_logged_in
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.state.borrow().user.clone()
    }

    pub fn token(&self) -> Option<Credential> {
        self.state.borrow().token.clone()
    }

    pub fn loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase()
    }

    /// Record a successful authentication. Safe to call repeatedly; the last
    /// call wins. Only the user is persisted, never the token.
    pub fn login(&self, auth: AuthResponse) {
        self.http().set_credential(Some(auth.access_token.clone()));
        if let Err(e) = self.identity.save(&auth.user) {
            warn!(error = %e, "Failed to persist identity hint");
        }
        info!(user_id = auth.user.id, role = %auth.user.role, "Logged in");
        self.state.send_modify(|s| s.authenticate(auth));
    }

    /// Sign in against the backend and record the result
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<UserIdentity, ApiError> {
        let credentials = LoginPayload {
            email: email.to_string(),
            password: password.to_string(),
        };
        let auth = self.auth.sign_in(&credentials).await?;
        let user = auth.user.clone();
        self.login(auth);
        Ok(user)
    }

    /// End the session. The server call is best-effort; local state is
    /// cleared whatever happens to it.
    pub async fn logout(&self) {
        let _teardown = Finally(Some(|| self.clear_local()));

        let timeout = Duration::from_secs(LOGOUT_TIMEOUT_SECS);
        match tokio::time::timeout(timeout, self.auth.logout()).await {
            Ok(Ok(())) => debug!("Server session terminated"),
            Ok(Err(e)) => warn!(error = %e, "Server logout failed, clearing client session"),
            Err(_) => warn!(timeout_secs = LOGOUT_TIMEOUT_SECS, "Server logout timed out, clearing client session"),
        }
    }

    fn clear_local(&self) {
        self.http().set_credential(None);
        if let Err(e) = self.identity.clear() {
            warn!(error = %e, "Failed to clear identity hint");
        }
        self.state.send_modify(SessionState::clear);
        info!("Logged out");
    }

    /// Restore a previous session at startup. Runs once per store; later
    /// calls return immediately. `loading` is false when this returns.
    pub async fn restore_session(&self) {
        if self.restore_started.swap(true, Ordering::SeqCst) {
            debug!("Session restore already attempted");
            return;
        }
        let _finished = Finally(Some(|| self.state.send_modify(|s| s.loading = false)));

        let hint = match self.identity.load() {
            Ok(hint) => hint,
            Err(e) => {
                warn!(error = %e, "Stored identity unreadable, discarding");
                if let Err(e) = self.identity.clear() {
                    warn!(error = %e, "Failed to clear identity hint");
                }
                None
            }
        };

        let Some(user) = hint else {
            debug!("No stored identity, starting anonymous");
            return;
        };

        debug!(user_id = user.id, "Found stored identity, validating session");
        match self.auth.refresh().await {
            Ok(auth) => self.login(auth),
            Err(e) => {
                info!(error = %e, "Session restore failed, logging out");
                self.logout().await;
            }
        }
    }
}
