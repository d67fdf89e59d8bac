//! HTTP client with silent session refresh.
//!
//! Every call goes through [`HttpClient::request`]. When the backend answers
//! 401 or 403 the client refreshes the session once, replays the request, and
//! tells subscribers about the new credential. Concurrent failures share a
//! single refresh (see `refresh.rs`). A failed refresh ends the session: the
//! stored identity is cleared, every waiting request is rejected, and
//! subscribers receive `AuthEvent::SessionExpired`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::auth::{self, is_auth_endpoint, REFRESH_PATH};
use super::events::{AuthEvent, Listeners, Subscription, LOGIN_ROUTE};
use super::refresh::{self, LeaderGuard, RefreshGate, RefreshOutcome, Ticket};
use super::transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};
use super::{ApiError, RefreshFailure};
use crate::auth::IdentityStore;
use crate::config::{Config, DEFAULT_REFRESH_TIMEOUT_SECS};
use crate::models::{AuthResponse, Credential, ErrorBody};

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Upper bound on one refresh call
    pub refresh_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            refresh_timeout: Duration::from_secs(DEFAULT_REFRESH_TIMEOUT_SECS),
        }
    }
}

/// A request travelling through the interceptor, with its retry-once marker.
struct Attempt {
    request: ApiRequest,
    retried: bool,
}

impl Attempt {
    fn new(request: ApiRequest) -> Self {
        Self {
            request,
            retried: false,
        }
    }

    /// Whether an auth failure on this attempt should trigger a refresh.
    /// The `/auth` endpoints never do: a rejected sign-in is a wrong password,
    /// and a rejected refresh must not queue behind itself.
    fn may_refresh(&self, response: &ApiResponse) -> bool {
        response.is_auth_failure() && !self.retried && !is_auth_endpoint(&self.request.path)
    }
}

/// The in-memory credential and the session it belongs to. `epoch` moves
/// whenever the credential is replaced from outside (login, logout) or the
/// session ends, so a refresh that started earlier can tell it is stale.
#[derive(Default)]
struct CredentialSlot {
    credential: Option<Credential>,
    epoch: u64,
}

struct Inner {
    transport: Arc<dyn Transport>,
    identity: Arc<dyn IdentityStore>,
    credential: RwLock<CredentialSlot>,
    gate: RefreshGate,
    listeners: Listeners,
    settings: ClientSettings,
}

/// API client for the healthcare backend.
/// Clone is cheap - all clones share the credential, refresh state and listeners.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<Inner>,
}

impl HttpClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        identity: Arc<dyn IdentityStore>,
        settings: ClientSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                identity,
                credential: RwLock::new(CredentialSlot::default()),
                gate: RefreshGate::default(),
                listeners: Listeners::default(),
                settings,
            }),
        }
    }

    /// Create a client talking to the configured backend over reqwest
    pub fn connect(config: &Config, identity: Arc<dyn IdentityStore>) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(&config.base_url(), config.request_timeout())?;
        let settings = ClientSettings {
            refresh_timeout: config.refresh_timeout(),
        };
        Ok(Self::new(Arc::new(transport), identity, settings))
    }

    pub fn credential(&self) -> Option<Credential> {
        self.inner.credential.read().credential.clone()
    }

    /// Replace the credential. Starts a new session epoch: a refresh already
    /// in flight will not overwrite this value or announce its own token.
    pub fn set_credential(&self, credential: Option<Credential>) {
        let mut slot = self.inner.credential.write();
        slot.credential = credential;
        slot.epoch += 1;
    }

    fn epoch(&self) -> u64 {
        self.inner.credential.read().epoch
    }

    /// Store a refreshed token unless the session changed since `epoch`
    fn install_refreshed(&self, epoch: u64, credential: &Credential) -> bool {
        let mut slot = self.inner.credential.write();
        if slot.epoch != epoch {
            return false;
        }
        slot.credential = Some(credential.clone());
        true
    }

    /// Drop the credential of the session seen at `epoch`. False if it has
    /// already been replaced.
    fn end_session(&self, epoch: u64) -> bool {
        let mut slot = self.inner.credential.write();
        if slot.epoch != epoch {
            return false;
        }
        slot.credential = None;
        slot.epoch += 1;
        true
    }

    /// True while a refresh is outstanding
    pub fn is_refreshing(&self) -> bool {
        self.inner.gate.is_refreshing()
    }

    /// Number of requests parked behind the current refresh
    pub fn pending_requests(&self) -> usize {
        self.inner.gate.pending_len()
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.inner.listeners.subscribe(Arc::new(listener))
    }

    #[cfg(test)]
    pub(crate) fn emit(&self, event: &AuthEvent) {
        self.inner.listeners.emit(event);
    }

    /// Register a listener for every successful refresh
    pub fn on_credential_refreshed<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Credential) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let AuthEvent::CredentialRefreshed(token) = event {
                listener(token);
            }
        })
    }

    /// Register a listener for sessions ended by a failed refresh
    pub fn on_session_expired<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RefreshFailure) + Send + Sync + 'static,
    {
        self.subscribe(move |event| {
            if let AuthEvent::SessionExpired { reason, .. } = event {
                listener(reason);
            }
        })
    }

    /// Issue a request, refreshing the session once if it is rejected with
    /// 401/403. Non-auth failures are returned unchanged as `ApiError`s.
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut attempt = Attempt::new(request);

        loop {
            let response = self.dispatch(&attempt.request).await?;
            if !attempt.may_refresh(&response) {
                return response.into_result();
            }
            attempt.retried = true;

            let outcome = loop {
                match self.inner.gate.enter() {
                    Ticket::Leader(leader) => break self.lead_refresh(leader).await,
                    Ticket::Waiter(rx) => {
                        debug!(path = %attempt.request.path, "Refresh in flight, queueing request");
                        match refresh::wait(rx).await {
                            Some(outcome) => break outcome,
                            // Leader went away without an answer; take over
                            None => {
                                debug!(path = %attempt.request.path, "Refresh abandoned, retrying")
                            }
                        }
                    }
                }
            };
            outcome?;

            debug!(path = %attempt.request.path, "Replaying request after refresh");
        }
    }

    /// Issue a request and decode its `{ data: T }` envelope
    pub async fn fetch<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.request(request).await?.data()
    }

    /// Issue a request and decode the body as-is
    pub async fn fetch_raw<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        self.request(request).await?.json()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.fetch(ApiRequest::get(path)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.fetch(ApiRequest::post(path).json(body)?).await
    }

    /// Call the refresh endpoint directly, bypassing the interceptor.
    /// Does not publish the result; callers decide what to do with it.
    pub async fn refresh_session(&self) -> Result<AuthResponse, RefreshFailure> {
        let timeout = self.inner.settings.refresh_timeout;
        match tokio::time::timeout(timeout, self.call_refresh()).await {
            Ok(result) => result,
            Err(_) => Err(RefreshFailure::new(format!(
                "refresh timed out after {}s",
                timeout.as_secs_f32()
            ))),
        }
    }

    async fn call_refresh(&self) -> Result<AuthResponse, RefreshFailure> {
        let credential = self.credential();
        let response = self
            .inner
            .transport
            .send(&ApiRequest::post(REFRESH_PATH), credential.as_ref())
            .await
            .map_err(|e| RefreshFailure::new(e.to_string()))?;

        if !response.status.is_success() {
            let reason = ErrorBody::parse(&response.body)
                .as_ref()
                .and_then(ErrorBody::message)
                .map(str::to_string)
                .unwrap_or_else(|| format!("refresh rejected with status {}", response.status));
            return Err(RefreshFailure::new(reason));
        }

        auth::decode_auth(&response, "Token refresh failed")
            .map_err(|e| RefreshFailure::new(e.to_string()))
    }

    /// Perform the refresh this task was elected for and settle the queue.
    ///
    /// If the session is replaced while the refresh runs (logout, a new
    /// login), its result is discarded: no token is stored, no event is
    /// published, and queued requests replay with whatever credential is
    /// current.
    async fn lead_refresh(&self, leader: LeaderGuard<'_>) -> RefreshOutcome {
        info!("Credential rejected, refreshing session");
        let epoch = self.epoch();

        match self.refresh_session().await {
            Ok(auth) => {
                if self.install_refreshed(epoch, &auth.access_token) {
                    self.inner
                        .listeners
                        .emit(&AuthEvent::CredentialRefreshed(auth.access_token));
                } else {
                    info!("Session changed during refresh, discarding refreshed credential");
                }
                let released = leader.resolve(Ok(()));
                debug!(released, "Session refreshed, releasing queued requests");
                Ok(())
            }
            Err(failure) => {
                if self.end_session(epoch) {
                    warn!(reason = %failure.reason(), "Session refresh failed, ending session");
                    if let Err(e) = self.inner.identity.clear() {
                        warn!(error = %e, "Failed to clear stored identity");
                    }
                    self.inner.listeners.emit(&AuthEvent::SessionExpired {
                        reason: failure.clone(),
                        redirect_to: LOGIN_ROUTE,
                    });
                } else {
                    info!(reason = %failure.reason(), "Refresh failed for a session that already ended");
                }
                let released = leader.resolve(Err(failure.clone()));
                debug!(released, "Rejected queued requests");
                Err(failure)
            }
        }
    }

    /// Send one request, backing off on 429
    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let credential = self.credential();
            let response = self
                .inner
                .transport
                .send(request, credential.as_ref())
                .await?;

            if !response.is_rate_limited() {
                return Ok(response);
            }

            retries += 1;
            if retries > MAX_RATE_LIMIT_RETRIES {
                return Err(ApiError::RateLimited);
            }
            warn!(path = %request.path, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
            tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2; // Exponential backoff
        }
    }
}
