//! Scripted in-process backend used by the unit tests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::json;

use crate::api::auth::{
    LOGOUT_PATH, REFRESH_PATH, REGISTER_DOCTOR_PATH, REGISTER_PATIENT_PATH, SIGN_IN_PATH,
};
use crate::api::{ApiError, ApiRequest, ApiResponse, ClientSettings, HttpClient, Transport};
use crate::auth::IdentityStore;
use crate::models::{Credential, Role, UserIdentity};

pub(crate) const PASSWORD: &str = "secret";
pub(crate) const INVALID_PATH: &str = "/appointments/invalid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Succeed,
    Reject,
    Hang,
}

struct State {
    live_token: Option<String>,
    minted: u32,
    refresh_mode: Mode,
    logout_mode: Mode,
    refresh_delay: Duration,
    auth_failure: StatusCode,
    reject_all: bool,
    rate_limited: u32,
    calls: Vec<String>,
}

pub(crate) struct FakeBackend {
    state: Mutex<State>,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                live_token: Some("t1".to_string()),
                minted: 1,
                refresh_mode: Mode::Succeed,
                logout_mode: Mode::Succeed,
                refresh_delay: Duration::from_millis(50),
                auth_failure: StatusCode::UNAUTHORIZED,
                reject_all: false,
                rate_limited: 0,
                calls: Vec::new(),
            }),
        })
    }

    pub fn user() -> UserIdentity {
        UserIdentity {
            id: 1,
            email: "a@b.com".to_string(),
            role: Role::Patient,
        }
    }

    /// Expire the access token currently accepted by the server
    pub fn revoke(&self) {
        self.state.lock().live_token = None;
    }

    pub fn set_refresh_mode(&self, mode: Mode) {
        self.state.lock().refresh_mode = mode;
    }

    pub fn set_logout_mode(&self, mode: Mode) {
        self.state.lock().logout_mode = mode;
    }

    pub fn set_auth_failure(&self, status: StatusCode) {
        self.state.lock().auth_failure = status;
    }

    pub fn set_reject_all(&self, reject: bool) {
        self.state.lock().reject_all = reject;
    }

    pub fn set_rate_limited(&self, responses: u32) {
        self.state.lock().rate_limited = responses;
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.state.lock()
            .calls
            .iter()
            .filter(|call| call.ends_with(path))
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.len()
    }

    fn mint(&self) -> String {
        let mut state = self.state.lock();
        state.minted += 1;
        let token = format!("t{}", state.minted);
        state.live_token = Some(token.clone());
        token
    }

    async fn refresh(&self) -> ApiResponse {
        let (mode, delay) = {
            let state = self.state.lock();
            (state.refresh_mode, state.refresh_delay)
        };
        match mode {
            Mode::Succeed => {
                tokio::time::sleep(delay).await;
                let token = self.mint();
                let body = json!({
                    "data": { "accessToken": token, "expiresIn": 3600, "user": Self::user() }
                });
                ApiResponse::new(StatusCode::OK, body.to_string())
            }
            Mode::Reject => {
                tokio::time::sleep(delay).await;
                ApiResponse::new(
                    StatusCode::UNAUTHORIZED,
                    r#"{"message":"Invalid token","status":false}"#,
                )
            }
            Mode::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                ApiResponse::new(StatusCode::GATEWAY_TIMEOUT, "")
            }
        }
    }

    fn sign_in(&self, request: &ApiRequest) -> ApiResponse {
        let password = request
            .body
            .as_ref()
            .and_then(|b| b["password"].as_str())
            .unwrap_or_default();
        if password != PASSWORD {
            return ApiResponse::new(
                StatusCode::BAD_REQUEST,
                r#"{"message":"Invalid email or password!","status":false}"#,
            );
        }
        let token = self.mint();
        let body = json!({
            "message": "User signed in successfully!",
            "status": true,
            "token": token,
            "user": Self::user(),
        });
        ApiResponse::new(StatusCode::OK, body.to_string())
    }

    async fn logout(&self) -> Result<ApiResponse, ApiError> {
        let mode = self.state.lock().logout_mode;
        match mode {
            Mode::Succeed => Ok(ApiResponse::new(
                StatusCode::OK,
                r#"{"message":"Logged out successfully","status":true}"#,
            )),
            Mode::Reject => Err(ApiError::ServerError("connection reset".to_string())),
            Mode::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ApiResponse::new(StatusCode::GATEWAY_TIMEOUT, ""))
            }
        }
    }

    fn protected(&self, request: &ApiRequest, credential: Option<&Credential>) -> ApiResponse {
        let mut state = self.state.lock();
        if state.rate_limited > 0 {
            state.rate_limited -= 1;
            return ApiResponse::new(StatusCode::TOO_MANY_REQUESTS, "");
        }
        let accepted = !state.reject_all
            && credential.is_some()
            && credential.map(Credential::as_str) == state.live_token.as_deref();
        if accepted {
            let body = json!({ "data": { "path": request.path } });
            ApiResponse::new(StatusCode::OK, body.to_string())
        } else {
            ApiResponse::new(state.auth_failure, r#"{"message":"Token expired"}"#)
        }
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn send(
        &self,
        request: &ApiRequest,
        credential: Option<&Credential>,
    ) -> Result<ApiResponse, ApiError> {
        self.state.lock()
            .calls
            .push(format!("{} {}", request.method, request.path));

        match request.path.as_str() {
            REFRESH_PATH => Ok(self.refresh().await),
            SIGN_IN_PATH => Ok(self.sign_in(request)),
            LOGOUT_PATH => self.logout().await,
            REGISTER_PATIENT_PATH => Ok(ApiResponse::new(
                StatusCode::CREATED,
                r#"{"message":"Patient registered successfully!","status":true}"#,
            )),
            REGISTER_DOCTOR_PATH => Ok(ApiResponse::new(
                StatusCode::CONFLICT,
                r#"{"message":"Email already in use"}"#,
            )),
            INVALID_PATH => Ok(ApiResponse::new(
                StatusCode::BAD_REQUEST,
                r#"{"message":"Validation failed","errors":{"date":"must be in the future"}}"#,
            )),
            _ => Ok(self.protected(request, credential)),
        }
    }
}

pub(crate) fn client_for(backend: &Arc<FakeBackend>, identity: Arc<dyn IdentityStore>) -> HttpClient {
    let settings = ClientSettings {
        refresh_timeout: Duration::from_secs(10),
    };
    HttpClient::new(Arc::clone(backend) as Arc<dyn Transport>, identity, settings)
}
