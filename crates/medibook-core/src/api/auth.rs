//! Authentication endpoints.
//!
//! The backend is inconsistent about response shapes: sign-in answers with
//! an unwrapped `{ status, token, user, message }`, other endpoints wrap an
//! `AuthResponse` in `{ data }`, and registration may return only a message.
//! Everything is normalized to `AuthResponse` here so nothing past this
//! module sees the raw shapes.

use serde::Deserialize;
use tracing::debug;

use super::client::HttpClient;
use super::transport::{ApiRequest, ApiResponse};
use super::ApiError;
use crate::models::{
    AuthResponse, Credential, LoginPayload, RegisterDoctorPayload, RegisterPatientPayload,
    UserIdentity, DEFAULT_EXPIRES_IN_SECS,
};

pub const SIGN_IN_PATH: &str = "/auth/public/signin";
pub const REGISTER_PATIENT_PATH: &str = "/auth/register-patient";
pub const REGISTER_DOCTOR_PATH: &str = "/auth/register-doctor";
pub const REFRESH_PATH: &str = "/auth/refresh";
pub const LOGOUT_PATH: &str = "/auth/logout";

/// Endpoints whose 401/403 answers are final rather than a cue to refresh
const AUTH_ENDPOINTS: [&str; 5] = [
    SIGN_IN_PATH,
    REGISTER_PATIENT_PATH,
    REGISTER_DOCTOR_PATH,
    REFRESH_PATH,
    LOGOUT_PATH,
];

pub(crate) fn is_auth_endpoint(path: &str) -> bool {
    let path = path.split('?').next().unwrap_or(path);
    AUTH_ENDPOINTS.contains(&path)
}

/// Every shape an auth endpoint has been seen to answer with
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AuthPayload {
    Wrapped { data: AuthResponse },
    Direct(AuthResponse),
    Status(StatusBody),
}

#[derive(Debug, Default, Deserialize)]
struct StatusBody {
    #[serde(default)]
    status: Option<bool>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<UserIdentity>,
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "expiresIn", default)]
    expires_in: Option<u64>,
}

impl StatusBody {
    fn into_auth(self, fallback: &str) -> Result<AuthResponse, ApiError> {
        let message = self.message.unwrap_or_else(|| fallback.to_string());
        if self.status == Some(false) {
            return Err(ApiError::BadRequest(message));
        }
        match (self.token, self.user) {
            (Some(token), Some(user)) => Ok(AuthResponse {
                access_token: Credential::new(token),
                expires_in: self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
                user,
            }),
            _ => Err(ApiError::BadRequest(message)),
        }
    }
}

fn parse_payload(response: &ApiResponse) -> Result<AuthPayload, ApiError> {
    response.json()
}

/// Normalize any auth response body into an `AuthResponse`
pub(crate) fn decode_auth(response: &ApiResponse, fallback: &str) -> Result<AuthResponse, ApiError> {
    match parse_payload(response)? {
        AuthPayload::Wrapped { data } => Ok(data),
        AuthPayload::Direct(auth) => Ok(auth),
        AuthPayload::Status(body) => body.into_auth(fallback),
    }
}

/// Result of a registration call
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    /// The server signed the new account in straight away
    SignedIn(AuthResponse),
    /// The account was created; the user still has to sign in
    Created { message: String },
}

fn decode_registration(response: &ApiResponse) -> Result<Registration, ApiError> {
    match parse_payload(response)? {
        AuthPayload::Wrapped { data } => Ok(Registration::SignedIn(data)),
        AuthPayload::Direct(auth) => Ok(Registration::SignedIn(auth)),
        AuthPayload::Status(body) if body.token.is_some() => {
            body.into_auth("Registration failed").map(Registration::SignedIn)
        }
        AuthPayload::Status(body) => {
            if body.status == Some(false) {
                return Err(ApiError::BadRequest(
                    body.message.unwrap_or_else(|| "Registration failed".to_string()),
                ));
            }
            Ok(Registration::Created {
                message: body
                    .message
                    .unwrap_or_else(|| "Registered successfully".to_string()),
            })
        }
    }
}

/// Typed access to the `/auth` endpoints.
#[derive(Clone)]
pub struct AuthApi {
    http: HttpClient,
}

impl AuthApi {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Sign in with email and password
    pub async fn sign_in(&self, credentials: &LoginPayload) -> Result<AuthResponse, ApiError> {
        debug!(email = %credentials.email, "Signing in");
        let response = self
            .http
            .request(ApiRequest::post(SIGN_IN_PATH).json(credentials)?)
            .await?;
        decode_auth(&response, "Login failed")
    }

    pub async fn register_patient(
        &self,
        payload: &RegisterPatientPayload,
    ) -> Result<Registration, ApiError> {
        let response = self
            .http
            .request(ApiRequest::post(REGISTER_PATIENT_PATH).json(payload)?)
            .await?;
        decode_registration(&response)
    }

    pub async fn register_doctor(
        &self,
        payload: &RegisterDoctorPayload,
    ) -> Result<Registration, ApiError> {
        let response = self
            .http
            .request(ApiRequest::post(REGISTER_DOCTOR_PATH).json(payload)?)
            .await?;
        decode_registration(&response)
    }

    /// Validate the live session and obtain a fresh credential
    pub async fn refresh(&self) -> Result<AuthResponse, ApiError> {
        Ok(self.http.refresh_session().await?)
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.http.request(ApiRequest::post(LOGOUT_PATH)).await?;
        Ok(())
    }
}
