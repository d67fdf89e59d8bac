use thiserror::Error;

use crate::models::ErrorBody;

/// Why a token refresh did not produce a new credential.
///
/// Every request waiting on the same refresh receives a clone of the same value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Session refresh failed: {0}")]
pub struct RefreshFailure(pub String);

impl RefreshFailure {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }

    pub fn reason(&self) -> &str {
        &self.0
    }
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - session may have expired")]
    Unauthorized,

    #[error("Request rejected: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    SessionExpired(#[from] RefreshFailure),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Message to show for a failed response: the server's `message` when the
    /// body is a JSON error envelope, otherwise the (truncated) raw body.
    fn describe(body: &str) -> String {
        match ErrorBody::parse(body).as_ref().and_then(ErrorBody::message) {
            Some(message) => Self::truncate_body(message),
            None => Self::truncate_body(body),
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = Self::describe(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(message),
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            400 | 409 | 422 => ApiError::BadRequest(message),
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    /// True when the session is gone and the user has to sign in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, ApiError::SessionExpired(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_maps_auth_codes() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        match ApiError::from_status(StatusCode::FORBIDDEN, r#"{"message":"Forbidden"}"#) {
            ApiError::AccessDenied(msg) => assert_eq!(msg, "Forbidden"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_from_status_business_validation_uses_server_message() {
        let body = r#"{"success":false,"error":{"status":400,"message":"Time slot unavailable","path":"/api/appointments"}}"#;
        match ApiError::from_status(StatusCode::BAD_REQUEST, body) {
            ApiError::BadRequest(msg) => assert_eq!(msg, "Time slot unavailable"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_from_status_truncates_large_bodies() {
        let body = "x".repeat(2000);
        match ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, &body) {
            ApiError::ServerError(msg) => {
                assert!(msg.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
                assert!(msg.contains("truncated, 2000 total bytes"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_refresh_failure_is_session_expired() {
        let err: ApiError = RefreshFailure::new("Invalid token").into();
        assert!(err.is_session_expired());
        assert_eq!(err.to_string(), "Session refresh failed: Invalid token");
    }
}
