//! Response envelopes used by the backend.
//!
//! Most endpoints wrap their payload as `{ data: T }`. Failures carry either a
//! top-level `message` or a structured `error: { status, message, path }`.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorDetails {
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

impl ErrorBody {
    /// Best user-facing message in the body, preferring the structured error.
    pub fn message(&self) -> Option<&str> {
        self.error
            .as_ref()
            .and_then(|e| e.message.as_deref())
            .or(self.message.as_deref())
            .filter(|m| !m.trim().is_empty())
    }

    /// Parse an error body, returning `None` when it is not JSON.
    pub fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_prefers_structured_message() {
        let body = ErrorBody::parse(
            r#"{"success":false,"message":"outer","error":{"status":400,"message":"Slot already booked","path":"/appointments"}}"#,
        )
        .unwrap();
        assert_eq!(body.message(), Some("Slot already booked"));
        assert_eq!(body.error.as_ref().and_then(|e| e.path.as_deref()), Some("/appointments"));
    }

    #[test]
    fn test_error_body_top_level_message() {
        let body = ErrorBody::parse(r#"{"message":"Invalid email or password!","status":false}"#).unwrap();
        assert_eq!(body.message(), Some("Invalid email or password!"));
    }

    #[test]
    fn test_error_body_not_json() {
        assert!(ErrorBody::parse("<html>Bad Gateway</html>").is_none());
    }
}
