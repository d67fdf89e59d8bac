//! The wire seam between `HttpClient` and the network.
//!
//! `ReqwestTransport` is the production implementation. It keeps a cookie
//! store so the server-side session travels with every request, and attaches
//! the in-memory credential handed to it by the client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use super::ApiError;
use crate::models::{Credential, DataEnvelope};

/// An outbound API call, relative to the configured base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// A response as received from the transport, before status handling.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 401 and 403 both mean the credential needs refreshing.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == StatusCode::TOO_MANY_REQUESTS
    }

    /// Pass successful responses through, map everything else to an `ApiError`.
    pub fn into_result(self) -> Result<Self, ApiError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.body))
        }
    }

    /// Decode the body as `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e))
        })
    }

    /// Decode a `{ data: T }` envelope
    pub fn data<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        self.json::<DataEnvelope<T>>().map(|envelope| envelope.data)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &ApiRequest,
        credential: Option<&Credential>,
    ) -> Result<ApiResponse, ApiError>;
}

/// Transport backed by `reqwest`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &ApiRequest,
        credential: Option<&Credential>,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url(&request.path);

        let mut builder = self
            .client
            .request(request.method.clone(), &url)
            .header(header::ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }
        if let Some(token) = credential {
            builder = builder.bearer_auth(token.as_str());
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(method = %request.method, url = %url, status = %status, "Response received");

        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_and_path() {
        let transport =
            ReqwestTransport::new("http://localhost:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(transport.base_url(), "http://localhost:8080");
        assert_eq!(transport.url("/auth/refresh"), "http://localhost:8080/auth/refresh");
        assert_eq!(transport.url("patients/me"), "http://localhost:8080/patients/me");
    }

    #[test]
    fn test_response_auth_failure_detection() {
        assert!(ApiResponse::new(StatusCode::UNAUTHORIZED, "").is_auth_failure());
        assert!(ApiResponse::new(StatusCode::FORBIDDEN, "").is_auth_failure());
        assert!(!ApiResponse::new(StatusCode::BAD_REQUEST, "").is_auth_failure());
        assert!(!ApiResponse::new(StatusCode::OK, "").is_auth_failure());
    }

    #[test]
    fn test_response_data_envelope() {
        let response = ApiResponse::new(StatusCode::OK, r#"{"data":{"id":7},"meta":{"timestamp":"now"}}"#);
        let value: Value = response.data().unwrap();
        assert_eq!(value["id"], 7);
    }

    #[test]
    fn test_into_result_passes_business_errors_through() {
        let response = ApiResponse::new(StatusCode::UNPROCESSABLE_ENTITY, r#"{"message":"Invalid date"}"#);
        match response.into_result() {
            Err(ApiError::BadRequest(msg)) => assert_eq!(msg, "Invalid date"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_request_builders() {
        let request = ApiRequest::post("/appointments")
            .json(&serde_json::json!({"doctorId": 3}))
            .unwrap()
            .query("page", "1");
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.body.as_ref().unwrap()["doctorId"], 3);
        assert_eq!(request.query, vec![("page".to_string(), "1".to_string())]);
    }
}
