//! REST API client module for the healthcare backend.
//!
//! This module provides the `HttpClient`, which transparently refreshes an
//! expired session and replays the rejected requests, and `AuthApi` for the
//! sign-in, registration, refresh and logout endpoints.
//!
//! The session travels in cookies managed by the transport; the client also
//! decorates requests with the in-memory access token.

pub mod auth;
pub mod client;
pub mod error;
pub mod events;
mod refresh;
pub mod transport;

pub use auth::{AuthApi, Registration};
pub use client::{ClientSettings, HttpClient};
pub use error::{ApiError, RefreshFailure};
pub use events::{AuthEvent, Subscription, LOGIN_ROUTE};
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};
