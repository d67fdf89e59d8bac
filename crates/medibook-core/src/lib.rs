//! Medibook core - session and authentication plumbing for the healthcare
//! appointment API.
//!
//! - [`api::HttpClient`] issues requests, refreshes an expired session exactly
//!   once no matter how many requests fail together, and replays them.
//! - [`auth::SessionStore`] owns the login state, restores it at startup and
//!   tears it down on logout.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;

#[cfg(test)]
mod testing;

pub use api::{ApiError, ApiRequest, AuthApi, HttpClient};
pub use auth::{SessionState, SessionStore};
pub use config::Config;
