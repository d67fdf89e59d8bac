//! Data models shared by the HTTP client and the session store.
//!
//! - `UserIdentity`, `Role`: who is logged in
//! - `Credential`: the opaque bearer token (never persisted)
//! - `AuthResponse`: normalized result of every auth endpoint
//! - Request payloads for sign-in and registration
//! - Envelope types for the `{ data: T }` and error response shapes

pub mod envelope;
pub mod user;

pub use envelope::{DataEnvelope, ErrorBody, ErrorDetails};
pub use user::{
    AuthResponse, Credential, Gender, LoginPayload, RegisterDoctorPayload,
    RegisterPatientPayload, Role, UserIdentity, DEFAULT_EXPIRES_IN_SECS,
};
