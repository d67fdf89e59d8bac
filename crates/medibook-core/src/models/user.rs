use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifetime reported for a sign-in token when the server omits one.
pub const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "ROLE_PATIENT", alias = "PATIENT")]
    Patient,
    #[serde(rename = "ROLE_DOCTOR", alias = "DOCTOR")]
    Doctor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "ROLE_PATIENT",
            Role::Doctor => "ROLE_DOCTOR",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::Patient => "Patient",
            Role::Doctor => "Doctor",
        }
    }

    /// Parse a role from user input ("patient", "DOCTOR", "ROLE_PATIENT", ...)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PATIENT" | "ROLE_PATIENT" => Some(Role::Patient),
            "DOCTOR" | "ROLE_DOCTOR" => Some(Role::Doctor),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// The logged-in user. Persisted only as a hint for restoring a session,
/// never as proof of authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: i64,
    pub email: String,
    pub role: Role,
}

/// Opaque bearer token. Kept in memory only.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl From<&str> for Credential {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(rename = "accessToken")]
    pub access_token: Credential,
    #[serde(rename = "expiresIn", default = "default_expires_in")]
    pub expires_in: u64,
    pub user: UserIdentity,
}

fn default_expires_in() -> u64 {
    DEFAULT_EXPIRES_IN_SECS
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginPayload {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterPatientPayload {
    pub email: String,
    pub password: String,
    pub name: String,
    pub age: u32,
    /// `YYYY-MM-DD`
    pub dob: String,
    #[serde(rename = "bloodGroup")]
    pub blood_group: String,
    #[serde(rename = "phoneNumber")]
    pub phone_number: u64,
    pub address: String,
    pub gender: Gender,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterDoctorPayload {
    pub email: String,
    pub password: String,
    pub name: String,
    pub specialization: String,
    pub exp: u32,
    pub qualification: String,
    pub rating: f32,
}
