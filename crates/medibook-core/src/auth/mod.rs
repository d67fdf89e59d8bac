//! Session management for the signed-in user.
//!
//! This module provides:
//! - `SessionStore`: login/logout/restore and the observable `SessionState`
//! - `IdentityStore`: durable "who was logged in" hint (file or memory)
//! - `check_access`: role checks for protected screens
//!
//! Access tokens live in memory only; a restart restores the session by
//! asking the server to refresh it.

pub mod guard;
pub mod identity;
pub mod session;

pub use guard::{check_access, Access, UNAUTHORIZED_ROUTE};
pub use identity::{FileIdentityStore, IdentityStore, MemoryIdentityStore, StoredIdentity};
pub use session::{SessionPhase, SessionState, SessionStore};
