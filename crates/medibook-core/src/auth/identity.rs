//! Durable storage for the "who was logged in" hint.
//!
//! Only the `UserIdentity` is written; the access token never touches disk.
//! The hint decides whether a restore is attempted at startup; the server
//! decides whether the session is still live.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::models::UserIdentity;

/// Identity file name in the data directory
const IDENTITY_FILE: &str = "user.json";

pub trait IdentityStore: Send + Sync {
    fn load(&self) -> Result<Option<UserIdentity>>;
    fn save(&self, user: &UserIdentity) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredIdentity {
    pub user: UserIdentity,
    pub saved_at: DateTime<Utc>,
}

/// Identity hint kept as JSON in the application data directory.
pub struct FileIdentityStore {
    dir: PathBuf,
}

impl FileIdentityStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(IDENTITY_FILE)
    }

    /// Load the hint together with when it was written
    pub fn load_stored(&self) -> Result<Option<StoredIdentity>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path)
            .context("Failed to read identity file")?;
        let stored: StoredIdentity = serde_json::from_str(&contents)
            .context("Failed to parse identity file")?;
        Ok(Some(stored))
    }
}

impl IdentityStore for FileIdentityStore {
    fn load(&self) -> Result<Option<UserIdentity>> {
        Ok(self.load_stored()?.map(|stored| stored.user))
    }

    fn save(&self, user: &UserIdentity) -> Result<()> {
        let path = self.path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context("Failed to create data directory")?;
        }
        let stored = StoredIdentity {
            user: user.clone(),
            saved_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&stored)?;
        std::fs::write(&path, contents).context("Failed to write identity file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove identity file")?;
        }
        Ok(())
    }
}

/// In-memory identity hint for tests and embedders without a filesystem.
#[derive(Debug, Default)]
pub struct MemoryIdentityStore {
    user: Mutex<Option<UserIdentity>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(user: UserIdentity) -> Self {
        Self {
            user: Mutex::new(Some(user)),
        }
    }

    pub fn get(&self) -> Option<UserIdentity> {
        self.user.lock().clone()
    }
}

impl IdentityStore for MemoryIdentityStore {
    fn load(&self) -> Result<Option<UserIdentity>> {
        Ok(self.get())
    }

    fn save(&self, user: &UserIdentity) -> Result<()> {
        *self.user.lock() = Some(user.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.user.lock() = None;
        Ok(())
    }
}
