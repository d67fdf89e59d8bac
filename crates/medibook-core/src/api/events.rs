//! Listeners for authentication events raised by `HttpClient`.
//!
//! Subscribing returns a `Subscription`; dropping it (or calling
//! `unsubscribe`) removes the listener. Listeners run synchronously on the
//! task that finished the refresh, before queued requests are released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::RefreshFailure;
use crate::models::Credential;

/// Route the user is sent to when the session cannot be recovered.
pub const LOGIN_ROUTE: &str = "/auth/login";

#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    /// A refresh succeeded; outbound requests now carry this credential.
    CredentialRefreshed(Credential),
    /// A refresh failed; the session is over and the user must sign in again.
    SessionExpired {
        reason: RefreshFailure,
        redirect_to: &'static str,
    },
}

type Listener = Arc<dyn Fn(&AuthEvent) + Send + Sync>;
type Entries = Mutex<Vec<(u64, Listener)>>;

#[derive(Default)]
pub(crate) struct Listeners {
    next_id: AtomicU64,
    entries: Arc<Entries>,
}

impl Listeners {
    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().push((id, listener));
        Subscription {
            id,
            entries: Arc::downgrade(&self.entries),
        }
    }

    pub fn emit(&self, event: &AuthEvent) {
        // Snapshot so a listener may unsubscribe while being notified
        let listeners: Vec<Listener> = self.entries.lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Handle for a registered listener.
#[must_use = "dropping a Subscription removes the listener"]
pub struct Subscription {
    id: u64,
    entries: Weak<Entries>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(entries) = self.entries.upgrade() {
            entries.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
