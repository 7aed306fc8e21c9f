//! Session Provider
//!
//! Who is signed in. The store reads the current identity before every
//! command; the app's identity watcher subscribes to changes.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Source of the current identity
pub trait SessionProvider: Send + Sync {
    fn current(&self) -> Option<Identity>;

    /// Receives a new value whenever the identity changes
    fn subscribe(&self) -> watch::Receiver<Option<Identity>>;
}

/// In-process session handle
pub struct Session {
    sender: watch::Sender<Option<Identity>>,
}

impl Session {
    /// Signed out
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    pub fn signed_in(identity: Identity) -> Self {
        let (sender, _) = watch::channel(Some(identity));
        Self { sender }
    }

    /// Sign in; returns false when `identity` was already current
    pub fn sign_in(&self, identity: Identity) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if current.as_ref() == Some(&identity) {
                false
            } else {
                *current = Some(identity.clone());
                true
            }
        });
        if changed {
            info!(user_id = %identity.user_id, "signed in");
        }
        changed
    }

    /// Sign out; returns false when nobody was signed in
    pub fn sign_out(&self) -> bool {
        let changed = self.sender.send_if_modified(|current| current.take().is_some());
        if changed {
            info!("signed out");
        }
        changed
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProvider for Session {
    fn current(&self) -> Option<Identity> {
        self.sender.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.sender.subscribe()
    }
}
