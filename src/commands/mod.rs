//! Board Commands
//!
//! [`BulletinStore`] owns the synchronization state and exposes the board
//! operations, organized by domain. Gateway calls never run while the state
//! lock is held.

mod action_item;
mod load;
mod post;
mod users;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use bulletin_gateway::{Gateway, GatewayResult};
use chrono::Utc;
use tokio::sync::{watch, Mutex, MutexGuard};
use tracing::warn;

use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};
use crate::retry::RetryPolicy;
use crate::session::{Identity, SessionProvider};
use crate::store::{LoadPhase, Patch, Snapshot, SyncState};

pub use load::LoadOutcome;

struct Inner {
    gateway: Arc<dyn Gateway>,
    session: Arc<dyn SessionProvider>,
    settings: SyncSettings,
    state: Mutex<SyncState>,
    publisher: watch::Sender<Arc<Snapshot>>,
}

/// Client-side replica of the board
#[derive(Clone)]
pub struct BulletinStore {
    inner: Arc<Inner>,
}

impl BulletinStore {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        session: Arc<dyn SessionProvider>,
        settings: SyncSettings,
    ) -> Self {
        let (publisher, _) = watch::channel(Arc::new(Snapshot::default()));
        Self {
            inner: Arc::new(Inner {
                gateway,
                session,
                settings,
                state: Mutex::new(SyncState::default()),
                publisher,
            }),
        }
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.publisher.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.publisher.subscribe()
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    /// Whether the view should offer a manual reload
    pub fn is_stalled(&self) -> bool {
        self.snapshot()
            .is_stalled(Utc::now(), self.inner.settings.stall_after())
    }

    /// Wait until no load is running and at least one has finished
    pub async fn settled(&self) -> Arc<Snapshot> {
        let mut rx = self.subscribe();
        let settled = rx
            .wait_for(|s| !s.loading && matches!(s.phase, LoadPhase::Ready | LoadPhase::Error))
            .await
            .map(|s| s.clone());
        match settled {
            Ok(snapshot) => snapshot,
            Err(_) => self.snapshot(),
        }
    }

    /// Forget everything; loads still running are discarded when they finish
    pub async fn reset(&self) {
        let mut state = self.lock().await;
        state.reset();
        self.publish(&state);
    }

    async fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.inner.state.lock().await
    }

    fn publish(&self, state: &SyncState) {
        self.inner
            .publisher
            .send_replace(Arc::new(state.snapshot.clone()));
    }

    fn gateway(&self) -> &dyn Gateway {
        self.inner.gateway.as_ref()
    }

    fn require_identity(&self) -> SyncResult<Identity> {
        self.inner
            .session
            .current()
            .ok_or(SyncError::NotAuthenticated)
    }

    fn current_user_id(&self) -> Option<String> {
        self.inner.session.current().map(|identity| identity.user_id)
    }

    async fn generation(&self) -> u64 {
        self.lock().await.generation
    }

    /// One time-boxed write; writes are never retried
    async fn write<T, F, Fut>(&self, label: &str, operation: F) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = GatewayResult<T>>,
    {
        self.inner.settings.write_policy().run(label, operation).await
    }

    fn load_policy(&self) -> RetryPolicy {
        self.inner.settings.load_policy()
    }

    fn refresh_cooldown(&self) -> Duration {
        self.inner.settings.refresh_cooldown()
    }

    /// Apply a mutation result unless a reset happened since it started
    async fn commit(&self, started_in: u64, patch: Patch) {
        let mut state = self.lock().await;
        if state.generation != started_in {
            warn!("dropping result of a mutation from a previous session");
            return;
        }
        state.commit(patch);
        self.publish(&state);
    }

    /// Record a failed mutation for passive display and hand it back
    async fn fail(&self, started_in: u64, action: &str, error: SyncError) -> SyncError {
        warn!(action, error = %error, "mutation failed");
        let mut state = self.lock().await;
        if state.generation == started_in {
            state.snapshot.error = Some(format!("Failed to {}: {}", action, error));
            self.publish(&state);
        }
        error
    }
}
