//! Application Wiring
//!
//! Builds the gateway named by the config, the session and the store, and
//! keeps the store in step with the signed-in identity.

use std::sync::Arc;

use bulletin_gateway::{Gateway, GatewayResult, RestGateway, SqliteGateway};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::commands::BulletinStore;
use crate::config::{BulletinConfig, GatewayConfig, SyncSettings};
use crate::session::{Identity, Session, SessionProvider};

/// Application state shared with the view layer
pub struct App {
    pub store: BulletinStore,
    pub session: Arc<Session>,
    watcher: JoinHandle<()>,
}

impl App {
    /// Open the configured gateway and start watching the session
    pub async fn start(config: &BulletinConfig) -> GatewayResult<Self> {
        let gateway = open_gateway(&config.gateway).await?;
        Ok(Self::with_gateway(gateway, Arc::new(Session::new()), config.sync.clone()))
    }

    pub fn with_gateway(
        gateway: Arc<dyn Gateway>,
        session: Arc<Session>,
        settings: SyncSettings,
    ) -> Self {
        let provider: Arc<dyn SessionProvider> = session.clone();
        let store = BulletinStore::new(gateway, provider, settings);
        let watcher = spawn_identity_watcher(store.clone(), session.subscribe());
        Self {
            store,
            session,
            watcher,
        }
    }

    pub fn shutdown(self) {
        self.watcher.abort();
    }
}

pub async fn open_gateway(config: &GatewayConfig) -> GatewayResult<Arc<dyn Gateway>> {
    match config {
        GatewayConfig::Sqlite { path } => {
            info!(path = %path.display(), "opening embedded store");
            Ok(Arc::new(SqliteGateway::open(path)?))
        }
        GatewayConfig::Rest {
            url,
            api_key,
            access_token,
        } => {
            info!(url = %url, "using hosted store");
            let gateway = RestGateway::new(url, api_key)?;
            gateway.set_access_token(access_token.clone()).await;
            Ok(Arc::new(gateway))
        }
    }
}

/// Reset the store whenever the user changes; load for the new user
pub fn spawn_identity_watcher(
    store: BulletinStore,
    mut identities: watch::Receiver<Option<Identity>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut current = identities.borrow_and_update().clone();
        if current.is_some() {
            refresh_for_new_user(&store);
        }

        while identities.changed().await.is_ok() {
            let next = identities.borrow_and_update().clone();
            let same_user = next.as_ref().map(|i| &i.user_id) == current.as_ref().map(|i| &i.user_id);
            current = next;
            if same_user {
                continue;
            }

            store.reset().await;
            match &current {
                Some(identity) => {
                    info!(user_id = %identity.user_id, "identity changed, reloading");
                    refresh_for_new_user(&store);
                }
                None => info!("signed out, board cleared"),
            }
        }
    })
}

fn refresh_for_new_user(store: &BulletinStore) {
    let users = store.clone();
    tokio::spawn(async move {
        if let Err(e) = users.fetch_users().await {
            warn!(error = %e, "user list unavailable");
        }
    });
    let board = store.clone();
    tokio::spawn(async move {
        if let Err(e) = board.reload().await {
            warn!(error = %e, "initial load failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LoadPhase;
    use crate::testing::{dana, lee, settings, TestGateway};
    use std::time::Duration;

    async fn wait_until(app: &App, ready: impl Fn(&crate::store::Snapshot) -> bool) {
        let mut rx = app.store.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| ready(s)))
            .await
            .expect("timed out")
            .expect("store dropped");
    }

    #[tokio::test]
    async fn test_sign_in_loads_and_sign_out_clears() {
        let gateway = TestGateway::new();
        gateway.seed_post("Monday", &dana()).await;
        gateway.seed_profile("Lee Crane").await;
        let app = App::with_gateway(gateway.clone(), Arc::new(Session::new()), settings());

        app.session.sign_in(dana());
        wait_until(&app, |s| s.phase == LoadPhase::Ready && s.users.len() == 1).await;
        assert_eq!(app.store.snapshot().posts.len(), 1);

        app.session.sign_out();
        wait_until(&app, |s| s.phase == LoadPhase::Idle && s.posts.is_empty()).await;
        assert!(app.store.snapshot().users.is_empty());

        app.shutdown();
    }

    #[tokio::test]
    async fn test_switching_user_reloads() {
        let gateway = TestGateway::new();
        gateway.seed_post("Monday", &dana()).await;
        let app = App::with_gateway(gateway.clone(), Arc::new(Session::signed_in(dana())), settings());
        wait_until(&app, |s| s.phase == LoadPhase::Ready).await;
        let calls = gateway.select_calls();
        let synced = app.store.snapshot().last_synced_at;

        app.session.sign_in(lee());
        wait_until(&app, |s| s.phase == LoadPhase::Ready && s.last_synced_at > synced).await;

        assert!(gateway.select_calls() > calls);
        assert_eq!(app.store.snapshot().posts.len(), 1);
        app.shutdown();
    }

    #[tokio::test]
    async fn test_open_sqlite_gateway_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig::Sqlite {
            path: dir.path().join("bulletin.db"),
        };
        let gateway = open_gateway(&config).await.expect("open");
        let rows = gateway
            .select(bulletin_gateway::Table::Posts, &bulletin_gateway::Query::all())
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}
