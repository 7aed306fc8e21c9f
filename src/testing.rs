//! Test doubles shared by the store and app tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bulletin_gateway::{Gateway, GatewayError, GatewayResult, Query, Row, SqliteGateway, Table};
use serde_json::{json, Value};
use tokio::sync::{Notify, Semaphore};

use crate::commands::BulletinStore;
use crate::config::SyncSettings;
use crate::session::{Identity, Session};

/// SQLite-backed gateway whose reads can be failed, stalled or held
pub struct TestGateway {
    pub inner: SqliteGateway,
    select_calls: AtomicUsize,
    write_calls: AtomicUsize,
    select_failures: Mutex<Vec<GatewayError>>,
    write_failures: Mutex<HashMap<Table, GatewayError>>,
    hang: AtomicBool,
    gate: Mutex<Option<Arc<Semaphore>>>,
    /// Signalled after each select has read its rows
    pub selected: Notify,
}

impl TestGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteGateway::open_in_memory().expect("in-memory database"),
            select_calls: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
            select_failures: Mutex::new(Vec::new()),
            write_failures: Mutex::new(HashMap::new()),
            hang: AtomicBool::new(false),
            gate: Mutex::new(None),
            selected: Notify::new(),
        })
    }

    pub fn select_calls(&self) -> usize {
        self.select_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    /// Fail the next selects with these errors, in order
    pub fn fail_selects(&self, errors: Vec<GatewayError>) {
        let mut queue = self.select_failures.lock().unwrap();
        queue.extend(errors.into_iter().rev());
    }

    /// Fail the next insert into `table`
    pub fn fail_next_insert(&self, table: Table, error: GatewayError) {
        self.write_failures.lock().unwrap().insert(table, error);
    }

    /// Make every select hang forever
    pub fn hang_selects(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }

    /// Hold each select after it reads until a permit is released
    pub fn hold_selects(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub async fn seed_post(&self, title: &str, author: &Identity) -> String {
        let rows = self
            .inner
            .insert(
                Table::Posts,
                vec![row(json!({
                    "title": title,
                    "content": format!("{} notes", title),
                    "author_id": author.user_id,
                    "author_name": author.display_name,
                }))],
            )
            .await
            .expect("seed post");
        rows[0]["id"].as_str().expect("id").to_string()
    }

    pub async fn seed_item(&self, post_id: &str, text: &str, author: &Identity) -> String {
        let rows = self
            .inner
            .insert(
                Table::ActionItems,
                vec![row(json!({
                    "post_id": post_id,
                    "text": text,
                    "author_id": author.user_id,
                    "author_name": author.display_name,
                    "assigned_to_id": author.user_id,
                    "assigned_to_name": author.display_name,
                }))],
            )
            .await
            .expect("seed item");
        rows[0]["id"].as_str().expect("id").to_string()
    }

    pub async fn seed_profile(&self, full_name: &str) -> String {
        let rows = self
            .inner
            .insert(
                Table::Profiles,
                vec![row(json!({
                    "email": format!("{}@example.com", full_name.to_lowercase().replace(' ', ".")),
                    "full_name": full_name,
                }))],
            )
            .await
            .expect("seed profile");
        rows[0]["id"].as_str().expect("id").to_string()
    }
}

#[async_trait]
impl Gateway for TestGateway {
    async fn select(&self, table: Table, query: &Query) -> GatewayResult<Vec<Row>> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let scripted = self.select_failures.lock().unwrap().pop();
        if let Some(error) = scripted {
            return Err(error);
        }
        let rows = self.inner.select(table, query).await?;
        self.selected.notify_one();
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> GatewayResult<Vec<Row>> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.write_failures.lock().unwrap().remove(&table);
        if let Some(error) = scripted {
            return Err(error);
        }
        self.inner.insert(table, rows).await
    }

    async fn update(&self, table: Table, id: &str, patch: Row) -> GatewayResult<Row> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.update(table, id, patch).await
    }

    async fn delete(&self, table: Table, id: &str) -> GatewayResult<()> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(table, id).await
    }
}

pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {}", other),
    }
}

pub fn dana() -> Identity {
    Identity::new("u-dana", "Dana Site")
}

pub fn lee() -> Identity {
    Identity::new("u-lee", "Lee Crane")
}

pub fn settings() -> SyncSettings {
    SyncSettings {
        max_retries: 2,
        attempt_timeout_ms: 5_000,
        retry_delay_ms: 100,
        refresh_cooldown_secs: 30,
        stall_after_secs: 12,
    }
}

/// A store over a fresh database with `identity` signed in
pub fn store_for(identity: Option<Identity>) -> (BulletinStore, Arc<TestGateway>, Arc<Session>) {
    let gateway = TestGateway::new();
    let session = Arc::new(match identity {
        Some(identity) => Session::signed_in(identity),
        None => Session::new(),
    });
    let store = BulletinStore::new(gateway.clone(), session.clone(), settings());
    (store, gateway, session)
}
