//! Embedded Store
//!
//! SQLite-backed [`Gateway`]: schema migrations, JSON <-> column conversion
//! and the four row operations.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, ErrorCode};
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::traits::Gateway;
use crate::domain::{Column, ColumnKind, GatewayError, GatewayResult, Query, Row, Table};

/// SQLite implementation of the bulletin store
#[derive(Clone)]
pub struct SqliteGateway {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGateway {
    /// Open (creating if needed) the database file at `path`
    pub fn open(path: &Path) -> GatewayResult<Self> {
        let conn = Connection::open(path).map_err(map_sql_err)?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, used by tests and demos
    pub fn open_in_memory() -> GatewayResult<Self> {
        let conn = Connection::open_in_memory().map_err(map_sql_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> GatewayResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(map_sql_err)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl Gateway for SqliteGateway {
    async fn select(&self, table: Table, query: &Query) -> GatewayResult<Vec<Row>> {
        let conn = self.conn.lock().await;
        select_rows(&conn, table, query)
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> GatewayResult<Vec<Row>> {
        let mut conn = self.conn.lock().await;
        let now = now_timestamp();

        // One transaction per batch: either every row lands or none do
        let tx = conn.transaction().map_err(map_sql_err)?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            let (id, values) = prepare_insert(table, row, &now)?;
            let names: Vec<&str> = values.iter().map(|(name, _)| *name).collect();
            let placeholders = vec!["?"; names.len()].join(", ");
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                names.join(", "),
                placeholders
            );
            tx.execute(&sql, params_from_iter(values.iter().map(|(_, v)| v)))
                .map_err(map_sql_err)?;
            ids.push(id);
        }

        let mut inserted = Vec::with_capacity(ids.len());
        for id in &ids {
            let row = fetch_by_id(&tx, table, id)?
                .ok_or_else(|| GatewayError::NotFound(format!("{}/{}", table, id)))?;
            inserted.push(row);
        }
        tx.commit().map_err(map_sql_err)?;

        log::debug!("inserted {} row(s) into {}", inserted.len(), table);
        Ok(inserted)
    }

    async fn update(&self, table: Table, id: &str, patch: Row) -> GatewayResult<Row> {
        let conn = self.conn.lock().await;

        if patch.is_empty() {
            return Err(GatewayError::Rejected(format!("empty patch for {}/{}", table, id)));
        }
        if patch.contains_key("id") {
            return Err(GatewayError::Rejected("id cannot be changed".to_string()));
        }

        let mut sets = Vec::with_capacity(patch.len() + 1);
        let mut params = Vec::with_capacity(patch.len() + 2);
        for (name, value) in &patch {
            let column = lookup_column(table, name)?;
            sets.push(format!("{} = ?", column.name));
            params.push(to_sql(table, column, value)?);
        }
        if !patch.contains_key("updated_at") {
            sets.push("updated_at = ?".to_string());
            params.push(SqlValue::Text(now_timestamp()));
        }
        params.push(SqlValue::Text(id.to_string()));

        let sql = format!("UPDATE {} SET {} WHERE id = ?", table, sets.join(", "));
        let changed = conn
            .execute(&sql, params_from_iter(params.iter()))
            .map_err(map_sql_err)?;
        if changed == 0 {
            return Err(GatewayError::NotFound(format!("{}/{}", table, id)));
        }

        fetch_by_id(&conn, table, id)?
            .ok_or_else(|| GatewayError::NotFound(format!("{}/{}", table, id)))
    }

    async fn delete(&self, table: Table, id: &str) -> GatewayResult<()> {
        let conn = self.conn.lock().await;
        let sql = format!("DELETE FROM {} WHERE id = ?1", table);
        let changed = conn
            .execute(&sql, rusqlite::params![id])
            .map_err(map_sql_err)?;
        if changed == 0 {
            log::debug!("delete {}/{} matched no row", table, id);
        }
        Ok(())
    }
}

/// Check if a column exists in a table
fn column_exists(conn: &Connection, table: &str, column: &str) -> GatewayResult<bool> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", table))
        .map_err(map_sql_err)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .map_err(map_sql_err)?;
    for name in names {
        if name.map_err(map_sql_err)? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Run database migrations
fn run_migrations(conn: &Connection) -> GatewayResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            username TEXT NOT NULL DEFAULT '',
            full_name TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'member',
            scope TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS posts (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL CHECK (length(trim(title)) > 0),
            content TEXT NOT NULL CHECK (length(trim(content)) > 0),
            author_id TEXT NOT NULL,
            author_name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS action_items (
            id TEXT PRIMARY KEY,
            post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            text TEXT NOT NULL CHECK (length(trim(text)) > 0),
            completed INTEGER NOT NULL DEFAULT 0,
            author_id TEXT NOT NULL,
            author_name TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )
    .map_err(map_sql_err)?;

    // Assignment arrived after the first deployments; older databases lack it
    if !column_exists(conn, "action_items", "assigned_to_id")? {
        conn.execute("ALTER TABLE action_items ADD COLUMN assigned_to_id TEXT", [])
            .map_err(|e| GatewayError::Rejected(format!("Failed to add assigned_to_id: {}", e)))?;
    }
    if !column_exists(conn, "action_items", "assigned_to_name")? {
        conn.execute("ALTER TABLE action_items ADD COLUMN assigned_to_name TEXT", [])
            .map_err(|e| GatewayError::Rejected(format!("Failed to add assigned_to_name: {}", e)))?;
    }

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_action_items_post ON action_items(post_id)",
        [],
    )
    .map_err(map_sql_err)?;

    Ok(())
}

fn select_rows(conn: &Connection, table: Table, query: &Query) -> GatewayResult<Vec<Row>> {
    let columns = table.columns();
    let names: Vec<&str> = columns.iter().map(|c| c.name).collect();
    let mut sql = format!("SELECT {} FROM {}", names.join(", "), table);

    let mut params = Vec::with_capacity(query.filters.len());
    for (i, filter) in query.filters.iter().enumerate() {
        let column = lookup_column(table, &filter.column)?;
        sql.push_str(if i == 0 { " WHERE " } else { " AND " });
        sql.push_str(column.name);
        sql.push_str(" = ?");
        params.push(to_sql(table, column, &filter.value)?);
    }

    // rowid breaks ties between rows written in the same microsecond
    match &query.order {
        Some(order) => {
            let column = lookup_column(table, &order.column)?;
            let dir = order.direction.as_sql();
            sql.push_str(&format!(" ORDER BY {} {}, rowid {}", column.name, dir, dir));
        }
        None => sql.push_str(" ORDER BY rowid"),
    }

    let mut stmt = conn.prepare(&sql).map_err(map_sql_err)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |r| read_row(columns, r))
        .map_err(map_sql_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
}

fn fetch_by_id(conn: &Connection, table: Table, id: &str) -> GatewayResult<Option<Row>> {
    let mut rows = select_rows(conn, table, &Query::all().eq("id", id))?;
    Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
}

/// Fill server defaults, validate, and convert a row for insertion
fn prepare_insert(
    table: Table,
    mut row: Row,
    now: &str,
) -> GatewayResult<(String, Vec<(&'static str, SqlValue)>)> {
    let id = match row.remove("id") {
        None | Some(Value::Null) => Uuid::new_v4().to_string(),
        Some(Value::String(id)) if !id.is_empty() => id,
        Some(other) => {
            return Err(GatewayError::Rejected(format!("invalid id {}", other)));
        }
    };

    for stamp in ["created_at", "updated_at"] {
        if !matches!(row.get(stamp), Some(Value::String(_))) {
            row.insert(stamp.to_string(), Value::String(now.to_string()));
        }
    }
    if table.column("completed").is_some() && !row.contains_key("completed") {
        row.insert("completed".to_string(), Value::Bool(false));
    }

    for column in table.columns().iter().filter(|c| c.required) {
        if matches!(row.get(column.name), None | Some(Value::Null)) {
            return Err(GatewayError::Rejected(format!(
                "{}.{} is required",
                table, column.name
            )));
        }
    }

    let mut values = Vec::with_capacity(row.len() + 1);
    values.push(("id", SqlValue::Text(id.clone())));
    for (name, value) in &row {
        let column = lookup_column(table, name)?;
        values.push((column.name, to_sql(table, column, value)?));
    }
    Ok((id, values))
}

fn lookup_column(table: Table, name: &str) -> GatewayResult<&'static Column> {
    table
        .column(name)
        .ok_or_else(|| GatewayError::Rejected(format!("unknown column {}.{}", table, name)))
}

fn to_sql(table: Table, column: &Column, value: &Value) -> GatewayResult<SqlValue> {
    match (column.kind, value) {
        (_, Value::Null) => Ok(SqlValue::Null),
        (ColumnKind::Bool, Value::Bool(b)) => Ok(SqlValue::Integer(i64::from(*b))),
        (ColumnKind::Text | ColumnKind::Timestamp, Value::String(s)) => Ok(SqlValue::Text(s.clone())),
        _ => Err(GatewayError::Rejected(format!(
            "{}.{} cannot hold {}",
            table, column.name, value
        ))),
    }
}

fn read_row(columns: &[Column], r: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let mut row = Row::new();
    for (i, column) in columns.iter().enumerate() {
        let value = match column.kind {
            ColumnKind::Bool => r
                .get::<_, Option<i64>>(i)?
                .map(|n| Value::Bool(n != 0))
                .unwrap_or(Value::Null),
            ColumnKind::Text | ColumnKind::Timestamp => r
                .get::<_, Option<String>>(i)?
                .map(Value::String)
                .unwrap_or(Value::Null),
        };
        row.insert(column.name.to_string(), value);
    }
    Ok(row)
}

/// Constraint failures are the store saying no; lock contention is worth
/// another try; anything else is a request that will not get better.
fn map_sql_err(e: rusqlite::Error) -> GatewayError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            GatewayError::Transport(e.to_string())
        }
        _ => GatewayError::Rejected(e.to_string()),
    }
}

/// Current time as stored in `created_at` / `updated_at`
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
