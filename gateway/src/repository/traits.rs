//! Repository Layer - Core Traits
//!
//! Defines the abstract row-level interface over the relational store.
//! Implementations can use SQLite, a hosted REST endpoint, test doubles, etc.

use async_trait::async_trait;

use crate::domain::{GatewayResult, Query, Row, Table};

/// Row-level CRUD over one relational store
///
/// All operations are async so network-backed and embedded stores share one
/// calling convention. Rows are plain JSON objects; typing them is the
/// caller's job.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Rows of `table` matching `query`, in the requested order
    async fn select(&self, table: Table, query: &Query) -> GatewayResult<Vec<Row>>;

    /// Insert one or more rows as a single write.
    ///
    /// Returns the stored rows, in input order, including server-assigned
    /// `id`, `created_at` and `updated_at`.
    async fn insert(&self, table: Table, rows: Vec<Row>) -> GatewayResult<Vec<Row>>;

    /// Apply `patch` to the row with `id` and return the stored result
    async fn update(&self, table: Table, id: &str, patch: Row) -> GatewayResult<Row>;

    /// Delete the row with `id`. Deleting a missing row succeeds.
    async fn delete(&self, table: Table, id: &str) -> GatewayResult<()>;
}
