//! Table Catalog
//!
//! The three tables the bulletin board reads and writes, and the columns each
//! one carries. Backends use the catalog to validate column names before they
//! reach a query and to convert between JSON values and stored values.

use serde::{Deserialize, Serialize};

/// An untyped row as exchanged with the store
pub type Row = serde_json::Map<String, serde_json::Value>;

/// How a column's value is represented
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Bool,
    /// RFC 3339 string
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Must be present (and non-null) on insert
    pub required: bool,
}

const fn col(name: &'static str, kind: ColumnKind, required: bool) -> Column {
    Column { name, kind, required }
}

const POSTS: &[Column] = &[
    col("id", ColumnKind::Text, false),
    col("title", ColumnKind::Text, true),
    col("content", ColumnKind::Text, true),
    col("author_id", ColumnKind::Text, true),
    col("author_name", ColumnKind::Text, true),
    col("created_at", ColumnKind::Timestamp, false),
    col("updated_at", ColumnKind::Timestamp, false),
];

const ACTION_ITEMS: &[Column] = &[
    col("id", ColumnKind::Text, false),
    col("post_id", ColumnKind::Text, true),
    col("text", ColumnKind::Text, true),
    col("completed", ColumnKind::Bool, false),
    col("author_id", ColumnKind::Text, true),
    col("author_name", ColumnKind::Text, true),
    // Legacy rows predate assignment
    col("assigned_to_id", ColumnKind::Text, false),
    col("assigned_to_name", ColumnKind::Text, false),
    col("created_at", ColumnKind::Timestamp, false),
    col("updated_at", ColumnKind::Timestamp, false),
];

const PROFILES: &[Column] = &[
    col("id", ColumnKind::Text, false),
    col("email", ColumnKind::Text, true),
    col("username", ColumnKind::Text, false),
    col("full_name", ColumnKind::Text, true),
    col("role", ColumnKind::Text, false),
    col("scope", ColumnKind::Text, false),
    col("created_at", ColumnKind::Timestamp, false),
    col("updated_at", ColumnKind::Timestamp, false),
];

/// Tables exposed by the bulletin store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Posts,
    ActionItems,
    Profiles,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Posts => "posts",
            Table::ActionItems => "action_items",
            Table::Profiles => "profiles",
        }
    }

    pub fn columns(&self) -> &'static [Column] {
        match self {
            Table::Posts => POSTS,
            Table::ActionItems => ACTION_ITEMS,
            Table::Profiles => PROFILES,
        }
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns().iter().find(|c| c.name == name)
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
