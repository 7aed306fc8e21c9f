//! Board Models
//!
//! Typed views of the rows stored by the gateway.

use bulletin_gateway::{GatewayError, Row};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Anything kept in the board by id
pub trait Entity {
    fn id(&self) -> &str;
}

/// A to-do attached to a post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionItem {
    pub id: String,
    pub post_id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    pub author_id: String,
    pub author_name: String,
    #[serde(default)]
    pub assigned_to_id: Option<String>,
    #[serde(default)]
    pub assigned_to_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ActionItem {
    /// Who the item is assigned to; records without an assignee belong to
    /// their author
    pub fn assignee_id(&self) -> &str {
        self.assigned_to_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.author_id)
    }

    pub fn assignee_name(&self) -> &str {
        match self.assigned_to_id.as_deref() {
            Some(id) if !id.is_empty() => self
                .assigned_to_name
                .as_deref()
                .filter(|name| !name.is_empty())
                .unwrap_or(&self.author_name),
            _ => &self.author_name,
        }
    }

    pub fn is_assigned_to(&self, user_id: &str) -> bool {
        self.assignee_id() == user_id
    }
}

impl Entity for ActionItem {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A daily bulletin entry with its action items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author_id: String,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Ascending by `created_at`
    #[serde(default)]
    pub action_items: Vec<ActionItem>,
}

impl Entity for Post {
    fn id(&self) -> &str {
        &self.id
    }
}

/// A known user, as listed for assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub scope: String,
}

/// An action item to create: text plus the id of the assignee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewActionItem {
    pub text: String,
    pub assignee_id: String,
}

impl NewActionItem {
    pub fn new(text: impl Into<String>, assignee_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            assignee_id: assignee_id.into(),
        }
    }
}

/// A post to create
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub action_items: Vec<NewActionItem>,
}

impl NewPost {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            action_items: Vec::new(),
        }
    }

    pub fn with_action_item(mut self, text: impl Into<String>, assignee_id: impl Into<String>) -> Self {
        self.action_items.push(NewActionItem::new(text, assignee_id));
        self
    }
}

/// Convert a gateway row into a typed record
pub fn decode_row<T: DeserializeOwned>(row: Row) -> SyncResult<T> {
    serde_json::from_value(serde_json::Value::Object(row))
        .map_err(|e| SyncError::Decode(e.to_string()))
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> SyncResult<Vec<T>> {
    rows.into_iter().map(decode_row).collect()
}

/// The single row a one-row insert must return
pub(crate) fn single_row(rows: Vec<Row>) -> SyncResult<Row> {
    rows.into_iter()
        .next()
        .ok_or_else(|| SyncError::Gateway(GatewayError::Decode("write returned no rows".into())))
}
