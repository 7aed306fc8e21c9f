//! Post Commands

use bulletin_gateway::{Row, Table};
use serde_json::{json, Value};
use tracing::info;

use super::BulletinStore;
use crate::error::{SyncError, SyncResult};
use crate::models::{decode_row, decode_rows, single_row, ActionItem, NewActionItem, NewPost, Post};
use crate::session::Identity;
use crate::store::Patch;

impl BulletinStore {
    /// Create a post with its action items and put it at the top of the board.
    /// Items with blank text are dropped.
    pub async fn create_post(&self, draft: NewPost) -> SyncResult<Post> {
        let identity = self.require_identity()?;
        let title = draft.title.trim();
        let content = draft.content.trim();
        if title.is_empty() || content.is_empty() {
            return Err(SyncError::InvalidInput(
                "title and content are required".into(),
            ));
        }
        let items: Vec<NewActionItem> = draft
            .action_items
            .into_iter()
            .filter(|item| !item.text.trim().is_empty())
            .collect();

        let generation = self.generation().await;
        match self.insert_post(&identity, title, content, &items).await {
            Ok(post) => {
                info!(post_id = %post.id, items = post.action_items.len(), "post created");
                self.commit(generation, Patch::AddPost(post.clone())).await;
                Ok(post)
            }
            Err(e) => Err(self.fail(generation, "create post", e).await),
        }
    }

    pub async fn delete_post(&self, post_id: &str) -> SyncResult<()> {
        self.require_identity()?;
        let generation = self.generation().await;
        match self
            .write("delete_post", || self.gateway().delete(Table::Posts, post_id))
            .await
        {
            Ok(()) => {
                info!(post_id, "post deleted");
                self.commit(generation, Patch::RemovePost(post_id.to_string()))
                    .await;
                Ok(())
            }
            Err(e) => Err(self.fail(generation, "delete post", e).await),
        }
    }

    async fn insert_post(
        &self,
        identity: &Identity,
        title: &str,
        content: &str,
        items: &[NewActionItem],
    ) -> SyncResult<Post> {
        let row = to_row(json!({
            "title": title,
            "content": content,
            "author_id": identity.user_id,
            "author_name": identity.display_name,
        }));
        let inserted = self
            .write("create_post", || {
                self.gateway().insert(Table::Posts, vec![row.clone()])
            })
            .await?;
        let mut post: Post = decode_row(single_row(inserted)?)?;

        if items.is_empty() {
            return Ok(post);
        }

        let snapshot = self.snapshot();
        let rows: Vec<Row> = items
            .iter()
            .map(|item| {
                action_item_row(
                    &post.id,
                    identity,
                    item.text.trim(),
                    &item.assignee_id,
                    &snapshot.user_name(&item.assignee_id),
                )
            })
            .collect();
        let inserted = self
            .write("create_action_items", || {
                self.gateway().insert(Table::ActionItems, rows.clone())
            })
            .await
            .map_err(|e| match e {
                SyncError::Gateway(source) | SyncError::RetriesExhausted { last: source, .. } => {
                    SyncError::PartialCreate {
                        post_id: post.id.clone(),
                        source,
                    }
                }
                other => other,
            })?;

        let mut created: Vec<ActionItem> = decode_rows(inserted)?;
        created.sort_by_key(|item| item.created_at);
        post.action_items = created;
        Ok(post)
    }
}

pub(super) fn action_item_row(
    post_id: &str,
    identity: &Identity,
    text: &str,
    assignee_id: &str,
    assignee_name: &str,
) -> Row {
    to_row(json!({
        "post_id": post_id,
        "text": text,
        "author_id": identity.user_id,
        "author_name": identity.display_name,
        "assigned_to_id": assignee_id,
        "assigned_to_name": assignee_name,
    }))
}

pub(super) fn to_row(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        _ => Row::new(),
    }
}
