//! Action Item Commands

use bulletin_gateway::Table;
use serde_json::json;
use tracing::{debug, info};

use super::post::{action_item_row, to_row};
use super::BulletinStore;
use crate::error::{SyncError, SyncResult};
use crate::models::{decode_row, single_row, ActionItem};
use crate::store::Patch;

impl BulletinStore {
    /// Add an item to the end of a post's list
    pub async fn add_action_item(
        &self,
        post_id: &str,
        text: &str,
        assignee_id: &str,
    ) -> SyncResult<ActionItem> {
        let identity = self.require_identity()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SyncError::InvalidInput("action item text is required".into()));
        }

        let generation = self.generation().await;
        let assignee_name = self.snapshot().user_name(assignee_id);
        let row = action_item_row(post_id, &identity, text, assignee_id, &assignee_name);
        let result: SyncResult<ActionItem> = async {
            let inserted = self
                .write("add_action_item", || {
                    self.gateway().insert(Table::ActionItems, vec![row.clone()])
                })
                .await?;
            decode_row::<ActionItem>(single_row(inserted)?)
        }
        .await;

        match result {
            Ok(item) => {
                info!(post_id, item_id = %item.id, "action item added");
                self.commit(
                    generation,
                    Patch::AddActionItem {
                        post_id: post_id.to_string(),
                        item: item.clone(),
                    },
                )
                .await;
                Ok(item)
            }
            Err(e) => Err(self.fail(generation, "add action item", e).await),
        }
    }

    /// Flip the completion flag as currently shown; last write wins
    pub async fn toggle_action_item(&self, post_id: &str, item_id: &str) -> SyncResult<ActionItem> {
        self.require_identity()?;
        let generation = self.generation().await;

        let result: SyncResult<ActionItem> = async {
            let completed = self
                .snapshot()
                .action_item(post_id, item_id)
                .map(|item| item.completed)
                .ok_or_else(|| {
                    SyncError::NotFound(format!("action item {} in post {}", item_id, post_id))
                })?;
            debug!(item_id, completed = !completed, "toggling action item");
            let patch = to_row(json!({ "completed": !completed }));
            let updated = self
                .write("toggle_action_item", || {
                    self.gateway()
                        .update(Table::ActionItems, item_id, patch.clone())
                })
                .await?;
            decode_row::<ActionItem>(updated)
        }
        .await;

        match result {
            Ok(item) => {
                self.commit(
                    generation,
                    Patch::ReplaceActionItem {
                        post_id: post_id.to_string(),
                        item: item.clone(),
                    },
                )
                .await;
                Ok(item)
            }
            Err(e) => Err(self.fail(generation, "update action item", e).await),
        }
    }

    pub async fn delete_action_item(&self, post_id: &str, item_id: &str) -> SyncResult<()> {
        self.require_identity()?;
        let generation = self.generation().await;
        match self
            .write("delete_action_item", || {
                self.gateway().delete(Table::ActionItems, item_id)
            })
            .await
        {
            Ok(()) => {
                info!(post_id, item_id, "action item deleted");
                self.commit(
                    generation,
                    Patch::RemoveActionItem {
                        post_id: post_id.to_string(),
                        item_id: item_id.to_string(),
                    },
                )
                .await;
                Ok(())
            }
            Err(e) => Err(self.fail(generation, "delete action item", e).await),
        }
    }
}
