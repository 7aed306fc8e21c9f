//! Synchronization State
//!
//! The snapshot published to subscribers, the private bookkeeping behind it,
//! and the reducer every post/item change goes through.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::models::{ActionItem, Entity, Post, User};

/// Placeholder name for assignees missing from the user list
pub const UNKNOWN_USER: &str = "Unknown User";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LoadPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Error,
}

/// Immutable view of the board, shared with the view layer
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Snapshot {
    pub phase: LoadPhase,
    /// Newest first
    pub posts: Vec<Post>,
    pub loading: bool,
    pub error: Option<String>,
    pub loading_since: Option<DateTime<Utc>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Ordered by full name
    pub users: Vec<User>,
    pub users_loading: bool,
}

impl Snapshot {
    pub fn post(&self, post_id: &str) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == post_id)
    }

    pub fn action_item(&self, post_id: &str, item_id: &str) -> Option<&ActionItem> {
        self.post(post_id)?
            .action_items
            .iter()
            .find(|i| i.id == item_id)
    }

    /// A load has been running for at least `threshold`
    pub fn is_stalled(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        if !self.loading {
            return false;
        }
        let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
        self.loading_since
            .map_or(false, |since| now.signed_duration_since(since) >= threshold)
    }

    pub fn user(&self, user_id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == user_id)
    }

    /// Display name for an assignee, "Unknown User" when unresolved
    pub fn user_name(&self, user_id: &str) -> String {
        self.user(user_id)
            .map(|u| u.full_name.trim())
            .filter(|name| !name.is_empty())
            .unwrap_or(UNKNOWN_USER)
            .to_string()
    }
}

/// A change to the post collection
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    SetPosts(Vec<Post>),
    AddPost(Post),
    RemovePost(String),
    AddActionItem { post_id: String, item: ActionItem },
    ReplaceActionItem { post_id: String, item: ActionItem },
    RemoveActionItem { post_id: String, item_id: String },
}

/// Apply `patch` to `posts`. Applying a patch twice has the same effect as
/// applying it once.
pub fn apply(posts: &mut Vec<Post>, patch: &Patch) {
    match patch {
        Patch::SetPosts(next) => *posts = next.clone(),
        Patch::AddPost(post) => {
            if !replace_by_id(posts, post.clone()) {
                posts.insert(0, post.clone());
            }
        }
        Patch::RemovePost(post_id) => remove_by_id(posts, post_id),
        Patch::AddActionItem { post_id, item } => {
            if let Some(post) = find_mut(posts, post_id) {
                if !replace_by_id(&mut post.action_items, item.clone()) {
                    post.action_items.push(item.clone());
                }
            }
        }
        Patch::ReplaceActionItem { post_id, item } => {
            if let Some(post) = find_mut(posts, post_id) {
                replace_by_id(&mut post.action_items, item.clone());
            }
        }
        Patch::RemoveActionItem { post_id, item_id } => {
            if let Some(post) = find_mut(posts, post_id) {
                remove_by_id(&mut post.action_items, item_id);
            }
        }
    }
}

fn find_mut<'a, T: Entity>(list: &'a mut [T], id: &str) -> Option<&'a mut T> {
    list.iter_mut().find(|entry| entry.id() == id)
}

/// Replace the entry with the same id; false if there is none
fn replace_by_id<T: Entity>(list: &mut [T], updated: T) -> bool {
    match find_mut(list, updated.id()) {
        Some(entry) => {
            *entry = updated;
            true
        }
        None => false,
    }
}

fn remove_by_id<T: Entity>(list: &mut Vec<T>, id: &str) {
    list.retain(|entry| entry.id() != id);
}

/// Nest `items` under their posts. Items are ordered by creation time;
/// items whose post is absent are dropped.
pub fn join(mut posts: Vec<Post>, items: Vec<ActionItem>) -> Vec<Post> {
    let mut by_post: HashMap<String, Vec<ActionItem>> = HashMap::new();
    for item in items {
        by_post.entry(item.post_id.clone()).or_default().push(item);
    }

    for post in posts.iter_mut() {
        let mut nested = by_post.remove(&post.id).unwrap_or_default();
        nested.sort_by_key(|item| item.created_at);
        post.action_items = nested;
    }

    if !by_post.is_empty() {
        let orphans: usize = by_post.values().map(Vec::len).sum();
        debug!(orphans, "dropped action items without a post");
    }
    posts
}

/// Identifies one full load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LoadTicket {
    pub id: u64,
    pub generation: u64,
}

/// Owned by the store behind a mutex; only the snapshot is ever published
#[derive(Debug, Default)]
pub(crate) struct SyncState {
    pub snapshot: Snapshot,
    /// Bumped on every reset; work started under an older value is stale
    pub generation: u64,
    pub in_flight: Option<u64>,
    next_ticket: u64,
    /// Patches applied while a load is in flight, replayed on its result
    journal: Vec<Patch>,
    pub last_success_at: Option<Instant>,
}

impl SyncState {
    pub fn begin_load(&mut self) -> LoadTicket {
        self.next_ticket += 1;
        self.in_flight = Some(self.next_ticket);
        self.journal.clear();
        self.snapshot.phase = LoadPhase::Loading;
        self.snapshot.loading = true;
        self.snapshot.loading_since = Some(Utc::now());
        LoadTicket {
            id: self.next_ticket,
            generation: self.generation,
        }
    }

    pub fn owns(&self, ticket: LoadTicket) -> bool {
        self.generation == ticket.generation && self.in_flight == Some(ticket.id)
    }

    /// Install a load result, replaying patches made while it ran
    pub fn finish_load(&mut self, mut posts: Vec<Post>) -> usize {
        for patch in self.journal.drain(..) {
            apply(&mut posts, &patch);
        }
        let count = posts.len();
        self.in_flight = None;
        self.snapshot.posts = posts;
        self.snapshot.phase = LoadPhase::Ready;
        self.snapshot.loading = false;
        self.snapshot.loading_since = None;
        self.snapshot.error = None;
        self.snapshot.last_synced_at = Some(Utc::now());
        self.last_success_at = Some(Instant::now());
        count
    }

    /// Record a failed load; posts are left as they were
    pub fn fail_load(&mut self, message: String) {
        self.in_flight = None;
        self.journal.clear();
        self.snapshot.phase = LoadPhase::Error;
        self.snapshot.loading = false;
        self.snapshot.loading_since = None;
        self.snapshot.error = Some(message);
    }

    /// Apply a mutation result to the current posts
    pub fn commit(&mut self, patch: Patch) {
        apply(&mut self.snapshot.posts, &patch);
        if self.in_flight.is_some() {
            self.journal.push(patch);
        }
    }

    /// Back to the signed-out state; any running load becomes stale
    pub fn reset(&mut self) {
        self.generation += 1;
        self.in_flight = None;
        self.journal.clear();
        self.last_success_at = None;
        self.snapshot = Snapshot::default();
    }
}
