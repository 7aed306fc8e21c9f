//! Snapshot Views
//!
//! Derived read-only projections of a snapshot's posts: the current user's
//! action items, and the board grouped by calendar day.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, TimeZone};
use serde::Serialize;

use crate::models::{ActionItem, Post};

/// An action item shown outside its post
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssignedItem {
    pub item: ActionItem,
    pub post_title: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MyActionItems {
    /// Newest first
    pub pending: Vec<AssignedItem>,
    /// Newest first
    pub completed: Vec<AssignedItem>,
}

impl MyActionItems {
    pub fn total(&self) -> usize {
        self.pending.len() + self.completed.len()
    }
}

/// Items assigned to `user_id`, plus unassigned items they authored
pub fn my_action_items(posts: &[Post], user_id: &str) -> MyActionItems {
    let mut mine: Vec<AssignedItem> = posts
        .iter()
        .flat_map(|post| {
            post.action_items
                .iter()
                .filter(move |item| item.is_assigned_to(user_id))
                .map(move |item| AssignedItem {
                    item: item.clone(),
                    post_title: post.title.clone(),
                })
        })
        .collect();
    mine.sort_by(|a, b| b.item.created_at.cmp(&a.item.created_at));

    let (completed, pending): (Vec<_>, Vec<_>) =
        mine.into_iter().partition(|entry| entry.item.completed);
    MyActionItems { pending, completed }
}

/// Posts created on one calendar day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayGroup {
    pub day: NaiveDate,
    /// Newest first
    pub posts: Vec<Post>,
}

impl DayGroup {
    pub fn count(&self) -> usize {
        self.posts.len()
    }
}

/// Group posts by the day they were created in `tz`, newest day first
pub fn group_by_day<Tz: TimeZone>(posts: &[Post], tz: &Tz) -> Vec<DayGroup> {
    let mut days: BTreeMap<NaiveDate, Vec<Post>> = BTreeMap::new();
    for post in posts {
        let day = post.created_at.with_timezone(tz).date_naive();
        days.entry(day).or_default().push(post.clone());
    }

    days.into_iter()
        .rev()
        .map(|(day, mut posts)| {
            posts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            DayGroup { day, posts }
        })
        .collect()
}

/// Posts created on `day` in `tz`
pub fn posts_on<'a, Tz: TimeZone>(posts: &'a [Post], day: NaiveDate, tz: &Tz) -> Vec<&'a Post> {
    posts
        .iter()
        .filter(|post| post.created_at.with_timezone(tz).date_naive() == day)
        .collect()
}

/// "Today", "Yesterday", "Oct 3", or "Oct 3, 2025" for another year
pub fn day_label(day: NaiveDate, today: NaiveDate) -> String {
    if day == today {
        "Today".to_string()
    } else if today.pred_opt() == Some(day) {
        "Yesterday".to_string()
    } else if day.year() == today.year() {
        day.format("%b %-d").to_string()
    } else {
        day.format("%b %-d, %Y").to_string()
    }
}
