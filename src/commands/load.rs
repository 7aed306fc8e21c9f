//! Full Loads
//!
//! Both collections are read in one attempt and joined; at most one load
//! runs at a time.

use bulletin_gateway::{Direction, GatewayResult, Query, Row, Table};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::BulletinStore;
use crate::error::SyncResult;
use crate::models::{decode_rows, ActionItem, Post};
use crate::store::{join, LoadPhase};

/// What a load request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied { posts: usize },
    SkippedInFlight,
    SkippedCooldown,
    SkippedSignedOut,
    /// Finished after a reset or identity change; result not applied
    Discarded,
}

impl BulletinStore {
    /// Refresh unless one is running or the last success is recent
    pub async fn load_all(&self) -> SyncResult<LoadOutcome> {
        self.run_load(false).await
    }

    /// Refresh now, ignoring the cooldown
    pub async fn reload(&self) -> SyncResult<LoadOutcome> {
        self.run_load(true).await
    }

    async fn run_load(&self, forced: bool) -> SyncResult<LoadOutcome> {
        let Some(identity) = self.inner.session.current() else {
            debug!("load skipped: signed out");
            return Ok(LoadOutcome::SkippedSignedOut);
        };

        let ticket = {
            let mut state = self.lock().await;
            if state.in_flight.is_some() {
                debug!("load skipped: already in flight");
                return Ok(LoadOutcome::SkippedInFlight);
            }
            if !forced && state.snapshot.phase == LoadPhase::Ready {
                if let Some(at) = state.last_success_at {
                    if at.elapsed() < self.refresh_cooldown() {
                        debug!("load skipped: cooldown");
                        return Ok(LoadOutcome::SkippedCooldown);
                    }
                }
            }
            let ticket = state.begin_load();
            self.publish(&state);
            ticket
        };

        let started = Instant::now();
        let result = self
            .load_policy()
            .run("load_all", || self.fetch_board())
            .await
            .and_then(|(posts, items)| {
                Ok(join(decode_rows::<Post>(posts)?, decode_rows::<ActionItem>(items)?))
            });

        let mut state = self.lock().await;
        if !state.owns(ticket) {
            info!("discarding superseded load");
            return Ok(LoadOutcome::Discarded);
        }
        if self.current_user_id().as_deref() != Some(identity.user_id.as_str()) {
            info!("identity changed during load, resetting");
            state.reset();
            self.publish(&state);
            return Ok(LoadOutcome::Discarded);
        }

        match result {
            Ok(posts) => {
                let count = state.finish_load(posts);
                self.publish(&state);
                info!(posts = count, elapsed_ms = started.elapsed().as_millis() as u64, "board loaded");
                Ok(LoadOutcome::Applied { posts: count })
            }
            Err(e) => {
                warn!(error = %e, "board load failed");
                state.fail_load(e.to_string());
                self.publish(&state);
                Err(e)
            }
        }
    }

    /// One attempt: posts newest first, then items oldest first
    async fn fetch_board(&self) -> GatewayResult<(Vec<Row>, Vec<Row>)> {
        let posts = self
            .gateway()
            .select(
                Table::Posts,
                &Query::all().order_by("created_at", Direction::Descending),
            )
            .await?;
        let items = self
            .gateway()
            .select(
                Table::ActionItems,
                &Query::all().order_by("created_at", Direction::Ascending),
            )
            .await?;
        Ok((posts, items))
    }
}
