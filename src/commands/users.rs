//! Known Users

use bulletin_gateway::{Direction, Query, Table};
use tracing::{info, warn};

use super::BulletinStore;
use crate::error::SyncResult;
use crate::models::{decode_rows, User};

impl BulletinStore {
    /// Refresh the user list used for assignment. A failure leaves the
    /// previous list and the post error untouched.
    pub async fn fetch_users(&self) -> SyncResult<usize> {
        let generation = {
            let mut state = self.lock().await;
            state.snapshot.users_loading = true;
            self.publish(&state);
            state.generation
        };

        let query = Query::all().order_by("full_name", Direction::Ascending);
        let result = self
            .load_policy()
            .run("fetch_users", || self.gateway().select(Table::Profiles, &query))
            .await
            .and_then(decode_rows::<User>);

        let mut state = self.lock().await;
        if state.generation != generation {
            return result.map(|users| users.len());
        }
        state.snapshot.users_loading = false;
        let outcome = match result {
            Ok(users) => {
                let count = users.len();
                info!(users = count, "users loaded");
                state.snapshot.users = users;
                Ok(count)
            }
            Err(e) => {
                warn!(error = %e, "failed to load users");
                Err(e)
            }
        };
        self.publish(&state);
        outcome
    }

    /// Display name for `user_id`, or "Unknown User"
    pub fn resolve_user_name(&self, user_id: &str) -> String {
        self.snapshot().user_name(user_id)
    }
}
