//! Store Integration Tests
//!
//! BulletinStore over an in-memory SQLite gateway that can be made to fail,
//! hang, or hold its reads.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bulletin_gateway::{Gateway, GatewayError, Query, Table};

    use crate::commands::LoadOutcome;
    use crate::error::SyncError;
    use crate::models::NewPost;
    use crate::session::SessionProvider;
    use crate::store::{LoadPhase, UNKNOWN_USER};
    use crate::testing::{dana, lee, settings, store_for};

    #[tokio::test]
    async fn test_load_joins_items_under_posts() {
        let (store, gateway, _session) = store_for(Some(dana()));
        let monday = gateway.seed_post("Monday", &dana()).await;
        let tuesday = gateway.seed_post("Tuesday", &dana()).await;
        gateway.seed_item(&monday, "Order rebar", &dana()).await;
        gateway.seed_item(&tuesday, "Call inspector", &dana()).await;
        gateway.seed_item(&monday, "Check pump", &dana()).await;
        gateway.seed_post("Wednesday", &dana()).await;

        let outcome = store.load_all().await;

        assert_eq!(outcome, Ok(LoadOutcome::Applied { posts: 3 }));
        assert_eq!(gateway.select_calls(), 2);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.phase, LoadPhase::Ready);
        assert!(!snapshot.loading);
        assert!(snapshot.error.is_none());
        assert!(snapshot.last_synced_at.is_some());

        let titles: Vec<&str> = snapshot.posts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Wednesday", "Tuesday", "Monday"]);

        let texts: Vec<&str> = snapshot.posts[2]
            .action_items
            .iter()
            .map(|i| i.text.as_str())
            .collect();
        assert_eq!(texts, vec!["Order rebar", "Check pump"]);
        assert!(snapshot.posts[0].action_items.is_empty());

        for post in &snapshot.posts {
            assert!(post.action_items.iter().all(|i| i.post_id == post.id));
            assert!(post
                .action_items
                .windows(2)
                .all(|w| w[0].created_at <= w[1].created_at));
        }
    }

    #[tokio::test]
    async fn test_second_load_while_in_flight_is_skipped() {
        let (store, gateway, _session) = store_for(Some(dana()));
        let gate = gateway.hold_selects();

        let running = tokio::spawn({
            let store = store.clone();
            async move { store.reload().await }
        });
        gateway.selected.notified().await;

        assert!(store.snapshot().loading);
        assert_eq!(store.load_all().await, Ok(LoadOutcome::SkippedInFlight));
        assert_eq!(store.reload().await, Ok(LoadOutcome::SkippedInFlight));
        assert_eq!(gateway.select_calls(), 1);

        gate.add_permits(2);
        assert_eq!(running.await.unwrap(), Ok(LoadOutcome::Applied { posts: 0 }));
        assert_eq!(gateway.select_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_after_success_only() {
        let (store, gateway, _session) = store_for(Some(dana()));

        assert_eq!(store.load_all().await, Ok(LoadOutcome::Applied { posts: 0 }));
        assert_eq!(store.load_all().await, Ok(LoadOutcome::SkippedCooldown));
        assert_eq!(store.reload().await, Ok(LoadOutcome::Applied { posts: 0 }));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(store.load_all().await, Ok(LoadOutcome::Applied { posts: 0 }));

        gateway.fail_selects(vec![GatewayError::Rejected("denied".into())]);
        assert!(store.reload().await.is_err());
        assert_eq!(store.load_all().await, Ok(LoadOutcome::Applied { posts: 0 }));
    }

    #[tokio::test]
    async fn test_signed_out_commands() {
        let (store, gateway, _session) = store_for(None);

        assert_eq!(store.load_all().await, Ok(LoadOutcome::SkippedSignedOut));
        assert_eq!(
            store.create_post(NewPost::new("T", "C")).await,
            Err(SyncError::NotAuthenticated)
        );
        assert_eq!(
            store.delete_action_item("p1", "a1").await,
            Err(SyncError::NotAuthenticated)
        );
        assert_eq!(gateway.select_calls(), 0);
        assert_eq!(gateway.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_created_post_goes_first_with_no_items() {
        let (store, gateway, _session) = store_for(Some(dana()));
        gateway.seed_post("Monday", &dana()).await;
        store.load_all().await.unwrap();

        let post = store
            .create_post(NewPost::new("  T ", "C"))
            .await
            .expect("create");

        assert_eq!(post.title, "T");
        assert_eq!(post.author_id, "u-dana");
        assert_eq!(post.author_name, "Dana Site");
        let snapshot = store.snapshot();
        assert_eq!(snapshot.posts.len(), 2);
        assert_eq!(snapshot.posts[0], post);
        assert!(snapshot.posts[0].action_items.is_empty());
    }

    #[tokio::test]
    async fn test_create_post_with_items_resolves_assignees() {
        let (store, gateway, _session) = store_for(Some(dana()));
        let lee_id = gateway.seed_profile("Lee Crane").await;
        assert_eq!(store.fetch_users().await, Ok(1));
        assert!(!store.snapshot().users_loading);

        let draft = NewPost::new("Pour", "Level 3 deck")
            .with_action_item("Book pump", lee_id.as_str())
            .with_action_item("   ", lee_id.as_str())
            .with_action_item("Call lab", "u-nobody");
        let post = store.create_post(draft).await.expect("create");

        let summary: Vec<(&str, Option<&str>)> = post
            .action_items
            .iter()
            .map(|i| (i.text.as_str(), i.assigned_to_name.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![("Book pump", Some("Lee Crane")), ("Call lab", Some(UNKNOWN_USER))]
        );
        assert!(post.action_items.iter().all(|i| i.post_id == post.id && !i.completed));
        assert_eq!(store.snapshot().posts[0], post);

        let remote = gateway
            .inner
            .select(Table::ActionItems, &Query::all().eq("post_id", post.id.as_str()))
            .await
            .unwrap();
        assert_eq!(remote.len(), 2);
    }

    #[tokio::test]
    async fn test_create_post_requires_title_and_content() {
        let (store, gateway, _session) = store_for(Some(dana()));

        let err = store.create_post(NewPost::new("   ", "C")).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidInput(_)));
        let err = store.create_post(NewPost::new("T", "\n")).await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidInput(_)));

        assert_eq!(gateway.write_calls(), 0);
        assert!(store.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn test_toggle_twice_restores_flag() {
        let (store, gateway, _session) = store_for(Some(dana()));
        let post_id = gateway.seed_post("Monday", &dana()).await;
        let item_id = gateway.seed_item(&post_id, "Order rebar", &dana()).await;
        store.load_all().await.unwrap();

        let first = store.toggle_action_item(&post_id, &item_id).await.unwrap();
        assert!(first.completed);
        assert!(store.snapshot().action_item(&post_id, &item_id).unwrap().completed);

        let second = store.toggle_action_item(&post_id, &item_id).await.unwrap();
        assert!(!second.completed);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(
            store.snapshot().action_item(&post_id, &item_id),
            Some(&second)
        );
    }

    #[tokio::test]
    async fn test_toggle_unknown_item_is_not_found() {
        let (store, gateway, _session) = store_for(Some(dana()));
        store.load_all().await.unwrap();

        let err = store.toggle_action_item("p1", "missing").await.unwrap_err();

        assert!(matches!(err, SyncError::NotFound(_)));
        assert_eq!(gateway.write_calls(), 0);
        let recorded = store.snapshot().error.clone().unwrap();
        assert!(recorded.starts_with("Failed to update action item"));
    }

    #[tokio::test]
    async fn test_delete_action_item_removes_exactly_one() {
        let (store, gateway, _session) = store_for(Some(dana()));
        let post_id = gateway.seed_post("Monday", &dana()).await;
        gateway.seed_item(&post_id, "a", &dana()).await;
        let doomed = gateway.seed_item(&post_id, "b", &dana()).await;
        gateway.seed_item(&post_id, "c", &dana()).await;
        store.load_all().await.unwrap();
        let before = store.snapshot().post(&post_id).unwrap().action_items.clone();

        store.delete_action_item(&post_id, &doomed).await.unwrap();

        let after = store.snapshot().post(&post_id).unwrap().action_items.clone();
        assert_eq!(after.len(), before.len() - 1);
        assert!(after.iter().all(|i| i.id != doomed));
        assert_eq!(after, vec![before[0].clone(), before[2].clone()]);
    }

    #[tokio::test]
    async fn test_add_action_item_appends() {
        let (store, gateway, _session) = store_for(Some(dana()));
        let post_id = gateway.seed_post("Monday", &dana()).await;
        gateway.seed_item(&post_id, "first", &dana()).await;
        store.load_all().await.unwrap();

        let item = store
            .add_action_item(&post_id, " second ", "u-nobody")
            .await
            .unwrap();

        assert_eq!(item.text, "second");
        assert_eq!(item.assigned_to_name.as_deref(), Some(UNKNOWN_USER));
        let snapshot = store.snapshot();
        let items = &snapshot.post(&post_id).unwrap().action_items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], item);

        let err = store.add_action_item(&post_id, "  ", "u-lee").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_delete_post() {
        let (store, gateway, _session) = store_for(Some(dana()));
        let keep = gateway.seed_post("Monday", &dana()).await;
        let doomed = gateway.seed_post("Tuesday", &dana()).await;
        gateway.seed_item(&doomed, "x", &dana()).await;
        store.load_all().await.unwrap();

        store.delete_post(&doomed).await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.posts.len(), 1);
        assert_eq!(snapshot.posts[0].id, keep);
        let items = gateway
            .inner
            .select(Table::ActionItems, &Query::all())
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let (store, gateway, session) = store_for(Some(dana()));
        gateway.seed_post("Monday", &dana()).await;
        store.load_all().await.unwrap();
        let _ = store.toggle_action_item("p1", "missing").await;
        assert!(store.snapshot().error.is_some());

        session.sign_out();
        store.reset().await;

        let snapshot = store.snapshot();
        assert!(snapshot.posts.is_empty());
        assert!(snapshot.error.is_none());
        assert_eq!(snapshot.phase, LoadPhase::Idle);
    }

    #[tokio::test]
    async fn test_reset_discards_in_flight_load() {
        let (store, gateway, _session) = store_for(Some(dana()));
        gateway.seed_post("Monday", &dana()).await;
        let gate = gateway.hold_selects();

        let running = tokio::spawn({
            let store = store.clone();
            async move { store.reload().await }
        });
        gateway.selected.notified().await;
        store.reset().await;
        gate.add_permits(10);

        assert_eq!(running.await.unwrap(), Ok(LoadOutcome::Discarded));
        let snapshot = store.snapshot();
        assert!(snapshot.posts.is_empty());
        assert!(!snapshot.loading);
        assert_eq!(snapshot.phase, LoadPhase::Idle);

        // The guard was released
        assert_eq!(store.reload().await, Ok(LoadOutcome::Applied { posts: 1 }));
    }

    #[tokio::test]
    async fn test_identity_change_during_load_discards_result() {
        let (store, gateway, session) = store_for(Some(dana()));
        gateway.seed_post("Monday", &dana()).await;
        let gate = gateway.hold_selects();

        let running = tokio::spawn({
            let store = store.clone();
            async move { store.reload().await }
        });
        gateway.selected.notified().await;
        session.sign_in(lee());
        gate.add_permits(10);

        assert_eq!(running.await.unwrap(), Ok(LoadOutcome::Discarded));
        assert!(store.snapshot().posts.is_empty());
        assert_eq!(session.current().map(|i| i.user_id), Some("u-lee".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_gateway_exhausts_retries() {
        let (store, gateway, _session) = store_for(Some(dana()));
        let policy = settings().load_policy();
        gateway.hang_selects(true);
        let started = tokio::time::Instant::now();

        let err = store.load_all().await.unwrap_err();

        assert_eq!(
            err,
            SyncError::RetriesExhausted {
                attempts: 3,
                last: GatewayError::Timeout
            }
        );
        assert!(started.elapsed() <= policy.attempt_timeout * 3);
        assert_eq!(gateway.select_calls(), 3);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.phase, LoadPhase::Error);
        assert!(!snapshot.loading);
        assert!(!snapshot.error.clone().unwrap_or_default().is_empty());

        gateway.hang_selects(false);
        assert_eq!(store.load_all().await, Ok(LoadOutcome::Applied { posts: 0 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_is_retried() {
        let (store, gateway, _session) = store_for(Some(dana()));
        gateway.fail_selects(vec![GatewayError::Transport("connection reset".into())]);

        assert_eq!(store.load_all().await, Ok(LoadOutcome::Applied { posts: 0 }));
        assert_eq!(gateway.select_calls(), 3);
    }

    #[tokio::test]
    async fn test_rejected_load_keeps_previous_posts() {
        let (store, gateway, _session) = store_for(Some(dana()));
        gateway.seed_post("Monday", &dana()).await;
        store.load_all().await.unwrap();
        let calls = gateway.select_calls();
        gateway.fail_selects(vec![GatewayError::Rejected("denied".into())]);

        let err = store.reload().await.unwrap_err();

        assert_eq!(err, SyncError::Gateway(GatewayError::Rejected("denied".into())));
        assert_eq!(gateway.select_calls(), calls + 1);
        let snapshot = store.snapshot();
        assert_eq!(snapshot.posts.len(), 1);
        assert_eq!(snapshot.error.as_deref(), Some("rejected by store: denied"));
    }

    #[tokio::test]
    async fn test_mutation_during_load_survives_result() {
        let (store, gateway, _session) = store_for(Some(dana()));
        gateway.seed_post("Monday", &dana()).await;
        let gate = gateway.hold_selects();

        let running = tokio::spawn({
            let store = store.clone();
            async move { store.reload().await }
        });
        // Posts have been read without the new one
        gateway.selected.notified().await;
        let late = store.create_post(NewPost::new("Late", "C")).await.unwrap();
        assert_eq!(store.snapshot().posts[0].id, late.id);

        gate.add_permits(2);
        assert_eq!(running.await.unwrap(), Ok(LoadOutcome::Applied { posts: 2 }));
        let snapshot = store.snapshot();
        assert_eq!(snapshot.posts[0].id, late.id);
        assert_eq!(snapshot.posts[1].title, "Monday");
    }

    #[tokio::test]
    async fn test_partial_create_reports_orphaned_post() {
        let (store, gateway, _session) = store_for(Some(dana()));
        gateway.fail_next_insert(
            Table::ActionItems,
            GatewayError::Rejected("check constraint".into()),
        );

        let draft = NewPost::new("Pour", "Level 3").with_action_item("Book pump", "u-lee");
        let err = store.create_post(draft).await.unwrap_err();

        let SyncError::PartialCreate { post_id, source } = err else {
            panic!("expected a partial create error");
        };
        assert_eq!(source, GatewayError::Rejected("check constraint".into()));
        assert!(store.snapshot().post(&post_id).is_none());
        let remote = gateway
            .inner
            .select(Table::Posts, &Query::all().eq("id", post_id.as_str()))
            .await
            .unwrap();
        assert_eq!(remote.len(), 1);
        let recorded = store.snapshot().error.clone().unwrap();
        assert!(recorded.starts_with("Failed to create post"));
    }

    #[tokio::test]
    async fn test_failed_write_is_not_retried_and_is_recorded() {
        let (store, gateway, _session) = store_for(Some(dana()));
        store.load_all().await.unwrap();
        gateway.fail_next_insert(Table::Posts, GatewayError::Transport("reset".into()));

        let err = store.create_post(NewPost::new("T", "C")).await.unwrap_err();

        assert_eq!(err, SyncError::Gateway(GatewayError::Transport("reset".into())));
        assert_eq!(gateway.write_calls(), 1);
        assert_eq!(
            store.snapshot().error.as_deref(),
            Some("Failed to create post: transport error: reset")
        );

        store.reload().await.unwrap();
        assert!(store.snapshot().error.is_none());
    }

    #[tokio::test]
    async fn test_failed_user_fetch_leaves_post_error_alone() {
        let (store, gateway, _session) = store_for(Some(dana()));
        gateway.fail_selects(vec![GatewayError::Rejected("denied".into())]);

        assert!(store.fetch_users().await.is_err());

        let snapshot = store.snapshot();
        assert!(!snapshot.users_loading);
        assert!(snapshot.users.is_empty());
        assert!(snapshot.error.is_none());
    }

    #[tokio::test]
    async fn test_fresh_store_is_not_stalled() {
        let (store, _gateway, _session) = store_for(Some(dana()));
        assert!(!store.is_stalled());
        assert_eq!(store.resolve_user_name("u-anyone"), UNKNOWN_USER);
    }
}
