use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;

use super::*;
use crate::intent::{Intent, IntentChannel};
use crate::models::{parse_date, Activity};
use crate::remote::{MockCall, MockRemoteService};

type TestStore = SyncStore<MockRemoteService>;

fn activity(id: &str, date: &str) -> Activity {
    Activity::new(format!("Activity {}", id), parse_date(date).unwrap()).with_id(id)
}

fn setup(mock: &MockRemoteService) -> (TestStore, UnboundedReceiver<Intent>) {
    setup_with_config(mock, StoreConfig::default())
}

fn setup_with_config(
    mock: &MockRemoteService,
    config: StoreConfig,
) -> (TestStore, UnboundedReceiver<Intent>) {
    let (intents, rx) = IntentChannel::new();
    let intents = Arc::new(intents);
    let store = SyncStore::new(mock.clone())
        .with_config(config)
        .with_notifier(intents.clone())
        .with_navigator(intents);
    (store, rx)
}

fn drain(rx: &mut UnboundedReceiver<Intent>) -> Vec<Intent> {
    let mut intents = Vec::new();
    while let Ok(intent) = rx.try_recv() {
        intents.push(intent);
    }
    intents
}

/// Yields until the mock has received `n` calls.
async fn wait_for_calls(mock: &MockRemoteService, n: usize) {
    for _ in 0..1000 {
        if mock.call_count() >= n {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("expected {} remote call(s), saw {}", n, mock.call_count());
}

fn ids(records: &[Activity]) -> Vec<String> {
    let mut ids: Vec<String> = records.iter().map(|a| a.id.clone()).collect();
    ids.sort();
    ids
}

// ========== load_all ==========

#[tokio::test]
async fn test_load_all_merges_and_normalizes() {
    let mock = MockRemoteService::with_records([
        activity("a1", "2021-01-01T09:00:00.1234567"),
        activity("a2", "2021-01-02T10:00:00"),
    ]);
    let (store, mut rx) = setup(&mock);

    assert_eq!(store.load_all().await.unwrap(), 2);
    assert_eq!(ids(&store.values()), vec!["a1", "a2"]);
    assert_eq!(
        store.get("a1").unwrap().date,
        parse_date("2021-01-01T09:00:00").unwrap()
    );
    assert_eq!(store.loading_state(), LoadingState::Idle);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_load_all_keeps_records_missing_from_response() {
    let mock = MockRemoteService::with_records([
        activity("a1", "2021-01-01T09:00"),
        activity("a2", "2021-01-02T10:00"),
    ]);
    let (store, _rx) = setup(&mock);
    store.load_all().await.unwrap();

    // Gone on the server, but a load is a merge, not a replace.
    mock.delete("a2").await.unwrap();
    assert_eq!(store.load_all().await.unwrap(), 1);

    assert_eq!(ids(&store.values()), vec!["a1", "a2"]);
}

#[tokio::test]
async fn test_load_all_failure_leaves_registry_unchanged() {
    let mock = MockRemoteService::with_records([activity("a1", "2021-01-01T09:00")]);
    let (store, mut rx) = setup(&mock);
    store.load_all().await.unwrap();

    mock.insert(activity("a2", "2021-01-02T09:00"));
    mock.fail_next(RemoteError::Network("connection refused".to_string()));

    let err = store.load_all().await.unwrap_err();
    assert!(matches!(err, StoreError::Transport(_)));
    assert_eq!(ids(&store.values()), vec!["a1"]);
    assert_eq!(store.loading_state(), LoadingState::Idle);

    let intents = drain(&mut rx);
    assert_eq!(intents.len(), 1);
    assert!(matches!(&intents[0], Intent::NotifyError(m) if m.contains("connection refused")));

    // Retrying is always allowed.
    assert_eq!(store.load_all().await.unwrap(), 2);
}

#[tokio::test]
async fn test_concurrent_load_all_issues_one_fetch() {
    let mock = MockRemoteService::with_records([activity("a1", "2021-01-01T09:00")]);
    let (store, _rx) = setup(&mock);
    mock.pause();

    let (first, second, _) = tokio::join!(
        store.load_all(),
        async {
            wait_for_calls(&mock, 1).await;
            assert_eq!(store.loading_state(), LoadingState::LoadingAll);
            store.load_all().await
        },
        async {
            wait_for_calls(&mock, 1).await;
            mock.resume();
        }
    );

    assert_eq!(first.unwrap(), 1);
    assert_eq!(second.unwrap(), 1);
    assert_eq!(mock.calls(), vec![MockCall::List]);
    assert_eq!(store.loading_state(), LoadingState::Idle);
}

// ========== load_one ==========

#[tokio::test]
async fn test_load_one_fetches_once_then_hits_cache() {
    let mock = MockRemoteService::with_records([activity("a1", "2021-01-01T09:00:00.5")]);
    let (store, _rx) = setup(&mock);

    let first = store.load_one("a1").await.unwrap();
    let second = store.load_one("a1").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.date, parse_date("2021-01-01T09:00").unwrap());
    assert_eq!(mock.calls(), vec![MockCall::Get("a1".to_string())]);
    assert_eq!(store.selected().unwrap().id, "a1");
    assert!(store.get("a1").is_some());
    assert!(!store.is_fetching("a1"));
}

#[tokio::test]
async fn test_load_one_uses_fetching_mark_not_loading_state() {
    let mock = MockRemoteService::with_records([activity("a1", "2021-01-01T09:00")]);
    let (store, _rx) = setup(&mock);
    mock.pause();

    let (result, _) = tokio::join!(store.load_one("a1"), async {
        wait_for_calls(&mock, 1).await;
        assert!(store.is_fetching("a1"));
        assert_eq!(store.loading_state(), LoadingState::Idle);
        mock.resume();
    });

    assert!(result.is_ok());
    assert!(!store.is_fetching("a1"));
}

#[tokio::test]
async fn test_concurrent_load_one_same_id_issues_one_fetch() {
    let mock = MockRemoteService::with_records([activity("a1", "2021-01-01T09:00")]);
    let (store, _rx) = setup(&mock);
    mock.pause();

    let (first, second, _) = tokio::join!(
        store.load_one("a1"),
        async {
            wait_for_calls(&mock, 1).await;
            store.load_one("a1").await
        },
        async {
            wait_for_calls(&mock, 1).await;
            mock.resume();
        }
    );

    assert_eq!(first.unwrap().id, "a1");
    assert_eq!(second.unwrap().id, "a1");
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_load_one_not_found() {
    let mock = MockRemoteService::new();
    let (store, mut rx) = setup(&mock);

    let err = store.load_one("missing").await.unwrap_err();

    assert_eq!(err, StoreError::NotFound("missing".to_string()));
    assert!(store.selected().is_none());
    assert!(store.get("missing").is_none());
    assert!(!store.is_fetching("missing"));
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn test_load_one_rejects_empty_id() {
    let mock = MockRemoteService::new();
    let (store, _rx) = setup(&mock);

    assert!(matches!(
        store.load_one("").await,
        Err(StoreError::InvalidRecord(_))
    ));
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_load_one_rejects_record_with_other_id() {
    let mock = MockRemoteService::new();
    mock.insert_at("a1", activity("b2", "2021-01-01T09:00"));
    let (store, mut rx) = setup(&mock);

    let err = store.load_one("a1").await.unwrap_err();

    assert!(matches!(err, StoreError::Transport(ref m) if m.contains("b2")));
    assert!(store.get("a1").is_none());
    assert!(store.get("b2").is_none());
    assert!(store.selected().is_none());
    assert!(!store.is_fetching("a1"));
    assert_eq!(drain(&mut rx).len(), 1);
}

// ========== create ==========

#[tokio::test]
async fn test_create_commits_and_navigates() {
    let mock = MockRemoteService::new();
    let (store, mut rx) = setup(&mock);
    store.open_create_form();

    let created = store
        .create(activity("a1", "2021-01-01T09:00"))
        .await
        .unwrap();

    assert_eq!(created.id, "a1");
    assert_eq!(store.get("a1").unwrap(), created);
    assert_eq!(store.mutation_state("a1"), MutationState::Idle);
    assert!(!store.edit_mode());
    assert!(store.selected().is_none());
    assert_eq!(
        drain(&mut rx),
        vec![Intent::NavigateToRecord("a1".to_string())]
    );
}

#[tokio::test]
async fn test_create_assigns_id_when_missing() {
    let mock = MockRemoteService::new();
    let (store, _rx) = setup(&mock);

    let created = store
        .create(activity("", "2021-01-01T09:00"))
        .await
        .unwrap();

    assert!(uuid::Uuid::parse_str(&created.id).is_ok());
    assert!(store.get(&created.id).is_some());
    assert!(mock.record(&created.id).is_some());
}

#[tokio::test]
async fn test_create_existing_id_conflicts_locally() {
    let mock = MockRemoteService::with_records([activity("a1", "2021-01-01T09:00")]);
    let (store, mut rx) = setup(&mock);
    store.load_all().await.unwrap();

    let err = store
        .create(activity("a1", "2021-02-01T09:00"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        StoreError::Conflict {
            id: "a1".to_string(),
            kind: ConflictKind::AlreadyExists
        }
    );
    assert_eq!(mock.calls(), vec![MockCall::List]);
    assert_eq!(store.mutation_state("a1"), MutationState::Idle);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_create_failure_leaves_no_trace() {
    let mock = MockRemoteService::new();
    let (store, mut rx) = setup(&mock);
    mock.fail_next(RemoteError::Status {
        status: 500,
        message: "server exploded".to_string(),
    });

    let err = store
        .create(activity("a1", "2021-01-01T09:00"))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Transport(_)));
    assert!(store.get("a1").is_none());
    assert_eq!(store.mutation_state("a1"), MutationState::Idle);
    assert!(!store.is_submitting());

    let intents = drain(&mut rx);
    assert_eq!(intents.len(), 1);
    assert!(matches!(&intents[0], Intent::NotifyError(_)));

    // Same call again succeeds.
    assert!(store.create(activity("a1", "2021-01-01T09:00")).await.is_ok());
}

#[tokio::test]
async fn test_create_side_effects_follow_config() {
    let mock = MockRemoteService::new();
    let config = StoreConfig {
        navigate_on_persist: false,
        select_on_persist: true,
        remote_timeout: None,
    };
    let (store, mut rx) = setup_with_config(&mock, config);

    store
        .create(activity("a1", "2021-01-01T09:00"))
        .await
        .unwrap();

    assert_eq!(store.selected().unwrap().id, "a1");
    assert!(drain(&mut rx).is_empty());
}

// ========== update ==========

#[tokio::test]
async fn test_update_while_submitting_conflicts() {
    let mock = MockRemoteService::with_records([activity("a1", "2021-01-01T09:00")]);
    let (store, _rx) = setup(&mock);
    store.load_all().await.unwrap();
    mock.pause();

    let (first, second) = tokio::join!(
        store.update(activity("a1", "2021-01-01T09:00").with_city("Oslo")),
        async {
            wait_for_calls(&mock, 2).await;
            assert_eq!(store.mutation_state("a1"), MutationState::Submitting);
            assert!(store.is_submitting());
            let result = store
                .update(activity("a1", "2021-01-01T09:00").with_city("Bergen"))
                .await;
            mock.resume();
            result
        }
    );

    assert_eq!(first.unwrap().city, "Oslo");
    assert_eq!(
        second.unwrap_err(),
        StoreError::Conflict {
            id: "a1".to_string(),
            kind: ConflictKind::InFlight
        }
    );
    assert_eq!(
        mock.calls(),
        vec![MockCall::List, MockCall::Update("a1".to_string())]
    );
    assert_eq!(store.get("a1").unwrap().city, "Oslo");
    assert_eq!(store.mutation_state("a1"), MutationState::Idle);
}

#[tokio::test]
async fn test_update_unknown_id_is_not_found_locally() {
    let mock = MockRemoteService::new();
    let (store, mut rx) = setup(&mock);

    let err = store
        .update(activity("ghost", "2021-01-01T09:00"))
        .await
        .unwrap_err();

    assert_eq!(err, StoreError::NotFound("ghost".to_string()));
    assert_eq!(mock.call_count(), 0);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_update_refreshes_selected_record() {
    let mock = MockRemoteService::with_records([
        activity("a1", "2021-01-01T09:00"),
        activity("a2", "2021-01-02T09:00"),
    ]);
    let (store, mut rx) = setup(&mock);
    store.load_all().await.unwrap();

    store.select("a1");
    store
        .update(activity("a1", "2021-01-01T09:00").with_venue("Hall"))
        .await
        .unwrap();
    assert_eq!(store.selected().unwrap().venue, "Hall");

    store
        .update(activity("a2", "2021-01-02T09:00").with_venue("Park"))
        .await
        .unwrap();
    assert_eq!(store.selected().unwrap().id, "a1");

    assert_eq!(
        drain(&mut rx),
        vec![
            Intent::NavigateToRecord("a1".to_string()),
            Intent::NavigateToRecord("a2".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_update_failure_keeps_confirmed_copy() {
    let mock = MockRemoteService::with_records([activity("a1", "2021-01-01T09:00")]);
    let (store, mut rx) = setup(&mock);
    store.load_all().await.unwrap();
    mock.fail_next(RemoteError::Unauthorized);

    let err = store
        .update(activity("a1", "2021-01-01T09:00").with_city("Nowhere"))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Transport(_)));
    assert!(store.get("a1").unwrap().city.is_empty());
    assert_eq!(store.mutation_state("a1"), MutationState::Idle);
    assert!(matches!(drain(&mut rx).as_slice(), [Intent::NotifyError(_)]));
}

// ========== delete ==========

#[tokio::test]
async fn test_delete_removes_record_and_tracks_tag() {
    let mock = MockRemoteService::with_records([
        activity("a1", "2021-01-01T09:00"),
        activity("a2", "2021-01-02T09:00"),
    ]);
    let (store, mut rx) = setup(&mock);
    store.load_all().await.unwrap();
    mock.pause();

    let (result, _) = tokio::join!(store.delete("a1", "delete-a1"), async {
        wait_for_calls(&mock, 2).await;
        assert_eq!(store.delete_target("a1").as_deref(), Some("delete-a1"));
        assert_eq!(store.mutation_state("a1"), MutationState::Submitting);
        mock.resume();
    });

    result.unwrap();
    assert!(store.get("a1").is_none());
    assert_eq!(ids(&store.values()), vec!["a2"]);
    assert!(store.delete_target("a1").is_none());
    assert_eq!(store.mutation_state("a1"), MutationState::Idle);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_delete_failure_keeps_record() {
    let mock = MockRemoteService::with_records([activity("a1", "2021-01-01T09:00")]);
    let (store, mut rx) = setup(&mock);
    store.load_all().await.unwrap();
    mock.fail_next(RemoteError::Network("reset".to_string()));

    assert!(store.delete("a1", "btn").await.is_err());

    assert!(store.get("a1").is_some());
    assert!(store.delete_target("a1").is_none());
    assert_eq!(store.mutation_state("a1"), MutationState::Idle);
    assert_eq!(drain(&mut rx).len(), 1);
}

// ========== concurrency ==========

#[tokio::test]
async fn test_mutations_on_different_ids_are_independent() {
    let mock = MockRemoteService::with_records([
        activity("a1", "2021-01-01T09:00"),
        activity("a2", "2021-01-02T09:00"),
    ]);
    let (store, _rx) = setup(&mock);
    store.load_all().await.unwrap();
    mock.pause();

    let (first, second, _) = tokio::join!(
        store.update(activity("a1", "2021-01-01T09:00").with_city("Lima")),
        store.delete("a2", "row-2"),
        async {
            wait_for_calls(&mock, 3).await;
            assert_eq!(store.mutation_state("a1"), MutationState::Submitting);
            assert_eq!(store.mutation_state("a2"), MutationState::Submitting);
            mock.resume();
        }
    );

    first.unwrap();
    second.unwrap();
    assert_eq!(ids(&store.values()), vec!["a1"]);
    assert_eq!(store.get("a1").unwrap().city, "Lima");
    assert!(!store.is_submitting());
}

/// Yields until no mutation on `id` is in flight.
async fn wait_until_idle(store: &TestStore, id: &str) {
    for _ in 0..1000 {
        if store.mutation_state(id) == MutationState::Idle {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("mutation on {} never finished", id);
}

#[tokio::test]
async fn test_interleaved_mutations_converge() {
    // Both completion orders of an update of b racing a delete of c.
    for update_first in [true, false] {
        let mock = MockRemoteService::new();
        let (store, _rx) = setup(&mock);

        let (a, b, c) = tokio::join!(
            store.create(activity("a", "2021-01-01T09:00")),
            store.create(activity("b", "2021-01-02T09:00")),
            store.create(activity("c", "2021-01-03T09:00")),
        );
        a.unwrap();
        b.unwrap();
        c.unwrap();

        let update_call = MockCall::Update("b".to_string());
        let delete_call = MockCall::Delete("c".to_string());
        mock.hold(update_call.clone());
        mock.hold(delete_call.clone());
        let ((first_call, first_id), (second_call, second_id)) = if update_first {
            ((update_call, "b"), (delete_call, "c"))
        } else {
            ((delete_call, "c"), (update_call, "b"))
        };

        let (b, c, _) = tokio::join!(
            store.update(activity("b", "2021-01-02T09:00").with_title("B2")),
            store.delete("c", "row-c"),
            async {
                wait_for_calls(&mock, 5).await;
                mock.release(&first_call);
                wait_until_idle(&store, first_id).await;
                assert_eq!(store.mutation_state(second_id), MutationState::Submitting);
                mock.release(&second_call);
            }
        );
        b.unwrap();
        c.unwrap();

        assert_eq!(ids(&store.values()), vec!["a", "b"]);
        assert_eq!(store.get("b").unwrap().title, "B2");
        assert!(!store.is_submitting());
        assert!(store.delete_target("c").is_none());
    }
}

#[tokio::test]
async fn test_timeout_returns_state_to_idle() {
    let mock = MockRemoteService::new();
    let config = StoreConfig {
        remote_timeout: Some(Duration::from_millis(20)),
        ..StoreConfig::default()
    };
    let (store, mut rx) = setup_with_config(&mock, config);
    mock.pause();

    let err = store
        .create(activity("a1", "2021-01-01T09:00"))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Transport(ref m) if m.contains("timed out")));
    assert!(store.get("a1").is_none());
    assert_eq!(store.mutation_state("a1"), MutationState::Idle);
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn test_dropped_operation_clears_in_flight_mark() {
    let mock = MockRemoteService::with_records([activity("a1", "2021-01-01T09:00")]);
    let (store, _rx) = setup(&mock);
    store.load_all().await.unwrap();
    mock.pause();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        store.update(activity("a1", "2021-01-01T09:00").with_city("Lost")),
    )
    .await;
    assert!(abandoned.is_err());

    assert_eq!(store.mutation_state("a1"), MutationState::Idle);
    assert!(store.get("a1").unwrap().city.is_empty());

    let abandoned = tokio::time::timeout(Duration::from_millis(10), store.load_all()).await;
    assert!(abandoned.is_err());
    assert_eq!(store.loading_state(), LoadingState::Idle);
}

// ========== reads, selection and notifications ==========

#[tokio::test]
async fn test_grouped_view_is_memoized_on_registry_version() {
    let mock = MockRemoteService::with_records([
        activity("ten", "2021-01-02T10:00"),
        activity("nine", "2021-01-01T09:00"),
        activity("eight", "2021-01-01T08:00"),
    ]);
    let (store, _rx) = setup(&mock);
    store.load_all().await.unwrap();

    let groups = store.grouped_by_date();
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].date, "2021-01-01");
    assert_eq!(groups[0].records[0].id, "eight");
    assert_eq!(groups[0].records[1].id, "nine");
    assert_eq!(groups[1].records[0].id, "ten");

    store.select("ten");
    assert!(Arc::ptr_eq(&groups, &store.grouped_by_date()));

    store.delete("ten", "x").await.unwrap();
    let regrouped = store.grouped_by_date();
    assert!(!Arc::ptr_eq(&groups, &regrouped));
    assert_eq!(regrouped.len(), 1);
}

#[tokio::test]
async fn test_form_and_selection_state() {
    let mock = MockRemoteService::with_records([activity("a1", "2021-01-01T09:00")]);
    let (store, _rx) = setup(&mock);
    store.load_all().await.unwrap();

    assert_eq!(store.open_edit_form("a1").unwrap().id, "a1");
    assert!(store.edit_mode());

    store.cancel_form();
    assert!(!store.edit_mode());
    assert!(store.selected().is_some());

    store.open_create_form();
    assert!(store.edit_mode());
    assert!(store.selected().is_none());

    assert!(store.select("a1").is_some());
    assert!(!store.edit_mode());

    store.clear_selection();
    assert!(store.selected().is_none());
    assert!(store.select("missing").is_none());
}

#[tokio::test]
async fn test_subscribers_see_changes() {
    let mock = MockRemoteService::with_records([activity("a1", "2021-01-01T09:00")]);
    let (store, _rx) = setup(&mock);
    let mut changes = store.subscribe();
    let _ = changes.borrow_and_update();

    store.load_all().await.unwrap();
    assert!(changes.has_changed().unwrap());
    let after_load = *changes.borrow_and_update();

    store.clear_selection();
    assert!(*changes.borrow_and_update() > after_load);
}

#[tokio::test]
async fn test_snapshot_reflects_state() {
    let mock = MockRemoteService::with_records([
        activity("late", "2021-01-02T09:00"),
        activity("early", "2021-01-01T09:00"),
    ]);
    let (store, _rx) = setup(&mock);
    store.load_all().await.unwrap();
    store.select("late");

    let snapshot = store.snapshot();
    let order: Vec<&str> = snapshot.records.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(order, vec!["early", "late"]);
    assert_eq!(snapshot.selected.unwrap().id, "late");
    assert_eq!(snapshot.loading, LoadingState::Idle);
    assert!(snapshot.mutations.is_empty());
    assert!(snapshot.fetching.is_empty());
    assert!(snapshot.version > 0);
}
