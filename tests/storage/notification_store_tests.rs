//! NotificationStore interface tests.

use courier::storage::{NewNotification, NotificationStore};
use uuid::Uuid;

fn note(user_id: i64, message: &str) -> NewNotification {
    NewNotification::new(Uuid::new_v4(), user_id, message)
}

pub async fn test_add_assigns_ids<S: NotificationStore>(store: &S) {
    let first = store
        .add(note(2_000_001, "user-1: hi"))
        .await
        .expect("add should succeed");
    let second = store
        .add(note(2_000_001, "user-1: again"))
        .await
        .expect("add should succeed");

    assert_ne!(first.id, second.id, "ids should be unique");
    assert_eq!(first.user_id, 2_000_001);
    assert_eq!(first.message, "user-1: hi");
}

pub async fn test_list_for_user_oldest_first<S: NotificationStore>(store: &S) {
    for text in ["one", "two", "three"] {
        store
            .add(note(2_000_002, text))
            .await
            .expect("add should succeed");
    }
    store
        .add(note(2_000_003, "other user"))
        .await
        .expect("add should succeed");

    let rows = store
        .list_for_user(2_000_002)
        .await
        .expect("list should succeed");
    let messages: Vec<_> = rows.iter().map(|n| n.message.as_str()).collect();
    assert_eq!(messages, vec!["one", "two", "three"]);
    assert!(rows.windows(2).all(|w| w[0].created_at <= w[1].created_at));
}

pub async fn test_remove_for_user<S: NotificationStore>(store: &S) {
    store
        .add(note(2_000_004, "a"))
        .await
        .unwrap();
    store
        .add(note(2_000_004, "b"))
        .await
        .unwrap();
    store
        .add(note(2_000_005, "kept"))
        .await
        .unwrap();

    let removed = store
        .remove_for_user(2_000_004)
        .await
        .expect("remove should succeed");

    assert_eq!(removed, 2);
    assert!(store.list_for_user(2_000_004).await.unwrap().is_empty());
    assert_eq!(store.list_for_user(2_000_005).await.unwrap().len(), 1);
}

pub async fn test_add_is_idempotent_per_event<S: NotificationStore>(store: &S) {
    let event_id = Uuid::new_v4();

    let first = store
        .add(NewNotification::new(event_id, 2_000_006, "user-4: hello"))
        .await
        .expect("add should succeed");
    let again = store
        .add(NewNotification::new(event_id, 2_000_006, "user-4: hello"))
        .await
        .expect("repeated add should succeed");

    assert_eq!(again.id, first.id);
    assert_eq!(again.event_id, event_id);
    let rows = store.list_for_user(2_000_006).await.unwrap();
    assert_eq!(rows.len(), 1, "one row per event");
    assert_eq!(rows[0].event_id, event_id);
}

/// Run all NotificationStore tests against a store implementation.
#[macro_export]
macro_rules! run_notification_store_tests {
    ($store:expr) => {
        use $crate::storage::notification_store_tests::*;

        test_add_assigns_ids($store).await;
        println!("  test_add_assigns_ids: PASSED");

        test_list_for_user_oldest_first($store).await;
        println!("  test_list_for_user_oldest_first: PASSED");

        test_remove_for_user($store).await;
        println!("  test_remove_for_user: PASSED");

        test_add_is_idempotent_per_event($store).await;
        println!("  test_add_is_idempotent_per_event: PASSED");
    };
}
