//! ReplicaStore interface tests.
//!
//! These tests verify the contract of the ReplicaStore trait.
//! Each storage implementation should run these tests.

use courier::storage::{CredentialRecord, ReplicaStore, StorageError, UserRecord};

// =============================================================================
// ReplicaStore::find tests
// =============================================================================

pub async fn test_find_nonexistent<S: ReplicaStore<UserRecord>>(store: &S) {
    let user = store.find(1_000_001).await.expect("find should succeed");
    assert!(user.is_none(), "nonexistent user should be None");
}

pub async fn test_add_then_find<S: ReplicaStore<UserRecord>>(store: &S) {
    store
        .add(UserRecord::new(1_000_002, "alice"))
        .await
        .expect("add should succeed");

    let user = store
        .find(1_000_002)
        .await
        .expect("find should succeed")
        .expect("user should exist");
    assert_eq!(user, UserRecord::new(1_000_002, "alice"));
}

// =============================================================================
// ReplicaStore::add tests
// =============================================================================

pub async fn test_add_replaces_existing<S: ReplicaStore<UserRecord>>(store: &S) {
    store
        .add(UserRecord::new(1_000_003, "alice"))
        .await
        .expect("first add should succeed");
    store
        .add(UserRecord::new(1_000_003, "alicia"))
        .await
        .expect("second add should succeed");

    let user = store.find(1_000_003).await.unwrap().unwrap();
    assert_eq!(user.user_name, "alicia", "last write should win");
}

// =============================================================================
// ReplicaStore::update tests
// =============================================================================

pub async fn test_update_existing<S: ReplicaStore<CredentialRecord>>(store: &S) {
    store
        .add(CredentialRecord::new(1_000_004, "a@example.com", "hash-1"))
        .await
        .expect("add should succeed");
    store
        .update(CredentialRecord::new(1_000_004, "b@example.com", "hash-1"))
        .await
        .expect("update should succeed");

    let credential = store.find(1_000_004).await.unwrap().unwrap();
    assert_eq!(credential.email, "b@example.com");
    assert_eq!(credential.password, "hash-1");
}

pub async fn test_update_missing_is_not_found<S: ReplicaStore<CredentialRecord>>(store: &S) {
    let result = store
        .update(CredentialRecord::new(1_000_005, "a@example.com", "hash"))
        .await;

    match result {
        Err(StorageError::NotFound { kind, id }) => {
            assert_eq!(kind, "Credential");
            assert_eq!(id, 1_000_005);
        }
        other => panic!("expected NotFound, got {:?}", other),
    }
    assert!(store.find(1_000_005).await.unwrap().is_none());
}

// =============================================================================
// ReplicaStore::remove tests
// =============================================================================

pub async fn test_remove<S: ReplicaStore<CredentialRecord>>(store: &S) {
    store
        .add(CredentialRecord::new(1_000_006, "a@example.com", "hash"))
        .await
        .expect("add should succeed");

    assert!(store.remove(1_000_006).await.expect("remove should succeed"));
    assert!(store.find(1_000_006).await.unwrap().is_none());
    assert!(
        !store.remove(1_000_006).await.expect("second remove should succeed"),
        "removing twice should report nothing removed"
    );
}

/// Run all ReplicaStore tests against a user and a credential store.
#[macro_export]
macro_rules! run_replica_store_tests {
    ($users:expr, $credentials:expr) => {
        use $crate::storage::replica_store_tests::*;

        test_find_nonexistent($users).await;
        println!("  test_find_nonexistent: PASSED");

        test_add_then_find($users).await;
        println!("  test_add_then_find: PASSED");

        test_add_replaces_existing($users).await;
        println!("  test_add_replaces_existing: PASSED");

        test_update_existing($credentials).await;
        println!("  test_update_existing: PASSED");

        test_update_missing_is_not_found($credentials).await;
        println!("  test_update_missing_is_not_found: PASSED");

        test_remove($credentials).await;
        println!("  test_remove: PASSED");
    };
}
