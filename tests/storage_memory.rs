//! In-memory storage contract tests.
//!
//! Run with: cargo test --test storage_memory

mod storage;

use courier::storage::{CredentialRecord, MemoryNotificationStore, MemoryReplicaStore, UserRecord};

#[tokio::test]
async fn test_memory_replica_stores() {
    println!("=== Memory ReplicaStore Tests ===");

    let users = MemoryReplicaStore::<UserRecord>::new();
    let credentials = MemoryReplicaStore::<CredentialRecord>::new();

    run_replica_store_tests!(&users, &credentials);

    println!("=== All Memory ReplicaStore tests PASSED ===");
}

#[tokio::test]
async fn test_memory_notification_store() {
    println!("=== Memory NotificationStore Tests ===");

    let store = MemoryNotificationStore::new();

    run_notification_store_tests!(&store);

    println!("=== All Memory NotificationStore tests PASSED ===");
}
