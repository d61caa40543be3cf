//! Shared storage integration tests.
//!
//! Tests the ReplicaStore and NotificationStore interfaces against all
//! implementations. Each implementation module imports these test functions
//! and runs them.

pub mod notification_store_tests;
pub mod replica_store_tests;
