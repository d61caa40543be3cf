//! In-memory stores for tests and standalone runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    NewNotification, Notification, NotificationStore, ReplicaRecord, ReplicaStore, Result,
    StorageError,
};

/// Replica store backed by a map.
pub struct MemoryReplicaStore<R> {
    records: RwLock<HashMap<i64, R>>,
    fail_on_write: AtomicBool,
}

impl<R: ReplicaRecord> MemoryReplicaStore<R> {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            fail_on_write: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail with `StorageError::Unavailable`.
    pub fn set_fail_on_write(&self, fail: bool) {
        self.fail_on_write.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// All records, ordered by id.
    pub async fn snapshot(&self) -> Vec<R> {
        let records = self.records.read().await;
        let mut all: Vec<R> = records.values().cloned().collect();
        all.sort_by_key(|r| r.id());
        all
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_on_write.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("Mock write failure".to_string()));
        }
        Ok(())
    }
}

impl<R: ReplicaRecord> Default for MemoryReplicaStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<R: ReplicaRecord> ReplicaStore<R> for MemoryReplicaStore<R> {
    async fn find(&self, id: i64) -> Result<Option<R>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn add(&self, record: R) -> Result<()> {
        self.check_writable()?;
        self.records.write().await.insert(record.id(), record);
        Ok(())
    }

    async fn update(&self, record: R) -> Result<()> {
        self.check_writable()?;
        let mut records = self.records.write().await;
        match records.get_mut(&record.id()) {
            Some(existing) => {
                *existing = record;
                Ok(())
            }
            None => Err(StorageError::NotFound {
                kind: R::KIND,
                id: record.id(),
            }),
        }
    }

    async fn remove(&self, id: i64) -> Result<bool> {
        self.check_writable()?;
        Ok(self.records.write().await.remove(&id).is_some())
    }
}

/// Notification store backed by a vector.
pub struct MemoryNotificationStore {
    rows: RwLock<Vec<Notification>>,
    next_id: AtomicI64,
    fail_on_write: AtomicBool,
}

impl MemoryNotificationStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            fail_on_write: AtomicBool::new(false),
        }
    }

    /// Make every subsequent write fail with `StorageError::Unavailable`.
    pub fn set_fail_on_write(&self, fail: bool) {
        self.fail_on_write.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_on_write.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("Mock write failure".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryNotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
    async fn add(&self, notification: NewNotification) -> Result<Notification> {
        self.check_writable()?;
        let mut rows = self.rows.write().await;
        if let Some(existing) = rows.iter().find(|n| n.event_id == notification.event_id) {
            return Ok(existing.clone());
        }
        let row = Notification {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            event_id: notification.event_id,
            user_id: notification.user_id,
            message: notification.message,
            created_at: Utc::now(),
        };
        rows.push(row.clone());
        Ok(row)
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Notification>> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn remove_for_user(&self, user_id: i64) -> Result<u64> {
        self.check_writable()?;
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|n| n.user_id != user_id);
        Ok((before - rows.len()) as u64)
    }
}
