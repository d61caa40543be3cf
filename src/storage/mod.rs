//! Local replica stores.
//!
//! Each service keeps its own copy of the data other services own. Replicas
//! are written by event handlers only, keyed by the owning service's id, and
//! follow "last event applied wins".

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::{StorageConfig, StorageType};

pub mod memory;
#[cfg(feature = "sqlite")]
pub mod schema;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::{MemoryNotificationStore, MemoryReplicaStore};
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteCredentialStore, SqliteNotificationStore, SqliteUserStore};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid event id: {0}")]
    InvalidEventId(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A row in a replica store.
pub trait ReplicaRecord: Clone + Send + Sync + 'static {
    /// Name used in errors and logs.
    const KIND: &'static str;

    /// Id assigned by the owning service.
    fn id(&self) -> i64;
}

/// Profile-side replica of a user created by identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub id: i64,
    pub user_name: String,
}

impl UserRecord {
    /// Placeholder name when a created event carries none.
    pub const UNKNOWN_USER_NAME: &'static str = "unknown-user";

    pub fn new(id: i64, user_name: impl Into<String>) -> Self {
        Self {
            id,
            user_name: user_name.into(),
        }
    }
}

impl ReplicaRecord for UserRecord {
    const KIND: &'static str = "User";

    fn id(&self) -> i64 {
        self.id
    }
}

/// Identity-side replica of the login fields edited through profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub id: i64,
    pub email: String,
    pub password: String,
}

impl CredentialRecord {
    pub fn new(id: i64, email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            password: password.into(),
        }
    }
}

impl ReplicaRecord for CredentialRecord {
    const KIND: &'static str = "Credential";

    fn id(&self) -> i64 {
        self.id
    }
}

/// A notification row owned by the notification service.
///
/// `event_id` is the id of the message event that produced the row; a store
/// holds at most one row per event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    pub event_id: Uuid,
    pub user_id: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A notification before the store assigns it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub event_id: Uuid,
    pub user_id: i64,
    pub message: String,
}

impl NewNotification {
    pub fn new(event_id: Uuid, user_id: i64, message: impl Into<String>) -> Self {
        Self {
            event_id,
            user_id,
            message: message.into(),
        }
    }
}

/// Keyed replica storage.
#[async_trait]
pub trait ReplicaStore<R: ReplicaRecord>: Send + Sync {
    async fn find(&self, id: i64) -> Result<Option<R>>;

    /// Insert, or replace an existing record with the same id.
    async fn add(&self, record: R) -> Result<()>;

    /// Replace an existing record. `NotFound` if there is none.
    async fn update(&self, record: R) -> Result<()>;

    /// Delete by id. Returns whether a record existed.
    async fn remove(&self, id: i64) -> Result<bool>;
}

/// Notification storage.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a notification and return it with its id.
    ///
    /// Adding a second notification for the same `event_id` stores nothing
    /// and returns the row already stored for that event.
    async fn add(&self, notification: NewNotification) -> Result<Notification>;

    /// All notifications for a user, oldest first.
    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Notification>>;

    /// Delete all notifications for a user. Returns how many were removed.
    async fn remove_for_user(&self, user_id: i64) -> Result<u64>;
}

/// Every store a service may need, backed by the configured storage type.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn ReplicaStore<UserRecord>>,
    pub credentials: Arc<dyn ReplicaStore<CredentialRecord>>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Stores {
    /// In-memory stores.
    pub fn memory() -> Self {
        Self {
            users: Arc::new(MemoryReplicaStore::<UserRecord>::new()),
            credentials: Arc::new(MemoryReplicaStore::<CredentialRecord>::new()),
            notifications: Arc::new(MemoryNotificationStore::new()),
        }
    }
}

/// Initialize storage based on configuration.
pub async fn init_storage(config: &StorageConfig) -> Result<Stores> {
    match config.storage_type {
        StorageType::Memory => {
            info!("Storage: memory");
            Ok(Stores::memory())
        }
        #[cfg(feature = "sqlite")]
        StorageType::Sqlite => {
            info!(path = %config.sqlite.path, "Storage: sqlite");
            if let Some(parent) = std::path::Path::new(&config.sqlite.path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StorageError::Unavailable(e.to_string()))?;
                }
            }
            let pool = sqlx::SqlitePool::connect(&config.sqlite.url()).await?;
            sqlite::init_schema(&pool).await?;
            Ok(Stores {
                users: Arc::new(SqliteUserStore::new(pool.clone())),
                credentials: Arc::new(SqliteCredentialStore::new(pool.clone())),
                notifications: Arc::new(SqliteNotificationStore::new(pool)),
            })
        }
        #[cfg(not(feature = "sqlite"))]
        StorageType::Sqlite => Err(StorageError::Unavailable(
            "SQLite storage requested but 'sqlite' feature is not enabled".to_string(),
        )),
    }
}
