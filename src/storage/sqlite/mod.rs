//! SQLite implementations of storage interfaces.

mod credentials;
mod notifications;
mod users;

pub use credentials::SqliteCredentialStore;
pub use notifications::SqliteNotificationStore;
pub use users::SqliteUserStore;

use sqlx::SqlitePool;

use crate::storage::Result;

/// Create every table used by the SQLite stores.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    SqliteUserStore::new(pool.clone()).init().await?;
    SqliteCredentialStore::new(pool.clone()).init().await?;
    SqliteNotificationStore::new(pool.clone()).init().await?;
    Ok(())
}
