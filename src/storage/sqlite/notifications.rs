//! SQLite notification store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::storage::schema::{Notifications, CREATE_NOTIFICATIONS_TABLE};
use crate::storage::{NewNotification, Notification, NotificationStore, Result, StorageError};

/// SQLite implementation of NotificationStore.
pub struct SqliteNotificationStore {
    pool: SqlitePool,
}

impl SqliteNotificationStore {
    /// Create a new SQLite notification store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the table and its index if they do not exist.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(CREATE_NOTIFICATIONS_TABLE)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn find_by_event(&self, event_id: Uuid) -> Result<Option<Notification>> {
        let query = Query::select()
            .columns(COLUMNS)
            .from(Notifications::Table)
            .and_where(Expr::col(Notifications::EventId).eq(event_id.to_string()))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;
        row.as_ref().map(from_row).transpose()
    }
}

const COLUMNS: [Notifications; 5] = [
    Notifications::Id,
    Notifications::EventId,
    Notifications::UserId,
    Notifications::Message,
    Notifications::CreatedAt,
];

fn parse_event_id(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| StorageError::InvalidEventId(format!("{}: {}", value, e)))
}

fn parse_created_at(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidTimestamp(format!("{}: {}", value, e)))
}

fn from_row(row: &SqliteRow) -> Result<Notification> {
    let event_id: String = row.get("event_id");
    let created_at: String = row.get("created_at");
    Ok(Notification {
        id: row.get("id"),
        event_id: parse_event_id(&event_id)?,
        user_id: row.get("user_id"),
        message: row.get("message"),
        created_at: parse_created_at(&created_at)?,
    })
}

#[async_trait]
impl NotificationStore for SqliteNotificationStore {
    async fn add(&self, notification: NewNotification) -> Result<Notification> {
        let created_at = Utc::now();

        let query = Query::insert()
            .into_table(Notifications::Table)
            .columns([
                Notifications::EventId,
                Notifications::UserId,
                Notifications::Message,
                Notifications::CreatedAt,
            ])
            .values_panic([
                notification.event_id.to_string().into(),
                notification.user_id.into(),
                notification.message.clone().into(),
                created_at.to_rfc3339().into(),
            ])
            .on_conflict(
                OnConflict::column(Notifications::EventId)
                    .do_nothing()
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;

        if result.rows_affected() == 0 {
            return self
                .find_by_event(notification.event_id)
                .await?
                .ok_or_else(|| {
                    StorageError::Unavailable(format!(
                        "notification for event {} vanished after conflict",
                        notification.event_id
                    ))
                });
        }

        Ok(Notification {
            id: result.last_insert_rowid(),
            event_id: notification.event_id,
            user_id: notification.user_id,
            message: notification.message,
            created_at,
        })
    }

    async fn list_for_user(&self, user_id: i64) -> Result<Vec<Notification>> {
        let query = Query::select()
            .columns(COLUMNS)
            .from(Notifications::Table)
            .and_where(Expr::col(Notifications::UserId).eq(user_id))
            .order_by(Notifications::Id, Order::Asc)
            .to_string(SqliteQueryBuilder);

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(from_row).collect()
    }

    async fn remove_for_user(&self, user_id: i64) -> Result<u64> {
        let query = Query::delete()
            .from_table(Notifications::Table)
            .and_where(Expr::col(Notifications::UserId).eq(user_id))
            .to_string(SqliteQueryBuilder);

        let result = sqlx::query(&query).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
