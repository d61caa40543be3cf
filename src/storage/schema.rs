//! Database schema definitions using sea-query.
//!
//! These define the table and column identifiers for type-safe query building.

use sea_query::Iden;

/// Profile-side user replica.
#[derive(Iden)]
pub enum Users {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "user_name"]
    UserName,
}

/// Identity-side credential replica.
#[derive(Iden)]
pub enum Credentials {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "email"]
    Email,
    #[iden = "password"]
    Password,
}

/// Notifications owned by the notification service.
#[derive(Iden)]
pub enum Notifications {
    Table,
    #[iden = "id"]
    Id,
    #[iden = "event_id"]
    EventId,
    #[iden = "user_id"]
    UserId,
    #[iden = "message"]
    Message,
    #[iden = "created_at"]
    CreatedAt,
}

/// SQL for creating the users table.
pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    user_name TEXT NOT NULL
);
"#;

/// SQL for creating the credentials table.
pub const CREATE_CREDENTIALS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS credentials (
    id INTEGER PRIMARY KEY,
    email TEXT NOT NULL,
    password TEXT NOT NULL
);
"#;

/// SQL for creating the notifications table.
pub const CREATE_NOTIFICATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS notifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id TEXT NOT NULL UNIQUE,
    user_id INTEGER NOT NULL,
    message TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id);
"#;
