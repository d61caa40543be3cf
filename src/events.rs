//! Integration events exchanged between services.
//!
//! Every event carries an [`EventEnvelope`] (`EventId`, `OccurredOn`) that is
//! assigned at construction and never mutated afterwards. The envelope is
//! flattened into the event's JSON object, so the wire payload is exactly the
//! event's fields plus those two keys. No type tag is written: the queue an
//! event arrives on decides how it is decoded.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Well-known queue names shared by every service.
pub mod queues {
    /// Published by identity after sign-up; consumed by profile.
    pub const USER_CREATED: &str = "user-created";
    /// Published by profile after an edit; consumed by identity.
    pub const USER_UPDATED: &str = "user-updated";
    /// Published by profile after removal; consumed by identity.
    pub const USER_DELETED: &str = "user-deleted";
    /// Published by messaging for every stored message; consumed by notification.
    pub const NEW_MESSAGE: &str = "new-message-event";
    /// Published by messaging to resolve user ids; consumed by profile.
    pub const GET_USER: &str = "get-user-event";

    /// All queue names, in declaration order.
    pub const ALL: [&str; 5] = [USER_CREATED, USER_UPDATED, USER_DELETED, NEW_MESSAGE, GET_USER];
}

/// Identity and creation time shared by all events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "EventId", default = "Uuid::new_v4")]
    event_id: Uuid,
    #[serde(rename = "OccurredOn", default = "Utc::now")]
    occurred_on: DateTime<Utc>,
}

impl EventEnvelope {
    /// Stamp a new envelope with a fresh id and the current UTC time.
    pub fn new() -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_on: Utc::now(),
        }
    }

    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn occurred_on(&self) -> DateTime<Utc> {
        self.occurred_on
    }
}

impl Default for EventEnvelope {
    fn default() -> Self {
        Self::new()
    }
}

/// Common behaviour of every integration event.
pub trait Event: Serialize + DeserializeOwned + fmt::Display + Send + Sync + 'static {
    /// Queue this event is published to.
    const QUEUE: &'static str;

    fn envelope(&self) -> &EventEnvelope;

    fn event_id(&self) -> Uuid {
        self.envelope().event_id()
    }

    fn occurred_on(&self) -> DateTime<Utc> {
        self.envelope().occurred_on()
    }
}

/// A user signed up with the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserCreatedEvent {
    #[serde(flatten)]
    envelope: EventEnvelope,
    pub id: i64,
    pub user_name: Option<String>,
}

impl UserCreatedEvent {
    pub fn new(id: i64, user_name: Option<String>) -> Self {
        Self {
            envelope: EventEnvelope::new(),
            id,
            user_name,
        }
    }
}

impl Event for UserCreatedEvent {
    const QUEUE: &'static str = queues::USER_CREATED;

    fn envelope(&self) -> &EventEnvelope {
        &self.envelope
    }
}

impl fmt::Display for UserCreatedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[UserCreatedEvent - UserID: {}, UserName: {}]",
            self.id,
            self.user_name.as_deref().unwrap_or("-")
        )
    }
}

/// A user's profile was edited. Only the fields that changed are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserUpdatedEvent {
    #[serde(flatten)]
    envelope: EventEnvelope,
    pub id: i64,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl UserUpdatedEvent {
    pub fn new(id: i64) -> Self {
        Self {
            envelope: EventEnvelope::new(),
            id,
            user_name: None,
            email: None,
            password: None,
        }
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl Event for UserUpdatedEvent {
    const QUEUE: &'static str = queues::USER_UPDATED;

    fn envelope(&self) -> &EventEnvelope {
        &self.envelope
    }
}

impl fmt::Display for UserUpdatedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[UserUpdatedEvent - UserID: {}]", self.id)
    }
}

/// A user was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserDeletedEvent {
    #[serde(flatten)]
    envelope: EventEnvelope,
    pub id: i64,
}

impl UserDeletedEvent {
    pub fn new(id: i64) -> Self {
        Self {
            envelope: EventEnvelope::new(),
            id,
        }
    }
}

impl Event for UserDeletedEvent {
    const QUEUE: &'static str = queues::USER_DELETED;

    fn envelope(&self) -> &EventEnvelope {
        &self.envelope
    }
}

impl fmt::Display for UserDeletedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[UserDeletedEvent - UserID: {}]", self.id)
    }
}

/// A chat message was stored by the messaging service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreatedMessageEvent {
    #[serde(flatten)]
    envelope: EventEnvelope,
    pub sender_id: i64,
    pub receiver_id: i64,
    #[serde(default)]
    pub message: Option<String>,
}

impl CreatedMessageEvent {
    pub fn new(sender_id: i64, receiver_id: i64, message: Option<String>) -> Self {
        Self {
            envelope: EventEnvelope::new(),
            sender_id,
            receiver_id,
            message,
        }
    }
}

impl Event for CreatedMessageEvent {
    const QUEUE: &'static str = queues::NEW_MESSAGE;

    fn envelope(&self) -> &EventEnvelope {
        &self.envelope
    }
}

impl fmt::Display for CreatedMessageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[CreatedMessageEvent - {} - {}, Sender: {}, Receiver: {}]",
            self.envelope.occurred_on, self.envelope.event_id, self.sender_id, self.receiver_id
        )
    }
}

/// Absent and `null` both read as an empty list.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<i64>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Request to resolve a set of user ids.
///
/// `user_id` is the requester. The answer is pushed to that user's real-time
/// channel rather than sent back on a reply queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetUserEvent {
    #[serde(flatten)]
    envelope: EventEnvelope,
    pub user_id: i64,
    #[serde(rename = "ids", default, deserialize_with = "null_as_empty")]
    pub ids: Vec<i64>,
}

impl GetUserEvent {
    pub fn new(user_id: i64, ids: impl Into<Vec<i64>>) -> Self {
        Self {
            envelope: EventEnvelope::new(),
            user_id,
            ids: ids.into(),
        }
    }
}

impl Event for GetUserEvent {
    const QUEUE: &'static str = queues::GET_USER;

    fn envelope(&self) -> &EventEnvelope {
        &self.envelope
    }
}

impl fmt::Display for GetUserEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[GetUserEvent - Requester: {}, Ids: {:?}]",
            self.user_id, self.ids
        )
    }
}
