//! Real-time push to connected clients.
//!
//! Handlers answer asynchronous requests by pushing a named event to the
//! requesting user's live sessions. The socket transport that carries
//! [`PushMessage`]s to browsers sits outside this crate; it registers each
//! client with [`PushHub::connect`] and forwards whatever the session yields.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// Client event carrying resolved user records.
pub const RECEIVE_USERS: &str = "ReceiveUsers";
/// Client event carrying a new notification.
pub const RECEIVE_NOTIFICATION: &str = "ReceiveNotification";

/// Errors that can occur while pushing.
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("Failed to encode push payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Push transport unavailable: {0}")]
    Unavailable(String),
}

/// Identifies the user a push is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PushTarget(String);

impl PushTarget {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self(user_id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for PushTarget {
    fn from(user_id: i64) -> Self {
        Self(user_id.to_string())
    }
}

impl From<&str> for PushTarget {
    fn from(user_id: &str) -> Self {
        Self(user_id.to_string())
    }
}

impl fmt::Display for PushTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One event as delivered to a client session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushMessage {
    pub event: String,
    pub payload: serde_json::Value,
}

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivered {
    /// Number of live sessions that received the message.
    Sessions(usize),
    /// The target has no live session; nothing was sent.
    NoSession,
}

/// Sends named events to a user's live sessions.
#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn send(
        &self,
        target: &PushTarget,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<Delivered, PushError>;
}

/// Encode a value as a push payload.
pub fn to_payload<T: Serialize + ?Sized>(value: &T) -> Result<serde_json::Value, PushError> {
    Ok(serde_json::to_value(value)?)
}

type Sessions = HashMap<PushTarget, Vec<mpsc::UnboundedSender<PushMessage>>>;

/// In-process registry of live client sessions.
///
/// Cloning shares the registry. A user may hold several sessions (tabs,
/// devices); every one of them receives each push.
#[derive(Clone, Default)]
pub struct PushHub {
    sessions: Arc<RwLock<Sessions>>,
    next_id: Arc<AtomicU64>,
}

impl PushHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session for `target`.
    ///
    /// The session is dropped from the hub after its receiver is dropped.
    pub async fn connect(&self, target: impl Into<PushTarget>) -> PushSession {
        let target = target.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        self.sessions
            .write()
            .await
            .entry(target.clone())
            .or_default()
            .push(sender);

        info!(target = %target, session = id, "Push session connected");
        PushSession {
            id,
            target,
            receiver,
        }
    }

    /// Number of live sessions for `target`.
    pub async fn session_count(&self, target: &PushTarget) -> usize {
        self.sessions
            .read()
            .await
            .get(target)
            .map(|senders| senders.iter().filter(|s| !s.is_closed()).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl PushChannel for PushHub {
    async fn send(
        &self,
        target: &PushTarget,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<Delivered, PushError> {
        let mut sessions = self.sessions.write().await;
        let Some(senders) = sessions.get_mut(target) else {
            debug!(target = %target, event = %event, "No live session, push dropped");
            return Ok(Delivered::NoSession);
        };

        let message = PushMessage {
            event: event.to_string(),
            payload,
        };
        senders.retain(|sender| sender.send(message.clone()).is_ok());
        let delivered = senders.len();

        if delivered == 0 {
            sessions.remove(target);
            debug!(target = %target, event = %event, "No live session, push dropped");
            return Ok(Delivered::NoSession);
        }

        debug!(target = %target, event = %event, sessions = delivered, "Pushed");
        Ok(Delivered::Sessions(delivered))
    }
}

/// A connected client's view of its pushes.
pub struct PushSession {
    id: u64,
    target: PushTarget,
    receiver: mpsc::UnboundedReceiver<PushMessage>,
}

impl PushSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn target(&self) -> &PushTarget {
        &self.target
    }

    /// Wait for the next push. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<PushMessage> {
        self.receiver.recv().await
    }

    /// Take a push if one is already waiting.
    pub fn try_recv(&mut self) -> Option<PushMessage> {
        self.receiver.try_recv().ok()
    }
}
