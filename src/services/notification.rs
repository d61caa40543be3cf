//! Notification service consumer.
//!
//! Every stored chat message becomes a notification row for the receiver,
//! which is also pushed to the receiver's live sessions. Rows are keyed by the
//! message event id, so a redelivered event does not store a second row.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{EventHandler, HandlerError, HandlerScope, ServiceEvent};
use crate::bus::{Consumer, DispatchTable, Transport};
use crate::config::ConsumerConfig;
use crate::events::{queues, CreatedMessageEvent, Event};
use crate::listener::BackgroundListener;
use crate::push::{to_payload, PushChannel, PushTarget, RECEIVE_NOTIFICATION};
use crate::storage::{NewNotification, NotificationStore, Stores};

pub const SERVICE: &str = "notification";

/// Queues the notification service consumes.
pub const QUEUES: [&str; 1] = [queues::NEW_MESSAGE];

/// Events consumed by the notification service.
#[derive(Debug)]
pub enum NotificationEvent {
    MessageCreated(CreatedMessageEvent),
}

impl ServiceEvent for NotificationEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::MessageCreated(_) => "MessageCreated",
        }
    }
}

pub fn dispatch_table() -> DispatchTable<NotificationEvent> {
    DispatchTable::new().route_event(NotificationEvent::MessageCreated)
}

/// Notification text shown to the receiver. A missing message renders empty.
pub fn notification_text(event: &CreatedMessageEvent) -> String {
    format!(
        "user-{}: {}",
        event.sender_id,
        event.message.as_deref().unwrap_or_default()
    )
}

pub struct NotificationHandler {
    notifications: Arc<dyn NotificationStore>,
    push: Arc<dyn PushChannel>,
}

impl NotificationHandler {
    pub fn new(notifications: Arc<dyn NotificationStore>, push: Arc<dyn PushChannel>) -> Self {
        Self {
            notifications,
            push,
        }
    }

    async fn message_created(&self, event: CreatedMessageEvent) -> Result<(), HandlerError> {
        let notification = self
            .notifications
            .add(NewNotification::new(
                event.event_id(),
                event.receiver_id,
                notification_text(&event),
            ))
            .await?;
        info!(
            notification_id = notification.id,
            user_id = notification.user_id,
            "Notification stored"
        );

        let delivered = self
            .push
            .send(
                &PushTarget::from(event.receiver_id),
                RECEIVE_NOTIFICATION,
                to_payload(&notification)?,
            )
            .await?;
        debug!(user_id = event.receiver_id, delivered = ?delivered, "Notification pushed");
        Ok(())
    }
}

#[async_trait]
impl EventHandler<NotificationEvent> for NotificationHandler {
    async fn handle(&mut self, event: NotificationEvent) -> Result<(), HandlerError> {
        match event {
            NotificationEvent::MessageCreated(event) => self.message_created(event).await,
        }
    }
}

#[derive(Clone)]
pub struct NotificationScope {
    notifications: Arc<dyn NotificationStore>,
    push: Arc<dyn PushChannel>,
}

impl NotificationScope {
    pub fn new(stores: &Stores, push: Arc<dyn PushChannel>) -> Self {
        Self {
            notifications: stores.notifications.clone(),
            push,
        }
    }
}

impl HandlerScope<NotificationEvent> for NotificationScope {
    fn begin(&self) -> Box<dyn EventHandler<NotificationEvent>> {
        Box::new(NotificationHandler::new(
            self.notifications.clone(),
            self.push.clone(),
        ))
    }
}

/// Listener for every notification queue.
pub fn listener(
    transport: Arc<dyn Transport>,
    stores: &Stores,
    push: Arc<dyn PushChannel>,
    config: &ConsumerConfig,
) -> BackgroundListener<NotificationEvent> {
    let consumer = Consumer::new(
        SERVICE,
        transport,
        dispatch_table(),
        Arc::new(NotificationScope::new(stores, push)),
    )
    .with_config(config.clone());

    BackgroundListener::new(SERVICE, consumer, QUEUES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::push::{Delivered, PushError, PushHub};
    use crate::storage::MemoryNotificationStore;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Unreachable;

    #[async_trait]
    impl PushChannel for Unreachable {
        async fn send(
            &self,
            _target: &PushTarget,
            _event: &str,
            _payload: serde_json::Value,
        ) -> Result<Delivered, PushError> {
            Err(PushError::Unavailable("hub offline".to_string()))
        }
    }

    /// Fails the first send, then succeeds.
    #[derive(Default)]
    struct FailsOnce {
        sends: AtomicU32,
    }

    #[async_trait]
    impl PushChannel for FailsOnce {
        async fn send(
            &self,
            _target: &PushTarget,
            _event: &str,
            _payload: serde_json::Value,
        ) -> Result<Delivered, PushError> {
            if self.sends.fetch_add(1, Ordering::SeqCst) == 0 {
                return Err(PushError::Unavailable("hub restarting".to_string()));
            }
            Ok(Delivered::Sessions(1))
        }
    }

    #[test]
    fn test_notification_text() {
        let event = CreatedMessageEvent::new(4, 9, Some("hello".to_string()));
        assert_eq!(notification_text(&event), "user-4: hello");

        let empty = CreatedMessageEvent::new(4, 9, None);
        assert_eq!(notification_text(&empty), "user-4: ");
    }

    #[tokio::test]
    async fn test_message_stores_and_pushes() {
        let store = Arc::new(MemoryNotificationStore::new());
        let hub = PushHub::new();
        let mut session = hub.connect(9_i64).await;
        let mut handler = NotificationHandler::new(store.clone(), Arc::new(hub.clone()));

        handler
            .handle(NotificationEvent::MessageCreated(CreatedMessageEvent::new(
                4,
                9,
                Some("hello".to_string()),
            )))
            .await
            .unwrap();

        let rows = store.list_for_user(9).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "user-4: hello");

        let pushed = session.try_recv().unwrap();
        assert_eq!(pushed.event, RECEIVE_NOTIFICATION);
        assert_eq!(pushed.payload["message"], "user-4: hello");
        assert_eq!(pushed.payload["userId"], 9);
    }

    #[tokio::test]
    async fn test_push_failure_propagates() {
        let store = Arc::new(MemoryNotificationStore::new());
        let mut handler = NotificationHandler::new(store.clone(), Arc::new(Unreachable));

        let result = handler
            .handle(NotificationEvent::MessageCreated(CreatedMessageEvent::new(
                1, 2, None,
            )))
            .await;

        assert!(matches!(result, Err(HandlerError::Push(_))));
    }

    #[tokio::test]
    async fn test_store_failure_skips_push() {
        let store = Arc::new(MemoryNotificationStore::new());
        store.set_fail_on_write(true);
        let hub = PushHub::new();
        let mut session = hub.connect(2_i64).await;
        let mut handler = NotificationHandler::new(store.clone(), Arc::new(hub.clone()));

        let result = handler
            .handle(NotificationEvent::MessageCreated(CreatedMessageEvent::new(
                1, 2, None,
            )))
            .await;

        assert!(matches!(result, Err(HandlerError::Storage(_))));
        assert!(session.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_redelivery_after_push_failure_stores_one_row() {
        let store = Arc::new(MemoryNotificationStore::new());
        let push = Arc::new(FailsOnce::default());
        let mut handler = NotificationHandler::new(store.clone(), push.clone());
        let event = CreatedMessageEvent::new(4, 9, Some("hello".to_string()));

        let first = handler
            .handle(NotificationEvent::MessageCreated(event.clone()))
            .await;
        assert!(matches!(first, Err(HandlerError::Push(_))));

        handler
            .handle(NotificationEvent::MessageCreated(event))
            .await
            .unwrap();

        let rows = store.list_for_user(9).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].message, "user-4: hello");
        assert_eq!(push.sends.load(Ordering::SeqCst), 2);
    }
}
