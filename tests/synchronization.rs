//! End-to-end replica synchronization over the in-memory broker.
//!
//! Run with: cargo test --test synchronization
//!
//! Each test publishes through a Producer the way an owning service would and
//! observes the consuming service's replicas, push sessions and the broker.

mod common;

use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use futures::StreamExt;
use serde_json::json;

use common::{wait_until, Harness, WAIT_TIMEOUT};
use courier::bus::{BusError, Consumer, Published, Transport};
use courier::config::ConsumerConfig;
use courier::dlq::{ERROR_HEADER, REASON_HEADER, SOURCE_QUEUE_HEADER};
use courier::events::{
    queues, CreatedMessageEvent, Event, GetUserEvent, UserCreatedEvent, UserDeletedEvent,
    UserUpdatedEvent,
};
use courier::listener::BackgroundListener;
use courier::push::{
    Delivered, PushChannel, PushError, PushTarget, RECEIVE_NOTIFICATION, RECEIVE_USERS,
};
use courier::services::{identity, notification, profile};
use courier::storage::{CredentialRecord, NotificationStore, ReplicaStore, UserRecord};

async fn assert_round_trip<T>(h: &Harness, event: T)
where
    T: Event + PartialEq + Debug,
{
    assert_eq!(h.producer.publish_event(&event).await.unwrap(), Published::Sent);

    let tag = format!("round-trip-{}", T::QUEUE);
    let mut stream = h.broker.consume(T::QUEUE, &tag).await.unwrap();
    let delivery = tokio::time::timeout(WAIT_TIMEOUT, stream.next())
        .await
        .expect("timed out waiting for delivery")
        .expect("stream ended")
        .unwrap();

    let decoded: T = serde_json::from_slice(delivery.data()).unwrap();
    assert_eq!(decoded, event);
    assert_eq!(decoded.event_id(), event.event_id());
    assert_eq!(decoded.occurred_on(), event.occurred_on());

    delivery.ack().await.unwrap();
    h.broker.cancel(&tag).await.unwrap();
}

#[tokio::test]
async fn test_publish_consume_round_trip() {
    let h = &Harness::new();

    assert_round_trip(h, UserCreatedEvent::new(7, Some("alice".to_string()))).await;
    assert_round_trip(
        h,
        UserUpdatedEvent::new(7)
            .with_user_name("alicia")
            .with_email("a@example.com"),
    )
    .await;
    assert_round_trip(h, UserDeletedEvent::new(7)).await;
    assert_round_trip(h, CreatedMessageEvent::new(1, 2, Some("hi".to_string()))).await;
    assert_round_trip(h, GetUserEvent::new(3, vec![1, 2, 99])).await;
}

#[tokio::test]
async fn test_user_created_creates_profile_replica() {
    let h = &Harness::new();
    let listener = h.profile(&ConsumerConfig::default());
    listener.start().await.unwrap();

    h.producer
        .publish_event(&UserCreatedEvent::new(7, Some("alice".to_string())))
        .await
        .unwrap();

    wait_until("user replica", || async move { h.users.len().await == 1 }).await;
    assert_eq!(
        h.users.find(7).await.unwrap(),
        Some(UserRecord::new(7, "alice"))
    );

    listener.stop().await;
}

#[tokio::test]
async fn test_user_deleted_without_record_is_acked() {
    let h = &Harness::new();
    let listener = h.identity(&ConsumerConfig::default());
    listener.start().await.unwrap();

    h.producer
        .publish_event(&UserDeletedEvent::new(7))
        .await
        .unwrap();

    wait_until("ack", || async move { h.acks().await == 1 }).await;
    assert!(h.credentials.is_empty().await);
    assert_eq!(h.broker.pending_count(queues::USER_DELETED).await, 0);
    assert!(h.broker.published("user-deleted.dlq").await.is_empty());

    listener.stop().await;
}

#[tokio::test]
async fn test_get_user_pushes_resolved_users_to_requester() {
    let h = &Harness::new();
    h.users.add(UserRecord::new(1, "alice")).await.unwrap();
    h.users.add(UserRecord::new(2, "bob")).await.unwrap();
    let mut requester = h.hub.connect(3_i64).await;
    let mut bystander = h.hub.connect(1_i64).await;

    let listener = h.profile(&ConsumerConfig::default());
    listener.start().await.unwrap();

    h.producer
        .publish_event(&GetUserEvent::new(3, vec![1, 2, 99]))
        .await
        .unwrap();

    let message = tokio::time::timeout(WAIT_TIMEOUT, requester.recv())
        .await
        .expect("timed out waiting for push")
        .expect("hub closed");
    assert_eq!(message.event, RECEIVE_USERS);
    assert_eq!(
        message.payload,
        json!([
            { "id": 1, "userName": "alice" },
            { "id": 2, "userName": "bob" }
        ])
    );
    assert!(bystander.try_recv().is_none());

    listener.stop().await;
}

#[tokio::test]
async fn test_redelivered_update_is_idempotent() {
    let h = &Harness::new();
    h.credentials
        .add(CredentialRecord::new(7, "old@example.com", "hash-1"))
        .await
        .unwrap();

    let listener = h.identity(&ConsumerConfig::default());
    listener.start().await.unwrap();

    let event = UserUpdatedEvent::new(7)
        .with_email("new@example.com")
        .with_password("hash-2");
    h.producer.publish_event(&event).await.unwrap();
    h.producer.publish_event(&event).await.unwrap();

    wait_until("both deliveries", || async move { h.acks().await == 2 }).await;
    assert_eq!(
        h.credentials.snapshot().await,
        vec![CredentialRecord::new(7, "new@example.com", "hash-2")]
    );

    listener.stop().await;
}

#[tokio::test]
async fn test_malformed_payload_does_not_block_queue() {
    let h = &Harness::new();
    let listener = h.profile(&ConsumerConfig {
        concurrency: 1,
        ..Default::default()
    });
    listener.start().await.unwrap();

    let transport = h.transport();
    transport
        .publish(queues::USER_CREATED, b"not json", &Default::default())
        .await
        .unwrap();
    transport
        .publish(queues::USER_CREATED, b"null", &Default::default())
        .await
        .unwrap();
    h.producer
        .publish_event(&UserCreatedEvent::new(8, Some("bob".to_string())))
        .await
        .unwrap();

    wait_until("valid message", || async move { h.users.len().await == 1 }).await;
    wait_until("all acks", || async move { h.acks().await == 3 }).await;

    assert_eq!(h.users.find(8).await.unwrap(), Some(UserRecord::new(8, "bob")));
    assert_eq!(h.broker.stats().await.rejects, 0);
    assert!(h.broker.published("user-created.dlq").await.is_empty());

    listener.stop().await;
}

#[tokio::test]
async fn test_publish_none_has_no_broker_interaction() {
    let h = &Harness::new();

    let published = h
        .producer
        .publish::<UserCreatedEvent>(None, queues::USER_CREATED)
        .await
        .unwrap();

    assert_eq!(published, Published::Skipped);
    assert_eq!(h.broker.stats().await.producer_interactions(), 0);
    assert!(h.broker.queue_names().await.is_empty());
}

#[tokio::test]
async fn test_failing_handler_is_retried_then_dead_lettered() {
    let h = &Harness::new();
    h.users.set_fail_on_write(true);

    let listener = h.profile(&ConsumerConfig {
        max_retries: 2,
        ..Default::default()
    });
    listener.start().await.unwrap();

    let event = UserCreatedEvent::new(7, Some("alice".to_string()));
    h.producer.publish_event(&event).await.unwrap();

    wait_until("dead letter", || async move {
        !h.broker.published("user-created.dlq").await.is_empty()
    })
    .await;

    let attempts: Vec<_> = h
        .broker
        .published(queues::USER_CREATED)
        .await
        .iter()
        .map(|m| m.headers.retry_count)
        .collect();
    assert_eq!(attempts, vec![0, 1, 2]);

    let dead = h.broker.published("user-created.dlq").await;
    assert_eq!(dead.len(), 1);
    let original: UserCreatedEvent = serde_json::from_slice(&dead[0].payload).unwrap();
    assert_eq!(original, event);
    assert_eq!(dead[0].headers.retry_count, 2);
    assert_eq!(dead[0].headers.attributes[SOURCE_QUEUE_HEADER], "user-created");
    assert_eq!(dead[0].headers.attributes[REASON_HEADER], "handler_failed");
    assert!(dead[0].headers.attributes[ERROR_HEADER].contains("Mock write failure"));

    wait_until("source queue drained", || async move {
        h.broker.pending_count(queues::USER_CREATED).await == 0
    })
    .await;
    assert!(h.users.is_empty().await);

    listener.stop().await;
}

#[tokio::test]
async fn test_message_creates_and_pushes_notification() {
    let h = &Harness::new();
    let mut receiver = h.hub.connect(9_i64).await;

    let listener = h.notification(&ConsumerConfig::default());
    listener.start().await.unwrap();

    h.producer
        .publish_event(&CreatedMessageEvent::new(4, 9, Some("hello".to_string())))
        .await
        .unwrap();

    let message = tokio::time::timeout(WAIT_TIMEOUT, receiver.recv())
        .await
        .expect("timed out waiting for push")
        .expect("hub closed");
    assert_eq!(message.event, RECEIVE_NOTIFICATION);
    assert_eq!(message.payload["message"], "user-4: hello");

    let stored = h.notifications.list_for_user(9).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].message, "user-4: hello");
    assert_eq!(message.payload["id"], stored[0].id);

    listener.stop().await;
}

/// Push channel that is down for its first send.
#[derive(Default)]
struct PushDownOnce {
    sends: AtomicU32,
}

#[async_trait]
impl PushChannel for PushDownOnce {
    async fn send(
        &self,
        _target: &PushTarget,
        _event: &str,
        _payload: serde_json::Value,
    ) -> Result<Delivered, PushError> {
        if self.sends.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(PushError::Unavailable("hub restarting".to_string()));
        }
        Ok(Delivered::NoSession)
    }
}

#[tokio::test]
async fn test_retried_message_stores_one_notification() {
    let h = &Harness::new();
    let push = Arc::new(PushDownOnce::default());
    let listener = notification::listener(
        h.transport(),
        &h.stores(),
        push.clone(),
        &ConsumerConfig::default(),
    );
    listener.start().await.unwrap();

    h.producer
        .publish_event(&CreatedMessageEvent::new(4, 9, Some("hello".to_string())))
        .await
        .unwrap();

    let sends = &push.sends;
    wait_until("second push", || async move { sends.load(Ordering::SeqCst) >= 2 }).await;
    wait_until("both deliveries acked", || async move { h.acks().await == 2 }).await;

    let stored = h.notifications.list_for_user(9).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].message, "user-4: hello");
    assert!(h.broker.published("new-message-event.dlq").await.is_empty());

    listener.stop().await;
}

#[tokio::test]
async fn test_unbound_queue_rejected_at_start() {
    let h = &Harness::new();
    let consumer = Consumer::new(
        profile::SERVICE,
        h.transport(),
        profile::dispatch_table(),
        Arc::new(profile::ProfileScope::new(
            &h.stores(),
            Arc::new(h.hub.clone()),
        )),
    );
    let listener = BackgroundListener::new(profile::SERVICE, consumer, identity::QUEUES);

    let err = listener.start().await.unwrap_err();

    assert!(matches!(err, BusError::Unroutable(ref q) if q == queues::USER_UPDATED));
    assert!(h.broker.queue_names().await.is_empty());
}

#[tokio::test]
async fn test_stopped_listener_leaves_messages_queued() {
    let h = &Harness::new();
    let listener = h.profile(&ConsumerConfig::default());
    listener.run(async {}).await.unwrap();

    h.producer
        .publish_event(&UserCreatedEvent::new(1, None))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(h.users.is_empty().await);
    assert_eq!(h.broker.pending_count(queues::USER_CREATED).await, 1);
}
