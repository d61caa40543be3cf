//! Shared utilities for integration tests.
//!
//! Wires the three services to one in-memory broker, in-memory replica
//! stores and a push hub, the way the binaries wire them to RabbitMQ.

#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use courier::bus::{MemoryBroker, Producer, Transport};
use courier::config::ConsumerConfig;
use courier::listener::BackgroundListener;
use courier::push::PushHub;
use courier::services::identity::IdentityEvent;
use courier::services::notification::NotificationEvent;
use courier::services::profile::ProfileEvent;
use courier::services::{identity, notification, profile};
use courier::storage::{
    CredentialRecord, MemoryNotificationStore, MemoryReplicaStore, Stores, UserRecord,
};

/// How long to wait for asynchronous delivery before failing a test.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct Harness {
    pub broker: MemoryBroker,
    pub producer: Producer,
    pub hub: PushHub,
    pub users: Arc<MemoryReplicaStore<UserRecord>>,
    pub credentials: Arc<MemoryReplicaStore<CredentialRecord>>,
    pub notifications: Arc<MemoryNotificationStore>,
}

impl Harness {
    pub fn new() -> Self {
        let broker = MemoryBroker::new();
        let transport: Arc<dyn Transport> = Arc::new(broker.clone());
        Self {
            producer: Producer::new(transport),
            broker,
            hub: PushHub::new(),
            users: Arc::new(MemoryReplicaStore::new()),
            credentials: Arc::new(MemoryReplicaStore::new()),
            notifications: Arc::new(MemoryNotificationStore::new()),
        }
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.broker.clone())
    }

    pub fn stores(&self) -> Stores {
        Stores {
            users: self.users.clone(),
            credentials: self.credentials.clone(),
            notifications: self.notifications.clone(),
        }
    }

    pub fn profile(&self, config: &ConsumerConfig) -> BackgroundListener<ProfileEvent> {
        profile::listener(
            self.transport(),
            &self.stores(),
            Arc::new(self.hub.clone()),
            config,
        )
    }

    pub fn identity(&self, config: &ConsumerConfig) -> BackgroundListener<IdentityEvent> {
        identity::listener(self.transport(), &self.stores(), config)
    }

    pub fn notification(&self, config: &ConsumerConfig) -> BackgroundListener<NotificationEvent> {
        notification::listener(
            self.transport(),
            &self.stores(),
            Arc::new(self.hub.clone()),
            config,
        )
    }

    pub async fn acks(&self) -> usize {
        self.broker.stats().await.acks
    }
}

/// Poll `check` until it returns true, panicking after [`WAIT_TIMEOUT`].
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("Timed out waiting for {}", what);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
