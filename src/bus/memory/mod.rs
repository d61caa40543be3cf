//! In-memory broker for standalone runs and tests.
//!
//! Mirrors the parts of RabbitMQ's default-exchange behaviour the consumer
//! relies on: named queues, competing consumers, manual ack, requeue on nack,
//! and silent drop when publishing to a queue that was never declared.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, info};

use super::transport::{Acknowledger, Delivery, DeliveryStream, MessageHeaders, Transport};
use super::{BusError, Result};

/// A message as it sits on an in-memory queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub payload: Vec<u8>,
    pub headers: MessageHeaders,
}

/// Counters of broker interactions, for assertions in tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrokerStats {
    pub declares: usize,
    pub publishes: usize,
    pub acks: usize,
    pub requeues: usize,
    pub rejects: usize,
}

impl BrokerStats {
    /// Calls made on behalf of a producer.
    pub fn producer_interactions(&self) -> usize {
        self.declares + self.publishes
    }
}

#[derive(Default)]
struct MemoryQueue {
    pending: Mutex<VecDeque<StoredMessage>>,
    history: Mutex<Vec<StoredMessage>>,
    notify: Notify,
}

impl MemoryQueue {
    async fn push(&self, message: StoredMessage) {
        self.pending.lock().await.push_back(message);
        self.notify.notify_one();
    }

    /// Wait for the next pending message.
    async fn pop(&self) -> StoredMessage {
        loop {
            if let Some(message) = self.pending.lock().await.pop_front() {
                return message;
            }
            self.notify.notified().await;
        }
    }
}

#[derive(Default)]
struct Inner {
    queues: RwLock<HashMap<String, Arc<MemoryQueue>>>,
    consumers: Mutex<HashMap<String, Arc<Notify>>>,
    stats: Mutex<BrokerStats>,
    fail_on_publish: AtomicBool,
}

/// In-process broker. Cloning shares the same queues.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail with a transient error.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.inner.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    pub async fn stats(&self) -> BrokerStats {
        *self.inner.stats.lock().await
    }

    /// Every message ever published to `queue`, in publish order.
    pub async fn published(&self, queue: &str) -> Vec<StoredMessage> {
        match self.queue(queue).await {
            Some(q) => q.history.lock().await.clone(),
            None => Vec::new(),
        }
    }

    /// Messages waiting on `queue` that no consumer has taken yet.
    pub async fn pending_count(&self, queue: &str) -> usize {
        match self.queue(queue).await {
            Some(q) => q.pending.lock().await.len(),
            None => 0,
        }
    }

    pub async fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.inner.queues.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    async fn queue(&self, name: &str) -> Option<Arc<MemoryQueue>> {
        self.inner.queues.read().await.get(name).cloned()
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        self.inner
            .queues
            .write()
            .await
            .entry(queue.to_string())
            .or_default();
        self.inner.stats.lock().await.declares += 1;
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: &[u8], headers: &MessageHeaders) -> Result<()> {
        if self.inner.fail_on_publish.load(Ordering::SeqCst) {
            return Err(BusError::Publish("Mock publish failure".to_string()));
        }
        self.inner.stats.lock().await.publishes += 1;

        let Some(q) = self.queue(queue).await else {
            // Default exchange drops messages routed to a missing queue
            debug!(queue = %queue, "Dropped message for undeclared queue");
            return Ok(());
        };

        let message = StoredMessage {
            payload: payload.to_vec(),
            headers: headers.clone(),
        };
        q.history.lock().await.push(message.clone());
        q.push(message).await;
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        let q = self
            .queue(queue)
            .await
            .ok_or_else(|| BusError::Subscribe(format!("Queue '{}' not declared", queue)))?;

        let cancelled = Arc::new(Notify::new());
        self.inner
            .consumers
            .lock()
            .await
            .insert(consumer_tag.to_string(), cancelled.clone());

        info!(queue = %queue, consumer_tag = %consumer_tag, "Memory consumer started");

        let state = (self.inner.clone(), q, cancelled, queue.to_string());
        let stream = futures::stream::unfold(state, |(inner, q, cancelled, name)| async move {
            let message = tokio::select! {
                message = q.pop() => message,
                _ = cancelled.notified() => return None,
            };
            let acker = MemoryAcker {
                inner: inner.clone(),
                queue: q.clone(),
                message: message.clone(),
                settled: AtomicBool::new(false),
            };
            let delivery = Delivery::new(
                name.clone(),
                message.payload,
                message.headers,
                Box::new(acker),
            );
            Some((Ok(delivery), (inner, q, cancelled, name)))
        });

        Ok(stream.boxed())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<()> {
        if let Some(cancelled) = self.inner.consumers.lock().await.remove(consumer_tag) {
            cancelled.notify_one();
        }
        Ok(())
    }
}

struct MemoryAcker {
    inner: Arc<Inner>,
    queue: Arc<MemoryQueue>,
    message: StoredMessage,
    settled: AtomicBool,
}

impl MemoryAcker {
    fn settle_once(&self) -> Result<()> {
        if self.settled.swap(true, Ordering::SeqCst) {
            return Err(BusError::Settle("Delivery already settled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<()> {
        self.settle_once()?;
        self.inner.stats.lock().await.acks += 1;
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        self.settle_once()?;
        if requeue {
            self.inner.stats.lock().await.requeues += 1;
            self.queue.push(self.message.clone()).await;
        } else {
            self.inner.stats.lock().await.rejects += 1;
        }
        Ok(())
    }
}
