//! Broker seam shared by the AMQP and in-memory transports.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::Result;

/// Header carrying how many times a delivery has been retried.
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// Stream of deliveries for one subscription.
pub type DeliveryStream = BoxStream<'static, Result<Delivery>>;

/// Message headers understood by the consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeaders {
    /// Number of failed handling attempts before this delivery.
    pub retry_count: u32,
    /// Free-form string attributes (dead-letter reason, source queue, ...).
    pub attributes: BTreeMap<String, String>,
}

impl MessageHeaders {
    pub fn with_retry_count(retry_count: u32) -> Self {
        Self {
            retry_count,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// Settles a single delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Remove the delivery from the queue.
    async fn ack(&self) -> Result<()>;

    /// Negative-acknowledge; `requeue` puts the message back on the queue.
    async fn nack(&self, requeue: bool) -> Result<()>;
}

/// A message handed to a subscriber.
///
/// Not retained after the handler completes; settle it exactly once.
pub struct Delivery {
    queue: String,
    data: Vec<u8>,
    headers: MessageHeaders,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(
        queue: impl Into<String>,
        data: Vec<u8>,
        headers: MessageHeaders,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            queue: queue.into(),
            data,
            headers,
            acker,
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn headers(&self) -> &MessageHeaders {
        &self.headers
    }

    pub fn retry_count(&self) -> u32 {
        self.headers.retry_count
    }

    pub async fn ack(&self) -> Result<()> {
        self.acker.ack().await
    }

    pub async fn nack(&self, requeue: bool) -> Result<()> {
        self.acker.nack(requeue).await
    }

    /// Drop the delivery without requeueing.
    pub async fn reject(&self) -> Result<()> {
        self.acker.nack(false).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("queue", &self.queue)
            .field("bytes", &self.data.len())
            .field("headers", &self.headers)
            .finish()
    }
}

/// Interface to a message broker.
///
/// Implementations:
/// - `AmqpTransport`: RabbitMQ via AMQP, default exchange
/// - `MemoryBroker`: in-process queues for tests and local runs
#[async_trait]
pub trait Transport: Send + Sync {
    /// Declare a queue (non-durable, non-exclusive, not auto-delete).
    ///
    /// Idempotent when the queue already exists with the same settings.
    async fn declare_queue(&self, queue: &str) -> Result<()>;

    /// Publish a payload directly to a queue (routing key = queue name).
    async fn publish(&self, queue: &str, payload: &[u8], headers: &MessageHeaders) -> Result<()>;

    /// Start a subscription on a queue with manual acknowledgement.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream>;

    /// Stop a subscription started with `consume`.
    async fn cancel(&self, consumer_tag: &str) -> Result<()>;
}
