//! Dead Letter Queue (DLQ) infrastructure.
//!
//! Messages that cannot be handled are copied to a dead letter queue for
//! manual review and replay instead of being redelivered forever.
//!
//! ## Queue Naming
//!
//! DLQ queues follow the pattern: `{queue}.dlq`
//!
//! ## Message Format
//!
//! The original payload is published unchanged so it can be moved back to the
//! source queue as-is. Failure details travel in message headers:
//! - `x-dlq-source-queue`: queue the message was consumed from
//! - `x-dlq-reason`: `handler_failed` or `unroutable`
//! - `x-dlq-error`: last error text
//! - `x-dlq-failed-at`: RFC 3339 timestamp
//! - `x-retry-count`: attempts made before giving up

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::bus::{MessageHeaders, Producer};

/// Suffix appended to a queue name to form its DLQ.
pub const DLQ_SUFFIX: &str = ".dlq";

/// Header naming the queue the message was consumed from.
pub const SOURCE_QUEUE_HEADER: &str = "x-dlq-source-queue";
/// Header carrying the [`DeadLetterReason`].
pub const REASON_HEADER: &str = "x-dlq-reason";
/// Header carrying the last error text.
pub const ERROR_HEADER: &str = "x-dlq-error";
/// Header carrying the failure time.
pub const FAILED_AT_HEADER: &str = "x-dlq-failed-at";

/// Build the DLQ name for a queue.
pub fn dlq_queue_for(queue: &str) -> String {
    format!("{}{}", queue, DLQ_SUFFIX)
}

/// Errors that can occur during DLQ operations.
#[derive(Debug, thiserror::Error)]
pub enum DlqError {
    #[error("DLQ not configured")]
    NotConfigured,

    #[error("Failed to publish to DLQ: {0}")]
    PublishFailed(String),
}

/// Why a message was dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// The handler kept failing until retries ran out.
    HandlerFailed,
    /// No event type is bound to the source queue.
    Unroutable,
}

impl DeadLetterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HandlerFailed => "handler_failed",
            Self::Unroutable => "unroutable",
        }
    }
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A message that could not be handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// Queue the message was consumed from.
    pub source_queue: String,
    /// The original payload, byte for byte.
    pub payload: Vec<u8>,
    pub reason: DeadLetterReason,
    /// Human-readable error text.
    pub error: String,
    /// Handling attempts made before giving up.
    pub retry_count: u32,
    pub failed_at: DateTime<Utc>,
    /// Additional context.
    pub metadata: BTreeMap<String, String>,
}

impl DeadLetter {
    /// Create a dead letter for a message whose handler exhausted its retries.
    pub fn from_handler_failure(
        source_queue: &str,
        payload: &[u8],
        error: &str,
        retry_count: u32,
    ) -> Self {
        Self {
            source_queue: source_queue.to_string(),
            payload: payload.to_vec(),
            reason: DeadLetterReason::HandlerFailed,
            error: format!(
                "Event handling failed after {} attempts: {}",
                retry_count + 1,
                error
            ),
            retry_count,
            failed_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Create a dead letter for a message arriving on a queue with no binding.
    pub fn from_unroutable(source_queue: &str, payload: &[u8]) -> Self {
        Self {
            source_queue: source_queue.to_string(),
            payload: payload.to_vec(),
            reason: DeadLetterReason::Unroutable,
            error: format!("No event type registered for queue '{}'", source_queue),
            retry_count: 0,
            failed_at: Utc::now(),
            metadata: BTreeMap::new(),
        }
    }

    /// Add metadata to the dead letter.
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// The DLQ this dead letter goes to.
    pub fn queue(&self) -> String {
        dlq_queue_for(&self.source_queue)
    }

    /// Failure details as message headers.
    pub fn headers(&self) -> MessageHeaders {
        let mut headers = MessageHeaders::with_retry_count(self.retry_count)
            .with_attribute(SOURCE_QUEUE_HEADER, self.source_queue.as_str())
            .with_attribute(REASON_HEADER, self.reason.as_str())
            .with_attribute(ERROR_HEADER, self.error.as_str())
            .with_attribute(FAILED_AT_HEADER, self.failed_at.to_rfc3339());
        for (key, value) in &self.metadata {
            headers.attributes.insert(key.clone(), value.clone());
        }
        headers
    }
}

/// Trait for publishing messages to a dead letter queue.
#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    /// Publish a dead letter to its queue.
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError>;

    /// Check if the publisher is configured and ready.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Publishes dead letters to `{queue}.dlq` on the broker.
pub struct QueueDeadLetterPublisher {
    producer: Producer,
}

impl QueueDeadLetterPublisher {
    pub fn new(producer: Producer) -> Self {
        Self { producer }
    }
}

#[async_trait]
impl DeadLetterPublisher for QueueDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        let queue = dead_letter.queue();
        self.producer
            .publish_raw(&queue, &dead_letter.payload, &dead_letter.headers())
            .await
            .map_err(|e| DlqError::PublishFailed(e.to_string()))?;

        info!(
            queue = %queue,
            reason = %dead_letter.reason,
            retry_count = dead_letter.retry_count,
            "Published to DLQ"
        );
        Ok(())
    }
}

/// No-op DLQ publisher that logs but doesn't actually send anywhere.
///
/// Used when dead-lettering is disabled.
pub struct NoopDeadLetterPublisher;

#[async_trait]
impl DeadLetterPublisher for NoopDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        warn!(
            queue = %dead_letter.queue(),
            reason = %dead_letter.reason,
            error = %dead_letter.error,
            "DLQ not configured, dropping dead letter"
        );
        Ok(())
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// In-memory DLQ publisher using a channel.
///
/// Used for testing.
pub struct ChannelDeadLetterPublisher {
    sender: mpsc::UnboundedSender<DeadLetter>,
}

impl ChannelDeadLetterPublisher {
    /// Returns the publisher and a receiver for consuming dead letters.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeadLetter>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl DeadLetterPublisher for ChannelDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        info!(
            queue = %dead_letter.queue(),
            reason = %dead_letter.reason,
            "Publishing to channel DLQ"
        );
        self.sender
            .send(dead_letter)
            .map_err(|e| DlqError::PublishFailed(e.to_string()))
    }
}
