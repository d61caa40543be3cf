//! Typed publishing to a named queue.

use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use serde::Serialize;
use tracing::{debug, error, warn};

use super::transport::{MessageHeaders, Transport};
use super::{BusError, Result};
use crate::events::Event;
use crate::utils::retry::{is_retryable, publish_backoff};

/// What a publish call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    /// Payload handed to the broker.
    Sent,
    /// No message was given; the broker was not contacted.
    Skipped,
}

/// Publishes JSON payloads on the default exchange, routing key = queue name.
#[derive(Clone)]
pub struct Producer {
    transport: Arc<dyn Transport>,
    backoff: ExponentialBuilder,
}

impl Producer {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            backoff: publish_backoff(),
        }
    }

    /// Replace the backoff used for transient publish failures.
    pub fn with_backoff(mut self, backoff: ExponentialBuilder) -> Self {
        self.backoff = backoff;
        self
    }

    /// Serialize `message` and publish it to `queue`.
    ///
    /// `None` is a no-op. The queue is declared before every publish.
    #[tracing::instrument(name = "bus.publish", skip_all, fields(queue = %queue))]
    pub async fn publish<T>(&self, message: Option<&T>, queue: &str) -> Result<Published>
    where
        T: Serialize + ?Sized + Sync,
    {
        let Some(message) = message else {
            debug!("Nothing to publish");
            return Ok(Published::Skipped);
        };

        let payload = serde_json::to_vec(message)?;
        self.publish_raw(queue, &payload, &MessageHeaders::default())
            .await?;

        debug!(bytes = payload.len(), "Published message");
        Ok(Published::Sent)
    }

    /// Publish an event to the queue it is bound to.
    pub async fn publish_event<T: Event>(&self, event: &T) -> Result<Published> {
        self.publish(Some(event), T::QUEUE).await
    }

    /// Publish and log any failure instead of returning it.
    pub async fn publish_or_log<T>(&self, message: Option<&T>, queue: &str)
    where
        T: Serialize + ?Sized + Sync,
    {
        if let Err(e) = self.publish(message, queue).await {
            error!(queue = %queue, error = %e, "Failed to publish message");
        }
    }

    /// Declare `queue` and publish pre-encoded bytes, retrying transient failures.
    pub async fn publish_raw(
        &self,
        queue: &str,
        payload: &[u8],
        headers: &MessageHeaders,
    ) -> Result<()> {
        let transport = &self.transport;

        (|| async move {
            transport.declare_queue(queue).await?;
            transport.publish(queue, payload, headers).await
        })
        .retry(self.backoff.clone())
        .when(is_retryable)
        .notify(|err: &BusError, dur: Duration| {
            warn!(queue = %queue, error = %err, delay = ?dur, "Publish failed, retrying");
        })
        .await
    }
}
