//! Long-running subscription host for one service.
//!
//! Subscribes the service's consumer to each of its queues, then waits for a
//! shutdown signal and cancels the subscriptions. A subscription that ends on
//! its own is not restarted.

use std::future::Future;

use tracing::{error, info};

use crate::bus::{BusError, Consumer};
use crate::services::ServiceEvent;

pub struct BackgroundListener<E: ServiceEvent> {
    name: String,
    consumer: Consumer<E>,
    queues: Vec<String>,
}

impl<E: ServiceEvent> BackgroundListener<E> {
    pub fn new<I, Q>(name: impl Into<String>, consumer: Consumer<E>, queues: I) -> Self
    where
        I: IntoIterator<Item = Q>,
        Q: Into<String>,
    {
        Self {
            name: name.into(),
            consumer,
            queues: queues.into_iter().map(Into::into).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn consumer(&self) -> &Consumer<E> {
        &self.consumer
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    /// Subscribe to every queue.
    ///
    /// Fails without subscribing if any queue has no event binding. A queue
    /// that cannot be subscribed is logged and skipped.
    pub async fn start(&self) -> Result<(), BusError> {
        self.consumer
            .dispatch()
            .validate(self.queues.iter().map(String::as_str))?;

        for queue in &self.queues {
            if let Err(e) = self.consumer.consume_event(queue).await {
                error!(
                    listener = %self.name,
                    queue = %queue,
                    error = %e,
                    "Failed to subscribe"
                );
            }
        }

        info!(
            listener = %self.name,
            queues = ?self.queues,
            "Listener started"
        );
        Ok(())
    }

    /// Cancel every subscription.
    pub async fn stop(&self) {
        self.consumer.stop().await;
        info!(listener = %self.name, "Listener stopped");
    }

    /// Start, wait for `shutdown`, then stop.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), BusError>
    where
        F: Future,
    {
        self.start().await?;
        shutdown.await;
        info!(listener = %self.name, "Shutdown requested");
        self.stop().await;
        Ok(())
    }
}
