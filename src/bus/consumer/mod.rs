//! Per-queue subscriptions with dispatch and acknowledgement policy.
//!
//! Every delivery is processed on its own task:
//! 1. Decode by queue through the [`DispatchTable`]
//! 2. Open a fresh handler through the service's [`HandlerScope`]
//! 3. Run the handler
//! 4. Settle
//!
//! Settlement policy:
//! - Handler succeeded: ack
//! - Payload is `null` or malformed: warn, ack (redelivery cannot help)
//! - Queue has no binding: dead-letter, reject without requeue
//! - Handler failed with retries left: republish with `x-retry-count + 1`, ack
//! - Handler failed with no retries left: dead-letter to `{queue}.dlq`, ack
//! - Republish or dead-letter failed: nack with requeue

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use super::dispatch::{Decoded, DispatchTable};
use super::producer::Producer;
use super::transport::{Delivery, DeliveryStream, Transport};
use super::Result;
use crate::config::ConsumerConfig;
use crate::dlq::{DeadLetter, DeadLetterPublisher, NoopDeadLetterPublisher, QueueDeadLetterPublisher};
use crate::services::{HandlerError, HandlerScope, ServiceEvent};

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Handler succeeded; acked.
    Handled,
    /// Payload could not be decoded; acked without handling.
    Discarded,
    /// Handler failed; republished for another attempt and acked.
    Retried { attempt: u32 },
    /// Handler failed with no retries left; dead-lettered and acked.
    DeadLettered,
    /// No event type bound to the queue; rejected.
    Unroutable,
    /// Could not republish or dead-letter; returned to the queue.
    Requeued,
}

impl DeliveryOutcome {
    /// Returns true if the handler ran to completion.
    pub fn is_handled(&self) -> bool {
        matches!(self, Self::Handled)
    }
}

struct Subscription {
    consumer_tag: String,
    task: JoinHandle<()>,
}

/// Shared state for delivery tasks.
struct Worker<E: ServiceEvent> {
    producer: Producer,
    dispatch: Arc<DispatchTable<E>>,
    scope: Arc<dyn HandlerScope<E>>,
    dead_letters: Arc<dyn DeadLetterPublisher>,
    max_retries: u32,
}

/// Subscribes a service to its queues and runs its handlers.
pub struct Consumer<E: ServiceEvent> {
    service: String,
    transport: Arc<dyn Transport>,
    producer: Producer,
    dispatch: Arc<DispatchTable<E>>,
    scope: Arc<dyn HandlerScope<E>>,
    dead_letters: Arc<dyn DeadLetterPublisher>,
    config: ConsumerConfig,
    subscriptions: Mutex<HashMap<String, Subscription>>,
}

impl<E: ServiceEvent> Consumer<E> {
    /// Create a consumer with default settings.
    ///
    /// Failed messages are dead-lettered to `{queue}.dlq` on the same broker.
    pub fn new(
        service: impl Into<String>,
        transport: Arc<dyn Transport>,
        dispatch: DispatchTable<E>,
        scope: Arc<dyn HandlerScope<E>>,
    ) -> Self {
        let producer = Producer::new(transport.clone());
        let dead_letters: Arc<dyn DeadLetterPublisher> =
            Arc::new(QueueDeadLetterPublisher::new(producer.clone()));

        Self {
            service: service.into(),
            transport,
            producer,
            dispatch: Arc::new(dispatch),
            scope,
            dead_letters,
            config: ConsumerConfig::default(),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Apply retry, concurrency and dead-letter settings.
    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        if !config.dead_letter {
            self.dead_letters = Arc::new(NoopDeadLetterPublisher);
        }
        self.config = config;
        self
    }

    /// Replace where failed messages are sent.
    pub fn with_dead_letters(mut self, dead_letters: Arc<dyn DeadLetterPublisher>) -> Self {
        self.dead_letters = dead_letters;
        self
    }

    /// Replace the producer used to republish retries.
    pub fn with_producer(mut self, producer: Producer) -> Self {
        self.producer = producer;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn dispatch(&self) -> &DispatchTable<E> {
        &self.dispatch
    }

    pub fn config(&self) -> &ConsumerConfig {
        &self.config
    }

    /// Queues with an active subscription, sorted.
    pub async fn subscribed_queues(&self) -> Vec<String> {
        let mut queues: Vec<_> = self.subscriptions.lock().await.keys().cloned().collect();
        queues.sort();
        queues
    }

    /// Declare `queue` and start consuming it.
    ///
    /// Calling again for the same queue replaces the earlier subscription.
    pub async fn consume_event(&self, queue: &str) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        if let Some(previous) = subscriptions.remove(queue) {
            debug!(queue = %queue, "Replacing existing subscription");
            self.end(queue, previous).await;
        }

        self.transport.declare_queue(queue).await?;

        let consumer_tag = format!("{}-{}-{}", self.service, queue, Uuid::new_v4().simple());
        let stream = self.transport.consume(queue, &consumer_tag).await?;

        let span = tracing::info_span!("bus.subscription", service = %self.service, queue = %queue);
        let task = tokio::spawn(
            Self::run(stream, Arc::new(self.worker()), self.config.concurrency).instrument(span),
        );

        info!(
            service = %self.service,
            queue = %queue,
            consumer_tag = %consumer_tag,
            "Subscribed"
        );
        subscriptions.insert(
            queue.to_string(),
            Subscription {
                consumer_tag,
                task,
            },
        );
        Ok(())
    }

    /// Cancel every subscription. In-flight deliveries are not drained.
    pub async fn stop(&self) {
        let mut subscriptions = self.subscriptions.lock().await;
        for (queue, subscription) in subscriptions.drain() {
            self.end(&queue, subscription).await;
        }
        info!(service = %self.service, "Consumer stopped");
    }

    /// Decode, handle and settle one delivery.
    pub async fn process_delivery(&self, delivery: Delivery) -> DeliveryOutcome {
        self.worker().process_delivery(delivery).await
    }

    async fn end(&self, queue: &str, subscription: Subscription) {
        if let Err(e) = self.transport.cancel(&subscription.consumer_tag).await {
            warn!(queue = %queue, error = %e, "Failed to cancel consumer");
        }
        subscription.task.abort();
    }

    fn worker(&self) -> Worker<E> {
        Worker {
            producer: self.producer.clone(),
            dispatch: self.dispatch.clone(),
            scope: self.scope.clone(),
            dead_letters: self.dead_letters.clone(),
            max_retries: self.config.max_retries,
        }
    }

    /// Pull deliveries until the stream ends, one task per delivery.
    async fn run(mut stream: DeliveryStream, worker: Arc<Worker<E>>, concurrency: usize) {
        let permits = Arc::new(Semaphore::new(concurrency.max(1)));

        while let Some(delivery) = stream.next().await {
            let delivery = match delivery {
                Ok(delivery) => delivery,
                Err(e) => {
                    error!(error = %e, "Consumer delivery error, subscription ended");
                    break;
                }
            };

            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let worker = worker.clone();
            tokio::spawn(async move {
                worker.process_delivery(delivery).await;
                drop(permit);
            });
        }

        info!("Consumer stream ended");
    }
}

impl<E: ServiceEvent> Worker<E> {
    async fn process_delivery(&self, delivery: Delivery) -> DeliveryOutcome {
        let span = tracing::info_span!(
            "bus.consume",
            queue = %delivery.queue(),
            retry_count = delivery.retry_count()
        );

        async {
            let event = match self.dispatch.decode(delivery.queue(), delivery.data()) {
                Decoded::Event(event) => event,
                Decoded::Empty => {
                    warn!("Received null payload, discarding");
                    ack(&delivery).await;
                    return DeliveryOutcome::Discarded;
                }
                Decoded::Malformed(e) => {
                    warn!(error = %e, "Failed to decode payload, discarding");
                    ack(&delivery).await;
                    return DeliveryOutcome::Discarded;
                }
                Decoded::Unroutable => return self.unroutable(&delivery).await,
            };

            let name = event.name();
            debug!(event = name, "Dispatching event");

            let mut handler = self.scope.begin();
            match handler.handle(event).await {
                Ok(()) => {
                    debug!(event = name, "Event handled");
                    ack(&delivery).await;
                    DeliveryOutcome::Handled
                }
                Err(e) => self.failed(&delivery, name, e).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn unroutable(&self, delivery: &Delivery) -> DeliveryOutcome {
        error!("No event type registered for queue, rejecting");

        let dead_letter = DeadLetter::from_unroutable(delivery.queue(), delivery.data());
        if let Err(e) = self.dead_letters.publish(dead_letter).await {
            error!(error = %e, "Failed to dead-letter unroutable message");
        }

        if let Err(e) = delivery.reject().await {
            error!(error = %e, "Failed to reject message");
        }
        DeliveryOutcome::Unroutable
    }

    async fn failed(&self, delivery: &Delivery, name: &str, error: HandlerError) -> DeliveryOutcome {
        let retry_count = delivery.retry_count();

        if retry_count < self.max_retries {
            let attempt = retry_count + 1;
            let mut headers = delivery.headers().clone();
            headers.retry_count = attempt;

            return match self
                .producer
                .publish_raw(delivery.queue(), delivery.data(), &headers)
                .await
            {
                Ok(()) => {
                    warn!(
                        event = name,
                        error = %error,
                        attempt,
                        max_retries = self.max_retries,
                        "Handler failed, scheduled retry"
                    );
                    ack(delivery).await;
                    DeliveryOutcome::Retried { attempt }
                }
                Err(e) => {
                    error!(event = name, error = %e, "Failed to republish for retry, requeueing");
                    requeue(delivery).await;
                    DeliveryOutcome::Requeued
                }
            };
        }

        let dead_letter = DeadLetter::from_handler_failure(
            delivery.queue(),
            delivery.data(),
            &error.to_string(),
            retry_count,
        );
        match self.dead_letters.publish(dead_letter).await {
            Ok(()) => {
                error!(
                    event = name,
                    error = %error,
                    retry_count,
                    "Retries exhausted, message dead-lettered"
                );
                ack(delivery).await;
                DeliveryOutcome::DeadLettered
            }
            Err(e) => {
                error!(event = name, error = %e, "Failed to dead-letter, requeueing");
                requeue(delivery).await;
                DeliveryOutcome::Requeued
            }
        }
    }
}

async fn ack(delivery: &Delivery) {
    if let Err(e) = delivery.ack().await {
        error!(error = %e, "Failed to ack message");
    }
}

async fn requeue(delivery: &Delivery) {
    if let Err(e) = delivery.nack(true).await {
        error!(error = %e, "Failed to requeue message");
    }
}
