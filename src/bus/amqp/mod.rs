//! AMQP (RabbitMQ) transport.
//!
//! Everything goes through the default exchange: the routing key is the queue
//! name. Consumption runs on the connection's primary channel, publishing on
//! a second channel of the same connection.

mod connection;

pub use connection::BrokerConnection;

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    acker::Acker,
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicNackOptions,
        BasicPublishOptions, BasicQosOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel,
};
use tracing::{debug, info};

use super::transport::{
    Acknowledger, Delivery, DeliveryStream, MessageHeaders, Transport, RETRY_COUNT_HEADER,
};
use super::{BusError, Result};

/// Default exchange; routes by queue name.
const DEFAULT_EXCHANGE: &str = "";

/// Content type of every payload.
const CONTENT_TYPE: &str = "application/json";

/// RabbitMQ transport over one connection.
pub struct AmqpTransport {
    connection: Arc<BrokerConnection>,
    publish_channel: Channel,
    prefetch: u16,
}

impl AmqpTransport {
    /// Build a transport on an open connection.
    ///
    /// `prefetch` caps unacknowledged deliveries on the consume channel; zero
    /// leaves it unlimited.
    pub async fn new(connection: Arc<BrokerConnection>, prefetch: u16) -> Result<Self> {
        let publish_channel = connection.create_channel().await?;

        if prefetch > 0 {
            connection
                .channel()
                .basic_qos(prefetch, BasicQosOptions::default())
                .await
                .map_err(|e| BusError::Subscribe(format!("Failed to set prefetch: {}", e)))?;
        }

        Ok(Self {
            connection,
            publish_channel,
            prefetch,
        })
    }

    pub fn connection(&self) -> &Arc<BrokerConnection> {
        &self.connection
    }

    pub fn prefetch(&self) -> u16 {
        self.prefetch
    }

    /// Close the publish channel and the underlying connection.
    pub async fn close(&self) {
        if let Err(e) = self.publish_channel.close(200, "closing").await {
            debug!(error = %e, "Publish channel close failed");
        }
        self.connection.close().await;
    }
}

async fn declare(channel: &Channel, queue: &str) -> Result<()> {
    channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: false,
                exclusive: false,
                auto_delete: false,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|e| BusError::Subscribe(format!("Failed to declare queue '{}': {}", queue, e)))?;
    Ok(())
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn declare_queue(&self, queue: &str) -> Result<()> {
        declare(&self.publish_channel, queue).await
    }

    async fn publish(&self, queue: &str, payload: &[u8], headers: &MessageHeaders) -> Result<()> {
        let mut properties =
            BasicProperties::default().with_content_type(CONTENT_TYPE.into());
        let table = to_field_table(headers);
        if !table.inner().is_empty() {
            properties = properties.with_headers(table);
        }

        let confirm = self
            .publish_channel
            .basic_publish(
                DEFAULT_EXCHANGE,
                queue,
                BasicPublishOptions::default(),
                payload,
                properties,
            )
            .await
            .map_err(|e| BusError::Publish(format!("Failed to publish: {}", e)))?;

        confirm
            .await
            .map_err(|e| BusError::Publish(format!("Publish confirmation failed: {}", e)))?;

        debug!(queue = %queue, bytes = payload.len(), "Published to AMQP");
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream> {
        let channel = self.connection.channel();
        declare(channel, queue).await?;

        let consumer = channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to start consumer: {}", e)))?;

        info!(queue = %queue, consumer_tag = %consumer_tag, "AMQP consumer started");

        let queue = queue.to_string();
        let stream = consumer.map(move |delivery| -> Result<Delivery> {
            let delivery =
                delivery.map_err(|e| BusError::Subscribe(format!("Delivery failed: {}", e)))?;
            let headers = from_properties(&delivery.properties);
            Ok(Delivery::new(
                queue.clone(),
                delivery.data,
                headers,
                Box::new(AmqpAcker(delivery.acker)),
            ))
        });

        Ok(stream.boxed())
    }

    async fn cancel(&self, consumer_tag: &str) -> Result<()> {
        self.connection
            .channel()
            .basic_cancel(consumer_tag, BasicCancelOptions::default())
            .await
            .map_err(|e| BusError::Subscribe(format!("Failed to cancel consumer: {}", e)))
    }
}

struct AmqpAcker(Acker);

#[async_trait]
impl Acknowledger for AmqpAcker {
    async fn ack(&self) -> Result<()> {
        self.0
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| BusError::Settle(format!("Failed to ack: {}", e)))
    }

    async fn nack(&self, requeue: bool) -> Result<()> {
        self.0
            .nack(BasicNackOptions {
                requeue,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Settle(format!("Failed to nack: {}", e)))
    }
}

fn to_field_table(headers: &MessageHeaders) -> FieldTable {
    let mut table = FieldTable::default();
    if headers.retry_count > 0 {
        let count = i32::try_from(headers.retry_count).unwrap_or(i32::MAX);
        table.insert(RETRY_COUNT_HEADER.into(), AMQPValue::LongInt(count));
    }
    for (key, value) in &headers.attributes {
        table.insert(
            key.as_str().into(),
            AMQPValue::LongString(value.as_str().into()),
        );
    }
    table
}

fn from_properties(properties: &BasicProperties) -> MessageHeaders {
    let mut headers = MessageHeaders::default();
    let Some(table) = properties.headers() else {
        return headers;
    };

    for (key, value) in table.inner() {
        if key.as_str() == RETRY_COUNT_HEADER {
            headers.retry_count = retry_count(value).unwrap_or(0);
        } else if let AMQPValue::LongString(s) = value {
            if let Ok(text) = std::str::from_utf8(s.as_bytes()) {
                headers
                    .attributes
                    .insert(key.as_str().to_string(), text.to_string());
            }
        }
    }
    headers
}

/// Brokers and other clients may encode the counter with any integer width.
fn retry_count(value: &AMQPValue) -> Option<u32> {
    match value {
        AMQPValue::ShortShortUInt(v) => Some(u32::from(*v)),
        AMQPValue::ShortUInt(v) => Some(u32::from(*v)),
        AMQPValue::LongUInt(v) => Some(*v),
        AMQPValue::ShortShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::ShortInt(v) => u32::try_from(*v).ok(),
        AMQPValue::LongInt(v) => u32::try_from(*v).ok(),
        AMQPValue::LongLongInt(v) => u32::try_from(*v).ok(),
        _ => None,
    }
}
