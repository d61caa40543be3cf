//! Event bus for async delivery between services.
//!
//! This module contains:
//! - `Transport` trait: the broker seam (declare, publish, consume, settle)
//! - `Producer`: typed publish to a named queue
//! - `Consumer`: per-queue subscription with dispatch and ack policy
//! - `DispatchTable`: explicit queue name → event variant mapping
//! - Implementations: AMQP (RabbitMQ), in-memory

// Implementation modules
#[cfg(feature = "amqp")]
pub mod amqp;
pub mod consumer;
pub mod dispatch;
pub mod memory;
pub mod producer;
pub mod transport;

// Re-exports
#[cfg(feature = "amqp")]
pub use amqp::{AmqpTransport, BrokerConnection};
pub use consumer::{Consumer, DeliveryOutcome};
pub use dispatch::{Decoded, DispatchTable};
pub use memory::MemoryBroker;
pub use producer::{Producer, Published};
pub use transport::{Acknowledger, Delivery, DeliveryStream, MessageHeaders, Transport};

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Acknowledgement failed: {0}")]
    Settle(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No event type registered for queue '{0}'")]
    Unroutable(String),
}

impl BusError {
    /// Whether retrying the same operation might succeed.
    ///
    /// Broker-side failures are transient. Encoding and configuration
    /// failures will fail the same way every time.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Publish(_) | Self::Subscribe(_) | Self::Settle(_)
        )
    }
}
