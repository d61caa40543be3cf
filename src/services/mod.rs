//! Per-service event handling.
//!
//! Each service consumes a closed set of events, modelled as an enum, and
//! applies them to its local replicas. A fresh handler is opened for every
//! delivery through the service's [`HandlerScope`].

use std::fmt;

use async_trait::async_trait;

use crate::push::PushError;
use crate::storage::StorageError;

pub mod identity;
pub mod notification;
pub mod profile;
pub mod scope;

pub use scope::HandlerScope;

/// Errors raised by event handlers.
///
/// Any handler error makes the consumer retry the delivery.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Push error: {0}")]
    Push(#[from] PushError),
}

/// A service's closed set of consumed events.
pub trait ServiceEvent: fmt::Debug + Send + 'static {
    /// Variant name for logs.
    fn name(&self) -> &'static str;
}

/// Applies one event to the service's state.
#[async_trait]
pub trait EventHandler<E: ServiceEvent>: Send {
    async fn handle(&mut self, event: E) -> Result<(), HandlerError>;
}
