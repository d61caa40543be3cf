//! Per-delivery handler scopes.
//!
//! Handlers are not shared between deliveries. The consumer calls
//! [`HandlerScope::begin`] once per message and drops the handler when the
//! message is settled, so any per-message state lives and dies with it.

use super::{EventHandler, ServiceEvent};

/// Opens a fresh handler for one delivery.
pub trait HandlerScope<E: ServiceEvent>: Send + Sync {
    fn begin(&self) -> Box<dyn EventHandler<E>>;
}

impl<E, F> HandlerScope<E> for F
where
    E: ServiceEvent,
    F: Fn() -> Box<dyn EventHandler<E>> + Send + Sync,
{
    fn begin(&self) -> Box<dyn EventHandler<E>> {
        self()
    }
}
