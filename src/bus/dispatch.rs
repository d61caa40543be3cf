//! Queue → event variant dispatch.
//!
//! A service consumes a closed set of events. Each queue it subscribes to is
//! bound to one variant of the service's event enum; the payload carries no
//! type tag, so the queue name alone decides how it is decoded.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;

use super::{BusError, Result};
use crate::events::Event;

type Decoder<E> = Box<dyn Fn(&[u8]) -> Decoded<E> + Send + Sync>;

/// Outcome of decoding one payload.
#[derive(Debug)]
pub enum Decoded<E> {
    /// Decoded into the service's event type.
    Event(E),
    /// Payload was JSON `null`.
    Empty,
    /// Payload was not valid JSON for the bound type.
    Malformed(serde_json::Error),
    /// No event type is bound to the queue.
    Unroutable,
}

impl<E> Decoded<E> {
    /// Returns true if the delivery should be acked without invoking a handler.
    ///
    /// Retrying a payload that cannot be decoded will never help.
    pub fn is_poison(&self) -> bool {
        matches!(self, Self::Empty | Self::Malformed(_))
    }
}

/// Explicit mapping from queue name to a decoder for the service's events.
pub struct DispatchTable<E> {
    routes: HashMap<String, Decoder<E>>,
}

impl<E: 'static> DispatchTable<E> {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Bind `queue` to payload type `T`, wrapped into `E` by `wrap`.
    ///
    /// Binding the same queue twice replaces the earlier decoder.
    pub fn route<T>(mut self, queue: impl Into<String>, wrap: fn(T) -> E) -> Self
    where
        T: DeserializeOwned + 'static,
    {
        let decoder = move |payload: &[u8]| match serde_json::from_slice::<Option<T>>(payload) {
            Ok(Some(message)) => Decoded::Event(wrap(message)),
            Ok(None) => Decoded::Empty,
            Err(e) => Decoded::Malformed(e),
        };
        self.routes.insert(queue.into(), Box::new(decoder));
        self
    }

    /// Bind an event type to the queue it is published on.
    pub fn route_event<T: Event>(self, wrap: fn(T) -> E) -> Self {
        self.route(T::QUEUE, wrap)
    }

    pub fn decode(&self, queue: &str, payload: &[u8]) -> Decoded<E> {
        match self.routes.get(queue) {
            Some(decoder) => decoder(payload),
            None => Decoded::Unroutable,
        }
    }

    pub fn contains(&self, queue: &str) -> bool {
        self.routes.contains_key(queue)
    }

    /// Bound queue names, sorted.
    pub fn queues(&self) -> Vec<&str> {
        let mut queues: Vec<_> = self.routes.keys().map(String::as_str).collect();
        queues.sort_unstable();
        queues
    }

    /// Check that every queue in `queues` has a binding.
    ///
    /// Returns the first unbound queue as `BusError::Unroutable`.
    pub fn validate<'a, I>(&self, queues: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for queue in queues {
            if !self.contains(queue) {
                return Err(BusError::Unroutable(queue.to_string()));
            }
        }
        Ok(())
    }
}

impl<E: 'static> Default for DispatchTable<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for DispatchTable<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut queues: Vec<_> = self.routes.keys().collect();
        queues.sort();
        f.debug_struct("DispatchTable").field("queues", &queues).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{queues, UserCreatedEvent, UserDeletedEvent};

    #[derive(Debug, PartialEq)]
    enum TestEvent {
        Created(UserCreatedEvent),
        Deleted(UserDeletedEvent),
    }

    fn table() -> DispatchTable<TestEvent> {
        DispatchTable::new()
            .route_event(TestEvent::Created)
            .route(queues::USER_DELETED, TestEvent::Deleted)
    }

    #[test]
    fn test_decode_routes_by_queue() {
        let event = UserDeletedEvent::new(9);
        let payload = serde_json::to_vec(&event).unwrap();

        match table().decode(queues::USER_DELETED, &payload) {
            Decoded::Event(TestEvent::Deleted(decoded)) => assert_eq!(decoded, event),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_same_payload_different_queue() {
        // {"Id": 1} is a valid UserCreatedEvent as well
        let payload = br#"{"Id": 1}"#;
        assert!(matches!(
            table().decode(queues::USER_CREATED, payload),
            Decoded::Event(TestEvent::Created(_))
        ));
    }

    #[test]
    fn test_decode_null_is_empty() {
        let decoded = table().decode(queues::USER_CREATED, b"null");
        assert!(matches!(decoded, Decoded::Empty));
        assert!(decoded.is_poison());
    }

    #[test]
    fn test_decode_malformed() {
        let decoded = table().decode(queues::USER_CREATED, b"{not json");
        assert!(matches!(decoded, Decoded::Malformed(_)));
        assert!(decoded.is_poison());
    }

    #[test]
    fn test_decode_unroutable() {
        let decoded = table().decode("mystery", b"{}");
        assert!(matches!(decoded, Decoded::Unroutable));
        assert!(!decoded.is_poison());
    }

    #[test]
    fn test_validate() {
        let table = table();
        assert!(table
            .validate([queues::USER_CREATED, queues::USER_DELETED])
            .is_ok());

        match table.validate([queues::USER_CREATED, "mystery"]) {
            Err(BusError::Unroutable(queue)) => assert_eq!(queue, "mystery"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_queues_sorted() {
        assert_eq!(
            table().queues(),
            vec![queues::USER_CREATED, queues::USER_DELETED]
        );
    }
}
