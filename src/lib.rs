//! Courier - event-driven replica synchronization
//!
//! Services that own user and message data publish integration events to
//! RabbitMQ; the services that need a copy consume them and keep local
//! replicas current. Lookups across services are answered asynchronously by
//! pushing the result to the requesting client's live sessions.

pub mod bus;
pub mod config;
pub mod dlq;
pub mod events;
pub mod listener;
pub mod push;
pub mod services;
pub mod storage;
pub mod utils;
