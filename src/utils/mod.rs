//! Pure utility functions.
//!
//! Process bootstrap and retry policies shared by the binaries and the bus.

pub mod bootstrap;
pub mod retry;
