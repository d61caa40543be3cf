//! Consumer behaviour: retries, dead-lettering and concurrency.

use serde::Deserialize;

/// Default number of redeliveries after a handler failure.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default cap on in-flight handlers per subscription.
pub const DEFAULT_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Redeliveries before a failing message is dead-lettered.
    pub max_retries: u32,
    /// In-flight handlers per subscription.
    pub concurrency: usize,
    /// Broker prefetch per channel. Zero means unlimited.
    pub prefetch: u16,
    /// Copy exhausted and unroutable messages to `{queue}.dlq`.
    pub dead_letter: bool,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            concurrency: DEFAULT_CONCURRENCY,
            prefetch: DEFAULT_CONCURRENCY as u16,
            dead_letter: true,
        }
    }
}
