//! Retry utilities: backoff builders and retryable error classification.
//!
//! Uses `backon` for exponential backoff with jitter.

use std::time::Duration;

use backon::ExponentialBuilder;

use crate::bus::BusError;

/// Backoff for publishing to the broker.
///
/// - Min delay: 50ms
/// - Max delay: 2s
/// - Max attempts: 5
/// - Jitter enabled
pub fn publish_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(50))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(5)
        .with_jitter()
}

/// Backoff for broker connection retries at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
/// - Jitter enabled
pub fn connection_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}

/// Backoff with no delay, for tests.
pub fn immediate_backoff(max_times: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::ZERO)
        .with_max_delay(Duration::ZERO)
        .with_max_times(max_times)
}

/// Determines if a bus error is worth retrying.
///
/// Retryable: broker-side failures (connection, publish, subscribe, settle).
///
/// Non-retryable: serialization, configuration and unroutable queues.
/// These fail the same way on every attempt.
pub fn is_retryable(error: &BusError) -> bool {
    error.is_transient()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&BusError::Publish("channel closed".into())));
        assert!(is_retryable(&BusError::Connection("refused".into())));
        assert!(!is_retryable(&BusError::Config("bad port".into())));
        assert!(!is_retryable(&BusError::Unroutable("q".into())));
    }
}
