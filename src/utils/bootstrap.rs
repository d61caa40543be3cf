//! Bootstrap utilities for courier binaries.
//!
//! Shared initialization code for all service binaries.

use std::future::Future;
#[cfg(feature = "amqp")]
use std::sync::Arc;

use backon::Retryable;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use super::retry::connection_backoff;
use crate::config::{LOG_ENV_VAR, LOG_FORMAT_ENV_VAR};
#[cfg(feature = "amqp")]
use crate::bus::{AmqpTransport, BrokerConnection, BusError};
#[cfg(feature = "amqp")]
use crate::config::BrokerConfig;

/// Initialize tracing with COURIER_LOG environment variable.
///
/// Defaults to "info" level if COURIER_LOG is not set. Set
/// COURIER_LOG_FORMAT=json for one JSON object per line.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var(LOG_FORMAT_ENV_VAR)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Connect to a service with exponential backoff retry.
///
/// # Arguments
/// * `service_name` - Human-readable name for logging (e.g., "rabbitmq")
/// * `address` - The address being connected to, for logging only
/// * `connect` - Async function that attempts to establish a connection
///
/// # Returns
/// The connection on success, or the last error after max retries.
pub async fn connect_with_retry<T, E, F, Fut>(
    service_name: &str,
    address: &str,
    connect: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let result = connect
        .retry(connection_backoff())
        .notify(|e: &E, delay| {
            warn!(
                service = %service_name,
                address = %address,
                error = %e,
                delay = ?delay,
                "Connection failed, retrying"
            );
        })
        .await;

    match &result {
        Ok(_) => info!(service = %service_name, address = %address, "Connected"),
        Err(e) => error!(
            service = %service_name,
            address = %address,
            error = %e,
            "Giving up on connection"
        ),
    }
    result
}

/// Connect to RabbitMQ with retry and open the transport.
#[cfg(feature = "amqp")]
pub async fn connect_broker(config: &BrokerConfig, prefetch: u16) -> Result<AmqpTransport, BusError> {
    let connection =
        connect_with_retry("rabbitmq", &config.address(), || BrokerConnection::connect(config))
            .await?;
    AmqpTransport::new(Arc::new(connection), prefetch).await
}

/// Resolves on Ctrl-C.
///
/// If the signal handler cannot be installed this never resolves.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => {
            error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    }
}
