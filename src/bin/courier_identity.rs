//! courier-identity: identity service listener
//!
//! Mirrors email and password changes made through the profile service and
//! removes credentials of deleted users.
//!
//! ## Queues
//! - `user-updated`: update the stored credentials
//! - `user-deleted`: remove the stored credentials
//!
//! ## Configuration
//! - COURIER_CONFIG: path to a YAML config file (default: courier.yaml)
//! - RABBIT_MQ_HOST / _PORT / _USER / _PASSWORD / _VHOST: broker settings
//! - COURIER_LOG: log filter (default: info)

use std::sync::Arc;

use tracing::{error, info};

use courier::bus::Transport;
use courier::config::Config;
use courier::services::identity;
use courier::storage::init_storage;
use courier::utils::bootstrap::{connect_broker, init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None).map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!("Starting courier-identity");

    let transport = Arc::new(connect_broker(&config.broker, config.consumer.prefetch).await?);
    let stores = init_storage(&config.storage).await?;

    let listener = identity::listener(
        transport.clone() as Arc<dyn Transport>,
        &stores,
        &config.consumer,
    );
    listener.run(shutdown_signal()).await?;

    transport.close().await;
    info!("courier-identity stopped");
    Ok(())
}
