//! courier-profile: profile service listener
//!
//! Keeps the profile-side user replica in step with identity and answers
//! user lookups from messaging by pushing the result to the requester.
//!
//! ## Queues
//! - `user-created`: store a user replica
//! - `get-user-event`: push the resolved users as `ReceiveUsers`
//!
//! ## Configuration
//! - COURIER_CONFIG: path to a YAML config file (default: courier.yaml)
//! - RABBIT_MQ_HOST / _PORT / _USER / _PASSWORD / _VHOST: broker settings
//! - COURIER_LOG: log filter (default: info)

use std::sync::Arc;

use tracing::{error, info};

use courier::bus::Transport;
use courier::config::Config;
use courier::push::PushHub;
use courier::services::profile;
use courier::storage::init_storage;
use courier::utils::bootstrap::{connect_broker, init_tracing, shutdown_signal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = Config::load(None).map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!("Starting courier-profile");

    let transport = Arc::new(connect_broker(&config.broker, config.consumer.prefetch).await?);
    let stores = init_storage(&config.storage).await?;
    let hub = PushHub::new();

    let listener = profile::listener(
        transport.clone() as Arc<dyn Transport>,
        &stores,
        Arc::new(hub),
        &config.consumer,
    );
    listener.run(shutdown_signal()).await?;

    transport.close().await;
    info!("courier-profile stopped");
    Ok(())
}
