//! Identity service consumer.
//!
//! Mirrors login fields edited through the profile service and removes
//! credentials of deleted users. Events for unknown users are logged and
//! acknowledged; they are not an error.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::{EventHandler, HandlerError, HandlerScope, ServiceEvent};
use crate::bus::{Consumer, DispatchTable, Transport};
use crate::config::ConsumerConfig;
use crate::events::{queues, UserDeletedEvent, UserUpdatedEvent};
use crate::listener::BackgroundListener;
use crate::storage::{CredentialRecord, ReplicaStore, StorageError, Stores};

pub const SERVICE: &str = "identity";

/// Queues the identity service consumes.
pub const QUEUES: [&str; 2] = [queues::USER_UPDATED, queues::USER_DELETED];

/// Events consumed by the identity service.
#[derive(Debug)]
pub enum IdentityEvent {
    UserUpdated(UserUpdatedEvent),
    UserDeleted(UserDeletedEvent),
}

impl ServiceEvent for IdentityEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::UserUpdated(_) => "UserUpdated",
            Self::UserDeleted(_) => "UserDeleted",
        }
    }
}

pub fn dispatch_table() -> DispatchTable<IdentityEvent> {
    DispatchTable::new()
        .route_event(IdentityEvent::UserUpdated)
        .route_event(IdentityEvent::UserDeleted)
}

pub struct IdentityHandler {
    credentials: Arc<dyn ReplicaStore<CredentialRecord>>,
}

impl IdentityHandler {
    pub fn new(credentials: Arc<dyn ReplicaStore<CredentialRecord>>) -> Self {
        Self { credentials }
    }

    async fn user_updated(&self, event: UserUpdatedEvent) -> Result<(), HandlerError> {
        let Some(mut credential) = self.credentials.find(event.id).await? else {
            warn!(user_id = event.id, "User not found, update ignored");
            return Ok(());
        };

        if let Some(email) = event.email {
            credential.email = email;
        }
        if let Some(password) = event.password {
            credential.password = password;
        }

        match self.credentials.update(credential).await {
            Ok(()) => {
                info!(user_id = event.id, "Credentials updated");
                Ok(())
            }
            // Removed by a concurrent delete after the find.
            Err(StorageError::NotFound { .. }) => {
                warn!(user_id = event.id, "User removed before update, update ignored");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn user_deleted(&self, event: UserDeletedEvent) -> Result<(), HandlerError> {
        if self.credentials.remove(event.id).await? {
            info!(user_id = event.id, "Credentials removed");
        } else {
            warn!(user_id = event.id, "User not found, delete ignored");
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler<IdentityEvent> for IdentityHandler {
    async fn handle(&mut self, event: IdentityEvent) -> Result<(), HandlerError> {
        match event {
            IdentityEvent::UserUpdated(event) => self.user_updated(event).await,
            IdentityEvent::UserDeleted(event) => self.user_deleted(event).await,
        }
    }
}

#[derive(Clone)]
pub struct IdentityScope {
    credentials: Arc<dyn ReplicaStore<CredentialRecord>>,
}

impl IdentityScope {
    pub fn new(stores: &Stores) -> Self {
        Self {
            credentials: stores.credentials.clone(),
        }
    }
}

impl HandlerScope<IdentityEvent> for IdentityScope {
    fn begin(&self) -> Box<dyn EventHandler<IdentityEvent>> {
        Box::new(IdentityHandler::new(self.credentials.clone()))
    }
}

/// Listener for every identity queue.
pub fn listener(
    transport: Arc<dyn Transport>,
    stores: &Stores,
    config: &ConsumerConfig,
) -> BackgroundListener<IdentityEvent> {
    let consumer = Consumer::new(
        SERVICE,
        transport,
        dispatch_table(),
        Arc::new(IdentityScope::new(stores)),
    )
    .with_config(config.clone());

    BackgroundListener::new(SERVICE, consumer, QUEUES)
}
