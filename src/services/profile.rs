//! Profile service consumer.
//!
//! Keeps the profile-side replica of users created by identity, and answers
//! `get-user-event` lookups by pushing the resolved records to the requester.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{EventHandler, HandlerError, HandlerScope, ServiceEvent};
use crate::bus::{Consumer, DispatchTable, Transport};
use crate::config::ConsumerConfig;
use crate::events::{queues, GetUserEvent, UserCreatedEvent};
use crate::listener::BackgroundListener;
use crate::push::{to_payload, PushChannel, PushTarget, RECEIVE_USERS};
use crate::storage::{ReplicaStore, Stores, UserRecord};

/// Service name used for consumer tags and logs.
pub const SERVICE: &str = "profile";

/// Queues the profile service consumes.
pub const QUEUES: [&str; 2] = [queues::USER_CREATED, queues::GET_USER];

/// Events consumed by the profile service.
#[derive(Debug)]
pub enum ProfileEvent {
    UserCreated(UserCreatedEvent),
    GetUser(GetUserEvent),
}

impl ServiceEvent for ProfileEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::UserCreated(_) => "UserCreated",
            Self::GetUser(_) => "GetUser",
        }
    }
}

pub fn dispatch_table() -> DispatchTable<ProfileEvent> {
    DispatchTable::new()
        .route_event(ProfileEvent::UserCreated)
        .route_event(ProfileEvent::GetUser)
}

pub struct ProfileHandler {
    users: Arc<dyn ReplicaStore<UserRecord>>,
    push: Arc<dyn PushChannel>,
}

impl ProfileHandler {
    pub fn new(users: Arc<dyn ReplicaStore<UserRecord>>, push: Arc<dyn PushChannel>) -> Self {
        Self { users, push }
    }

    async fn user_created(&self, event: UserCreatedEvent) -> Result<(), HandlerError> {
        let user_name = event
            .user_name
            .unwrap_or_else(|| UserRecord::UNKNOWN_USER_NAME.to_string());

        self.users.add(UserRecord::new(event.id, user_name)).await?;
        info!(user_id = event.id, "User replica stored");
        Ok(())
    }

    async fn get_user(&self, event: GetUserEvent) -> Result<(), HandlerError> {
        let mut found = Vec::with_capacity(event.ids.len());
        for id in &event.ids {
            match self.users.find(*id).await? {
                Some(user) => found.push(user),
                None => debug!(user_id = id, "Requested user not found, skipping"),
            }
        }

        let target = PushTarget::from(event.user_id);
        let delivered = self
            .push
            .send(&target, RECEIVE_USERS, to_payload(&found)?)
            .await?;

        debug!(
            requester = event.user_id,
            requested = event.ids.len(),
            resolved = found.len(),
            delivered = ?delivered,
            "Answered user lookup"
        );
        Ok(())
    }
}

#[async_trait]
impl EventHandler<ProfileEvent> for ProfileHandler {
    async fn handle(&mut self, event: ProfileEvent) -> Result<(), HandlerError> {
        match event {
            ProfileEvent::UserCreated(event) => self.user_created(event).await,
            ProfileEvent::GetUser(event) => self.get_user(event).await,
        }
    }
}

/// Opens a [`ProfileHandler`] per delivery.
#[derive(Clone)]
pub struct ProfileScope {
    users: Arc<dyn ReplicaStore<UserRecord>>,
    push: Arc<dyn PushChannel>,
}

impl ProfileScope {
    pub fn new(stores: &Stores, push: Arc<dyn PushChannel>) -> Self {
        Self {
            users: stores.users.clone(),
            push,
        }
    }
}

impl HandlerScope<ProfileEvent> for ProfileScope {
    fn begin(&self) -> Box<dyn EventHandler<ProfileEvent>> {
        Box::new(ProfileHandler::new(self.users.clone(), self.push.clone()))
    }
}

/// Listener for every profile queue.
pub fn listener(
    transport: Arc<dyn Transport>,
    stores: &Stores,
    push: Arc<dyn PushChannel>,
    config: &ConsumerConfig,
) -> BackgroundListener<ProfileEvent> {
    let consumer = Consumer::new(
        SERVICE,
        transport,
        dispatch_table(),
        Arc::new(ProfileScope::new(stores, push)),
    )
    .with_config(config.clone());

    BackgroundListener::new(SERVICE, consumer, QUEUES)
}
