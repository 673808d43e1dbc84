//! The manageable object contract
//!
//! A [`ManagedObject`] exposes typed attributes, invokable operations and a
//! notification stream. Registries dispatch to objects through this trait
//! only, so a local object and a proxy for a remote one are interchangeable.

use crate::error::{ObjectError, ObjectResult};
use async_trait::async_trait;
use dashmap::DashMap;
use focal_types::{
    Attribute, AttributeList, AttributeValue, Notification, NotificationFilter, NotificationInfo,
    ObjectInfo, SubscriptionId, TypedArgument,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Receiver of object notifications.
///
/// Called on the emitter's thread; implementations must not block.
pub trait NotificationListener: Send + Sync {
    fn handle_notification(&self, notification: &Notification, handback: Option<&str>);
}

/// A manageable object
#[async_trait]
pub trait ManagedObject: Send + Sync {
    /// Describe the attributes, operations and notifications of this object
    async fn info(&self) -> ObjectResult<ObjectInfo>;

    /// Read one attribute
    async fn get_attribute(&self, attribute: &str) -> ObjectResult<AttributeValue>;

    /// Write one attribute
    async fn set_attribute(&self, attribute: Attribute) -> ObjectResult<()>;

    /// Read several attributes.
    ///
    /// Attributes that cannot be read are left out of the result.
    async fn get_attributes(&self, attributes: &[String]) -> ObjectResult<AttributeList> {
        let mut values = AttributeList::new();
        for name in attributes {
            if let Ok(value) = self.get_attribute(name).await {
                values.push(Attribute::new(name.clone(), value));
            }
        }
        Ok(values)
    }

    /// Write several attributes, returning the ones that were applied
    async fn set_attributes(&self, attributes: AttributeList) -> ObjectResult<AttributeList> {
        let mut applied = AttributeList::new();
        for attribute in attributes {
            if self.set_attribute(attribute.clone()).await.is_ok() {
                applied.push(attribute);
            }
        }
        Ok(applied)
    }

    /// Invoke an operation by name
    async fn invoke(
        &self,
        operation: &str,
        arguments: Vec<TypedArgument>,
    ) -> ObjectResult<AttributeValue>;

    /// Notifications this object may emit
    async fn notification_info(&self) -> ObjectResult<Vec<NotificationInfo>> {
        Ok(self.info().await?.notifications)
    }

    async fn add_notification_listener(
        &self,
        _listener: Arc<dyn NotificationListener>,
        _filter: Option<NotificationFilter>,
        _handback: Option<String>,
    ) -> ObjectResult<SubscriptionId> {
        Err(ObjectError::NotificationsUnsupported)
    }

    async fn remove_notification_listener(
        &self,
        _subscription: SubscriptionId,
    ) -> ObjectResult<()> {
        Err(ObjectError::NotificationsUnsupported)
    }

    /// Lifecycle hook run once the object has been removed from a registry
    async fn on_unregistered(&self) {}
}

struct ListenerEntry {
    listener: Arc<dyn NotificationListener>,
    filter: Option<NotificationFilter>,
    handback: Option<String>,
}

/// Listener bookkeeping for objects that emit notifications
#[derive(Default)]
pub struct NotificationBroadcaster {
    listeners: DashMap<SubscriptionId, ListenerEntry>,
    sequence: AtomicU64,
}

impl NotificationBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(
        &self,
        listener: Arc<dyn NotificationListener>,
        filter: Option<NotificationFilter>,
        handback: Option<String>,
    ) -> SubscriptionId {
        let id = SubscriptionId::generate();
        self.listeners.insert(
            id,
            ListenerEntry {
                listener,
                filter,
                handback,
            },
        );
        id
    }

    pub fn remove_listener(&self, subscription: SubscriptionId) -> ObjectResult<()> {
        self.listeners
            .remove(&subscription)
            .map(|_| ())
            .ok_or(ObjectError::ListenerNotFound(subscription))
    }

    /// Next sequence number for an outgoing notification
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Deliver a notification to every listener whose filter accepts it
    pub fn emit(&self, notification: &Notification) {
        // Collect first so no map guard is held while listeners run
        let targets: Vec<(Arc<dyn NotificationListener>, Option<String>)> = self
            .listeners
            .iter()
            .filter(|entry| {
                entry
                    .filter
                    .as_ref()
                    .map_or(true, |f| f.is_enabled(notification))
            })
            .map(|entry| (entry.listener.clone(), entry.handback.clone()))
            .collect();

        for (listener, handback) in targets {
            listener.handle_notification(notification, handback.as_deref());
        }
    }
}
