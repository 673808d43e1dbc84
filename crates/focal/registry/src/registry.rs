//! Object registry trait
//!
//! The ObjectRegistry stores manageable objects by name and dispatches
//! attribute, operation and notification calls to them.

use crate::error::{RegistryError, Result};
use crate::object::{ManagedObject, NotificationListener};
use async_trait::async_trait;
use focal_types::{
    Attribute, AttributeList, AttributeValue, NotificationFilter, ObjectInfo, ObjectName,
    ObjectNamePattern, RegistrationEvent, SubscriptionId, TypedArgument,
};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Domain reserved for the registry itself; objects may not be registered in it
pub const RESERVED_DOMAIN: &str = "registry";

/// Registry of manageable objects.
///
/// `register` and `unregister` are atomic per name. Registration changes are
/// published on the channel returned by [`ObjectRegistry::subscribe_registrations`].
#[async_trait]
pub trait ObjectRegistry: Send + Sync {
    /// Register an object under a name
    async fn register(&self, name: ObjectName, object: Arc<dyn ManagedObject>) -> Result<()>;

    /// Remove the object registered under a name
    async fn unregister(&self, name: &ObjectName) -> Result<()>;

    /// Names matching a pattern, or every name when no pattern is given
    async fn query_names(&self, pattern: Option<&ObjectNamePattern>) -> Result<Vec<ObjectName>>;

    /// Check whether a name is registered
    async fn is_registered(&self, name: &ObjectName) -> bool;

    /// Number of registered objects
    async fn object_count(&self) -> usize;

    /// Resolve the object registered under a name
    async fn lookup(&self, name: &ObjectName) -> Result<Arc<dyn ManagedObject>>;

    /// Subscribe to registration changes
    fn subscribe_registrations(&self) -> broadcast::Receiver<RegistrationEvent>;

    async fn info(&self, name: &ObjectName) -> Result<ObjectInfo> {
        Ok(self.lookup(name).await?.info().await?)
    }

    async fn get_attribute(&self, name: &ObjectName, attribute: &str) -> Result<AttributeValue> {
        Ok(self.lookup(name).await?.get_attribute(attribute).await?)
    }

    async fn set_attribute(&self, name: &ObjectName, attribute: Attribute) -> Result<()> {
        Ok(self.lookup(name).await?.set_attribute(attribute).await?)
    }

    async fn get_attributes(
        &self,
        name: &ObjectName,
        attributes: &[String],
    ) -> Result<AttributeList> {
        Ok(self.lookup(name).await?.get_attributes(attributes).await?)
    }

    async fn set_attributes(
        &self,
        name: &ObjectName,
        attributes: AttributeList,
    ) -> Result<AttributeList> {
        Ok(self.lookup(name).await?.set_attributes(attributes).await?)
    }

    async fn invoke(
        &self,
        name: &ObjectName,
        operation: &str,
        arguments: Vec<TypedArgument>,
    ) -> Result<AttributeValue> {
        Ok(self.lookup(name).await?.invoke(operation, arguments).await?)
    }

    async fn add_notification_listener(
        &self,
        name: &ObjectName,
        listener: Arc<dyn NotificationListener>,
        filter: Option<NotificationFilter>,
        handback: Option<String>,
    ) -> Result<SubscriptionId> {
        Ok(self
            .lookup(name)
            .await?
            .add_notification_listener(listener, filter, handback)
            .await?)
    }

    async fn remove_notification_listener(
        &self,
        name: &ObjectName,
        subscription: SubscriptionId,
    ) -> Result<()> {
        Ok(self
            .lookup(name)
            .await?
            .remove_notification_listener(subscription)
            .await?)
    }
}

/// Reject names in the registry's reserved domain
pub(crate) fn check_compliant(name: &ObjectName) -> Result<()> {
    if name.domain() == RESERVED_DOMAIN {
        return Err(RegistryError::NotCompliant(format!(
            "domain '{}' is reserved: {}",
            RESERVED_DOMAIN, name
        )));
    }
    Ok(())
}
