//! Local stand-in for a remote manageable object
//!
//! A [`ProxyObject`] forwards every call to one remote object over one
//! management connection. Values and remote failures pass through untouched;
//! transport failures surface as [`ObjectError::RemoteUnavailable`].

use crate::connection::{Connector, ManagementConnection};
use crate::error::{ConnectionError, ConnectionResult};
use async_trait::async_trait;
use focal_registry::{ManagedObject, NotificationListener, ObjectError, ObjectResult};
use focal_types::{
    Attribute, AttributeList, AttributeValue, NotificationFilter, NotificationInfo, ObjectInfo,
    ObjectName, SubscriptionId, TypedArgument,
};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ownership {
    /// The connection belongs to a mirror and outlives this proxy
    Shared,
    /// The proxy closes the connection when it is unregistered
    Owned,
}

/// Forwarding proxy for one remote object
pub struct ProxyObject {
    remote: ObjectName,
    connection: Arc<dyn ManagementConnection>,
    ownership: Ownership,
}

impl ProxyObject {
    /// Proxy over a connection owned by someone else
    pub fn shared(remote: ObjectName, connection: Arc<dyn ManagementConnection>) -> Self {
        Self {
            remote,
            connection,
            ownership: Ownership::Shared,
        }
    }

    /// Proxy that takes ownership of `connection`
    pub fn owning(remote: ObjectName, connection: Arc<dyn ManagementConnection>) -> Self {
        Self {
            remote,
            connection,
            ownership: Ownership::Owned,
        }
    }

    /// Open a dedicated connection to `address` and proxy `remote` over it
    pub async fn connect_owned(
        connector: &dyn Connector,
        address: &str,
        remote: ObjectName,
    ) -> ConnectionResult<Self> {
        let connection = connector.connect(address).await?;
        Ok(Self::owning(remote, connection))
    }

    /// Name of the forwarded object in its own registry
    pub fn remote_name(&self) -> &ObjectName {
        &self.remote
    }

    pub fn owns_connection(&self) -> bool {
        self.ownership == Ownership::Owned
    }

    fn forward_error(&self, error: ConnectionError) -> ObjectError {
        match error {
            ConnectionError::Object(e) => e,
            other => ObjectError::remote_unavailable(self.remote.clone(), other),
        }
    }
}

#[async_trait]
impl ManagedObject for ProxyObject {
    async fn info(&self) -> ObjectResult<ObjectInfo> {
        self.connection
            .object_info(&self.remote)
            .await
            .map_err(|e| self.forward_error(e))
    }

    async fn get_attribute(&self, attribute: &str) -> ObjectResult<AttributeValue> {
        self.connection
            .get_attribute(&self.remote, attribute)
            .await
            .map_err(|e| self.forward_error(e))
    }

    async fn set_attribute(&self, attribute: Attribute) -> ObjectResult<()> {
        self.connection
            .set_attribute(&self.remote, attribute)
            .await
            .map_err(|e| self.forward_error(e))
    }

    async fn get_attributes(&self, attributes: &[String]) -> ObjectResult<AttributeList> {
        self.connection
            .get_attributes(&self.remote, attributes)
            .await
            .map_err(|e| self.forward_error(e))
    }

    async fn set_attributes(&self, attributes: AttributeList) -> ObjectResult<AttributeList> {
        self.connection
            .set_attributes(&self.remote, attributes)
            .await
            .map_err(|e| self.forward_error(e))
    }

    async fn invoke(
        &self,
        operation: &str,
        arguments: Vec<TypedArgument>,
    ) -> ObjectResult<AttributeValue> {
        self.connection
            .invoke(&self.remote, operation, arguments)
            .await
            .map_err(|e| self.forward_error(e))
    }

    async fn notification_info(&self) -> ObjectResult<Vec<NotificationInfo>> {
        Ok(self.info().await?.notifications)
    }

    async fn add_notification_listener(
        &self,
        listener: Arc<dyn NotificationListener>,
        filter: Option<NotificationFilter>,
        handback: Option<String>,
    ) -> ObjectResult<SubscriptionId> {
        self.connection
            .add_notification_listener(&self.remote, listener, filter, handback)
            .await
            .map_err(|e| self.forward_error(e))
    }

    async fn remove_notification_listener(&self, subscription: SubscriptionId) -> ObjectResult<()> {
        self.connection
            .remove_notification_listener(&self.remote, subscription)
            .await
            .map_err(|e| self.forward_error(e))
    }

    async fn on_unregistered(&self) {
        if self.ownership == Ownership::Owned {
            debug!(remote = %self.remote, "Closing proxy-owned connection");
            self.connection.close().await;
        }
    }
}
