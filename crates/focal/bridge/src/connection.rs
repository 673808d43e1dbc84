//! Management connections to remote registries
//!
//! A [`Connector`] opens a [`ManagementConnection`] to a connection address.
//! The connection forwards object calls to the remote registry, relays its
//! registration changes, and reports permanent transport loss exactly once
//! through [`ConnectionFailureListener`].
//!
//! [`InProcessConnector`] connects to registries published in the same
//! process. It backs the tests, the daemon's endpoint simulation and
//! embedded deployments.

use crate::error::{ConnectionError, ConnectionResult};
use async_trait::async_trait;
use dashmap::DashMap;
use focal_registry::{NotificationListener, ObjectRegistry};
use focal_types::{
    Attribute, AttributeList, AttributeValue, NotificationFilter, ObjectInfo, ObjectName,
    ObjectNamePattern, RegistrationEvent, SubscriptionId, TypedArgument,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Receiver of a remote registry's registration changes
pub trait RegistrationListener: Send + Sync {
    fn handle_registration(&self, event: &RegistrationEvent, handback: Option<&str>);
}

/// Receiver of the out-of-band permanent failure signal of a connection
pub trait ConnectionFailureListener: Send + Sync {
    fn connection_failed(&self, address: &str, error: &ConnectionError);
}

/// Factory for management connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to the registry at `address`.
    ///
    /// Timeouts are the connector's business; callers do not retry.
    async fn connect(&self, address: &str) -> ConnectionResult<Arc<dyn ManagementConnection>>;
}

/// An open connection to one remote registry
#[async_trait]
pub trait ManagementConnection: Send + Sync {
    /// Address this connection was opened to
    fn address(&self) -> &str;

    /// Whether calls can still be made on this connection
    fn is_open(&self) -> bool;

    /// Names of the remote objects, optionally filtered by a pattern
    async fn query_names(&self, pattern: Option<&ObjectNamePattern>)
        -> ConnectionResult<Vec<ObjectName>>;

    async fn object_info(&self, name: &ObjectName) -> ConnectionResult<ObjectInfo>;

    async fn get_attribute(&self, name: &ObjectName, attribute: &str)
        -> ConnectionResult<AttributeValue>;

    async fn set_attribute(&self, name: &ObjectName, attribute: Attribute) -> ConnectionResult<()>;

    async fn get_attributes(
        &self,
        name: &ObjectName,
        attributes: &[String],
    ) -> ConnectionResult<AttributeList>;

    async fn set_attributes(
        &self,
        name: &ObjectName,
        attributes: AttributeList,
    ) -> ConnectionResult<AttributeList>;

    async fn invoke(
        &self,
        name: &ObjectName,
        operation: &str,
        arguments: Vec<TypedArgument>,
    ) -> ConnectionResult<AttributeValue>;

    async fn add_notification_listener(
        &self,
        name: &ObjectName,
        listener: Arc<dyn NotificationListener>,
        filter: Option<NotificationFilter>,
        handback: Option<String>,
    ) -> ConnectionResult<SubscriptionId>;

    async fn remove_notification_listener(
        &self,
        name: &ObjectName,
        subscription: SubscriptionId,
    ) -> ConnectionResult<()>;

    /// Subscribe to the remote registry's registration channel.
    ///
    /// `handback` is passed back unchanged with every event.
    async fn subscribe_registration_changes(
        &self,
        listener: Arc<dyn RegistrationListener>,
        handback: Option<String>,
    ) -> ConnectionResult<SubscriptionId>;

    /// Register for the permanent failure signal.
    ///
    /// Each listener is called at most once. Registering after the
    /// connection has failed calls the listener immediately.
    fn on_failure(&self, listener: Arc<dyn ConnectionFailureListener>);

    /// Release the connection. Idempotent.
    async fn close(&self);
}

#[derive(Debug, Clone)]
enum ConnectionState {
    Open,
    Failed(String),
    Closed,
}

/// Connection to a registry living in the same process
pub struct InProcessConnection {
    address: String,
    registry: Arc<dyn ObjectRegistry>,
    state: Mutex<ConnectionState>,
    failed: AtomicBool,
    failure_listeners: Mutex<Vec<Arc<dyn ConnectionFailureListener>>>,
    forwarders: DashMap<SubscriptionId, JoinHandle<()>>,
}

impl InProcessConnection {
    pub fn new(address: impl Into<String>, registry: Arc<dyn ObjectRegistry>) -> Self {
        Self {
            address: address.into(),
            registry,
            state: Mutex::new(ConnectionState::Open),
            failed: AtomicBool::new(false),
            failure_listeners: Mutex::new(Vec::new()),
            forwarders: DashMap::new(),
        }
    }

    /// Simulate permanent loss of the transport.
    ///
    /// Later calls fail with `Transport`; failure listeners fire once.
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        {
            let mut state = lock(&self.state);
            if matches!(*state, ConnectionState::Closed) {
                return;
            }
            *state = ConnectionState::Failed(reason.clone());
        }
        self.stop_forwarders();

        let listeners: Vec<_> = {
            let mut listeners = lock(&self.failure_listeners);
            if self.failed.swap(true, Ordering::SeqCst) {
                return;
            }
            listeners.drain(..).collect()
        };
        info!(address = %self.address, reason = %reason, "Connection failed");

        let error = ConnectionError::transport(&self.address, reason);
        for listener in listeners {
            listener.connection_failed(&self.address, &error);
        }
    }

    /// Number of live registration subscriptions
    pub fn subscription_count(&self) -> usize {
        self.forwarders.len()
    }

    fn check_open(&self) -> ConnectionResult<()> {
        match &*lock(&self.state) {
            ConnectionState::Open => Ok(()),
            ConnectionState::Failed(reason) => {
                Err(ConnectionError::transport(&self.address, reason.clone()))
            }
            ConnectionState::Closed => Err(ConnectionError::Closed(self.address.clone())),
        }
    }

    fn stop_forwarders(&self) {
        let ids: Vec<SubscriptionId> = self.forwarders.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, handle)) = self.forwarders.remove(&id) {
                handle.abort();
            }
        }
    }
}

#[async_trait]
impl ManagementConnection for InProcessConnection {
    fn address(&self) -> &str {
        &self.address
    }

    fn is_open(&self) -> bool {
        matches!(*lock(&self.state), ConnectionState::Open)
    }

    async fn query_names(
        &self,
        pattern: Option<&ObjectNamePattern>,
    ) -> ConnectionResult<Vec<ObjectName>> {
        self.check_open()?;
        self.registry
            .query_names(pattern)
            .await
            .map_err(ConnectionError::from_registry)
    }

    async fn object_info(&self, name: &ObjectName) -> ConnectionResult<ObjectInfo> {
        self.check_open()?;
        self.registry
            .info(name)
            .await
            .map_err(ConnectionError::from_registry)
    }

    async fn get_attribute(
        &self,
        name: &ObjectName,
        attribute: &str,
    ) -> ConnectionResult<AttributeValue> {
        self.check_open()?;
        self.registry
            .get_attribute(name, attribute)
            .await
            .map_err(ConnectionError::from_registry)
    }

    async fn set_attribute(&self, name: &ObjectName, attribute: Attribute) -> ConnectionResult<()> {
        self.check_open()?;
        self.registry
            .set_attribute(name, attribute)
            .await
            .map_err(ConnectionError::from_registry)
    }

    async fn get_attributes(
        &self,
        name: &ObjectName,
        attributes: &[String],
    ) -> ConnectionResult<AttributeList> {
        self.check_open()?;
        self.registry
            .get_attributes(name, attributes)
            .await
            .map_err(ConnectionError::from_registry)
    }

    async fn set_attributes(
        &self,
        name: &ObjectName,
        attributes: AttributeList,
    ) -> ConnectionResult<AttributeList> {
        self.check_open()?;
        self.registry
            .set_attributes(name, attributes)
            .await
            .map_err(ConnectionError::from_registry)
    }

    async fn invoke(
        &self,
        name: &ObjectName,
        operation: &str,
        arguments: Vec<TypedArgument>,
    ) -> ConnectionResult<AttributeValue> {
        self.check_open()?;
        self.registry
            .invoke(name, operation, arguments)
            .await
            .map_err(ConnectionError::from_registry)
    }

    async fn add_notification_listener(
        &self,
        name: &ObjectName,
        listener: Arc<dyn NotificationListener>,
        filter: Option<NotificationFilter>,
        handback: Option<String>,
    ) -> ConnectionResult<SubscriptionId> {
        self.check_open()?;
        self.registry
            .add_notification_listener(name, listener, filter, handback)
            .await
            .map_err(ConnectionError::from_registry)
    }

    async fn remove_notification_listener(
        &self,
        name: &ObjectName,
        subscription: SubscriptionId,
    ) -> ConnectionResult<()> {
        self.check_open()?;
        self.registry
            .remove_notification_listener(name, subscription)
            .await
            .map_err(ConnectionError::from_registry)
    }

    async fn subscribe_registration_changes(
        &self,
        listener: Arc<dyn RegistrationListener>,
        handback: Option<String>,
    ) -> ConnectionResult<SubscriptionId> {
        self.check_open()?;

        let id = SubscriptionId::generate();
        let mut events = self.registry.subscribe_registrations();
        let address = self.address.clone();
        let handle = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => listener.handle_registration(&event, handback.as_deref()),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(address = %address, skipped, "Registration events dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        self.forwarders.insert(id, handle);
        Ok(id)
    }

    fn on_failure(&self, listener: Arc<dyn ConnectionFailureListener>) {
        {
            let mut listeners = lock(&self.failure_listeners);
            if !self.failed.load(Ordering::SeqCst) {
                listeners.push(listener);
                return;
            }
        }
        let reason = match &*lock(&self.state) {
            ConnectionState::Failed(reason) => reason.clone(),
            _ => "connection lost".to_string(),
        };
        listener.connection_failed(
            &self.address,
            &ConnectionError::transport(&self.address, reason),
        );
    }

    async fn close(&self) {
        {
            let mut state = lock(&self.state);
            if matches!(*state, ConnectionState::Closed) {
                return;
            }
            *state = ConnectionState::Closed;
        }
        self.stop_forwarders();
        lock(&self.failure_listeners).clear();
        debug!(address = %self.address, "Connection closed");
    }
}

impl Drop for InProcessConnection {
    fn drop(&mut self) {
        self.stop_forwarders();
    }
}

/// Connector for registries published in the same process
#[derive(Default)]
pub struct InProcessConnector {
    registries: DashMap<String, Arc<dyn ObjectRegistry>>,
    unreachable: DashMap<String, String>,
    connections: DashMap<String, Vec<Weak<InProcessConnection>>>,
}

impl InProcessConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a registry reachable under `address`
    pub fn publish(&self, address: impl Into<String>, registry: Arc<dyn ObjectRegistry>) {
        self.registries.insert(address.into(), registry);
    }

    /// Stop accepting new connections to `address`
    pub fn unpublish(&self, address: &str) {
        self.registries.remove(address);
    }

    /// Refuse new connections to `address` with a `Connect` error
    pub fn set_unreachable(&self, address: impl Into<String>, reason: impl Into<String>) {
        self.unreachable.insert(address.into(), reason.into());
    }

    pub fn set_reachable(&self, address: &str) {
        self.unreachable.remove(address);
    }

    /// Fail every live connection to `address`
    pub fn fail(&self, address: &str, reason: &str) {
        let live: Vec<Arc<InProcessConnection>> = self
            .connections
            .get(address)
            .map(|conns| conns.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default();
        for connection in live {
            connection.fail(reason);
        }
    }

    /// Live connections opened to `address`
    pub fn connections_to(&self, address: &str) -> Vec<Arc<InProcessConnection>> {
        self.connections
            .get(address)
            .map(|conns| conns.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Connector for InProcessConnector {
    async fn connect(&self, address: &str) -> ConnectionResult<Arc<dyn ManagementConnection>> {
        if let Some(reason) = self.unreachable.get(address) {
            return Err(ConnectionError::connect(address, reason.value().clone()));
        }
        let registry = self
            .registries
            .get(address)
            .map(|r| r.value().clone())
            .ok_or_else(|| ConnectionError::connect(address, "no registry published"))?;

        let connection = Arc::new(InProcessConnection::new(address, registry));
        let mut conns = self.connections.entry(address.to_string()).or_default();
        conns.retain(|weak| weak.strong_count() > 0);
        conns.push(Arc::downgrade(&connection));
        drop(conns);

        debug!(address = %address, "Connection opened");
        Ok(connection)
    }
}

/// Lock a std mutex, recovering the data if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
