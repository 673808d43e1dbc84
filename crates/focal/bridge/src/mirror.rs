//! Per-endpoint mirroring
//!
//! A [`RemoteMirror`] keeps the local registry in step with one remote
//! registry. It runs as its own task and owns all of its state: discovery,
//! remote registration changes and connection failure are delivered to it as
//! messages and applied one at a time, so a late `Added` can never resurrect
//! a proxy after teardown.
//!
//! ```text
//! Connecting ──connect ok──▶ Synced ──failure──▶ Failed
//!     │                        │                   │
//!     └─connect error─▶ Abandoned                  │
//!                              └────teardown───────┴──▶ TornDown
//! ```

use crate::connection::{
    ConnectionFailureListener, Connector, ManagementConnection, RegistrationListener,
};
use crate::error::{ConnectionError, FederationError, Result};
use crate::events::{EventSink, FederationEvent};
use crate::proxy::ProxyObject;
use focal_registry::{ManagedObject, ObjectRegistry};
use focal_types::{naming, DomainPrefix, EndpointDescriptor, ObjectName, RegistrationEvent};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

/// Lifecycle state of a mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MirrorState {
    Connecting,
    /// Initial enumeration done, following remote changes
    Synced,
    /// Connection lost; proxies stay until the endpoint is lost
    Failed,
    TornDown,
    /// The endpoint could not be connected to
    Abandoned,
}

impl MirrorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::TornDown | Self::Abandoned)
    }
}

enum MirrorEvent {
    Added(ObjectName),
    Removed(ObjectName),
    ConnectionFailed(String),
    Teardown(oneshot::Sender<usize>),
}

/// Callback side of a mirror: forwards into the mirror's inbox without blocking
struct MirrorInbox {
    tx: mpsc::WeakUnboundedSender<MirrorEvent>,
    prefix: DomainPrefix,
}

impl MirrorInbox {
    fn deliver(&self, event: MirrorEvent) {
        // Mirror already gone: nothing left to update
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(event);
        }
    }
}

impl RegistrationListener for MirrorInbox {
    fn handle_registration(&self, event: &RegistrationEvent, handback: Option<&str>) {
        if handback != Some(self.prefix.as_str()) {
            trace!(
                prefix = %self.prefix,
                ?handback,
                "Ignoring registration event for another mirror"
            );
            return;
        }
        self.deliver(match event {
            RegistrationEvent::Registered(name) => MirrorEvent::Added(name.clone()),
            RegistrationEvent::Unregistered(name) => MirrorEvent::Removed(name.clone()),
        });
    }
}

impl ConnectionFailureListener for MirrorInbox {
    fn connection_failed(&self, _address: &str, error: &ConnectionError) {
        self.deliver(MirrorEvent::ConnectionFailed(error.to_string()));
    }
}

/// Register `object` under `name`, evicting a stale occupant once.
///
/// A second `AlreadyRegistered` is returned as
/// [`FederationError::RegistrationConflict`] instead of retrying again.
pub async fn register_with_retry(
    registry: &dyn ObjectRegistry,
    name: &ObjectName,
    object: Arc<dyn ManagedObject>,
) -> Result<()> {
    match registry.register(name.clone(), object.clone()).await {
        Ok(()) => return Ok(()),
        Err(e) if e.is_already_registered() => {}
        Err(e) => return Err(e.into()),
    }

    debug!(name = %name, "Name already in use, evicting previous occupant");
    match registry.unregister(name).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => debug!(name = %name, "Occupant already gone"),
        Err(e) => return Err(e.into()),
    }

    match registry.register(name.clone(), object).await {
        Ok(()) => Ok(()),
        Err(e) if e.is_already_registered() => {
            Err(FederationError::RegistrationConflict(name.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Unregister every local name whose domain is exactly `prefix`.
///
/// Returns how many names this call removed.
pub async fn sweep_prefix(registry: &dyn ObjectRegistry, prefix: &DomainPrefix) -> usize {
    let pattern = naming::wildcard_of(prefix);
    let names = match registry.query_names(Some(&pattern)).await {
        Ok(names) => names,
        Err(e) => {
            warn!(prefix = %prefix, error = %e, "Failed to query proxies for teardown");
            return 0;
        }
    };

    let mut removed = 0;
    // The glob also matches longer prefixes of sibling endpoints
    for name in names.iter().filter(|n| n.domain() == prefix.as_str()) {
        match registry.unregister(name).await {
            Ok(()) => removed += 1,
            Err(e) if e.is_not_found() => debug!(name = %name, "Proxy already unregistered"),
            Err(e) => warn!(name = %name, error = %e, "Failed to unregister proxy"),
        }
    }
    removed
}

/// Mirror of one remote registry
pub struct RemoteMirror {
    descriptor: EndpointDescriptor,
    prefix: DomainPrefix,
    local: Arc<dyn ObjectRegistry>,
    connector: Arc<dyn Connector>,
    events: EventSink,
    state: watch::Sender<MirrorState>,
    failed: bool,
}

impl RemoteMirror {
    /// Start mirroring `descriptor` on a new task
    pub fn spawn(
        descriptor: EndpointDescriptor,
        local: Arc<dyn ObjectRegistry>,
        connector: Arc<dyn Connector>,
        events: EventSink,
    ) -> MirrorHandle {
        let prefix = descriptor.domain_prefix();
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(MirrorState::Connecting);

        let mirror = Self {
            descriptor: descriptor.clone(),
            prefix: prefix.clone(),
            local,
            connector,
            events,
            state: state_tx,
            failed: false,
        };
        let inbox = Arc::new(MirrorInbox {
            tx: inbox_tx.downgrade(),
            prefix: prefix.clone(),
        });
        let task = tokio::spawn(mirror.run(inbox, inbox_rx));

        MirrorHandle {
            descriptor,
            prefix,
            inbox: inbox_tx,
            state: state_rx,
            task,
        }
    }

    #[instrument(skip_all, fields(prefix = %self.prefix))]
    async fn run(mut self, inbox: Arc<MirrorInbox>, mut rx: mpsc::UnboundedReceiver<MirrorEvent>) {
        let Some(connection) = self.connect(inbox).await else {
            return;
        };
        self.synchronize(&connection).await;

        while let Some(event) = rx.recv().await {
            match event {
                MirrorEvent::Added(remote) => self.mirror_object(&connection, remote).await,
                MirrorEvent::Removed(remote) => self.unmirror_object(&remote).await,
                MirrorEvent::ConnectionFailed(reason) => self.mark_failed(reason),
                MirrorEvent::Teardown(ack) => {
                    let removed = self.tear_down(&connection).await;
                    let _ = ack.send(removed);
                    return;
                }
            }
        }

        // Every handle is gone, so nobody can tear this mirror down later
        debug!("Mirror handle dropped");
        self.tear_down(&connection).await;
    }

    /// Connect and subscribe; `None` abandons the mirror
    async fn connect(&mut self, inbox: Arc<MirrorInbox>) -> Option<Arc<dyn ManagementConnection>> {
        self.events.emit(FederationEvent::MirrorConnecting {
            service_id: self.descriptor.service_id.clone(),
            prefix: self.prefix.clone(),
        });

        let connection = match self.connector.connect(&self.descriptor.address).await {
            Ok(connection) => connection,
            Err(e) => {
                self.abandon(e.to_string());
                return None;
            }
        };

        connection.on_failure(inbox.clone());
        let handback = Some(self.prefix.to_string());
        if let Err(e) = connection.subscribe_registration_changes(inbox, handback).await {
            connection.close().await;
            self.abandon(e.to_string());
            return None;
        }

        info!(address = %self.descriptor.address, "Connected to remote registry");
        Some(connection)
    }

    fn abandon(&mut self, reason: String) {
        warn!(
            address = %self.descriptor.address,
            reason = %reason,
            "Failed to connect to remote registry, abandoning endpoint until rediscovered"
        );
        self.events.emit(FederationEvent::ConnectFailed {
            service_id: self.descriptor.service_id.clone(),
            address: self.descriptor.address.clone(),
            reason,
        });
        self.set_state(MirrorState::Abandoned);
    }

    /// Register a proxy for every object the remote registry knows
    async fn synchronize(&mut self, connection: &Arc<dyn ManagementConnection>) {
        let remote_names = match connection.query_names(None).await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate remote objects");
                Vec::new()
            }
        };

        for remote in remote_names {
            self.mirror_object(connection, remote).await;
        }

        let proxies = self
            .local
            .query_names(Some(&naming::wildcard_of(&self.prefix)))
            .await
            .map(|names| names.iter().filter(|n| n.domain() == self.prefix.as_str()).count())
            .unwrap_or(0);

        info!(proxies, "Mirror synced");
        self.events.emit(FederationEvent::MirrorSynced {
            service_id: self.descriptor.service_id.clone(),
            prefix: self.prefix.clone(),
            proxies,
        });
        if !self.failed {
            self.set_state(MirrorState::Synced);
        }
    }

    async fn mirror_object(&self, connection: &Arc<dyn ManagementConnection>, remote: ObjectName) {
        if naming::uses_reserved_key(&remote) {
            warn!(
                remote = %remote,
                key = naming::REMOTE_DOMAIN_KEY,
                "Remote object uses a reserved property key; its value is replaced"
            );
        }

        let local = match naming::to_local(&self.prefix, &remote) {
            Ok(local) => local,
            Err(e) => {
                warn!(remote = %remote, error = %e, "Cannot derive local name, skipping object");
                self.skipped(remote, e.to_string());
                return;
            }
        };

        let proxy = Arc::new(ProxyObject::shared(remote.clone(), connection.clone()));
        match register_with_retry(self.local.as_ref(), &local, proxy).await {
            Ok(()) => {
                debug!(local = %local, remote = %remote, "Proxy registered");
                self.events
                    .emit(FederationEvent::ProxyRegistered { local, remote });
            }
            Err(e) => {
                warn!(local = %local, error = %e, "Failed to register proxy, skipping object");
                self.skipped(remote, e.to_string());
            }
        }
    }

    async fn unmirror_object(&self, remote: &ObjectName) {
        let Ok(local) = naming::to_local(&self.prefix, remote) else {
            trace!(remote = %remote, "Removed object was never mirrored");
            return;
        };

        match self.local.unregister(&local).await {
            Ok(()) => {
                debug!(local = %local, "Proxy unregistered");
                self.events.emit(FederationEvent::ProxyUnregistered { local });
            }
            Err(e) if e.is_not_found() => {
                debug!(local = %local, "Proxy already unregistered");
            }
            Err(e) => warn!(local = %local, error = %e, "Failed to unregister proxy"),
        }
    }

    /// Latch the failure. Proxies are left for the endpoint-lost teardown.
    fn mark_failed(&mut self, reason: String) {
        if self.failed {
            trace!(reason = %reason, "Repeated connection failure ignored");
            return;
        }
        self.failed = true;

        info!(reason = %reason, "Remote registry connection failed, awaiting endpoint loss");
        self.events.emit(FederationEvent::MirrorFailed {
            service_id: self.descriptor.service_id.clone(),
            prefix: self.prefix.clone(),
            reason,
        });
        self.set_state(MirrorState::Failed);
    }

    /// Unregister every proxy, then release the shared connection
    async fn tear_down(&mut self, connection: &Arc<dyn ManagementConnection>) -> usize {
        let removed = sweep_prefix(self.local.as_ref(), &self.prefix).await;
        connection.close().await;

        info!(removed, "Mirror torn down");
        self.events.emit(FederationEvent::MirrorTornDown {
            service_id: self.descriptor.service_id.clone(),
            prefix: self.prefix.clone(),
            removed,
        });
        self.set_state(MirrorState::TornDown);
        removed
    }

    fn skipped(&self, remote: ObjectName, reason: String) {
        self.events
            .emit(FederationEvent::ProxySkipped { remote, reason });
    }

    fn set_state(&self, state: MirrorState) {
        self.state.send_replace(state);
    }
}

/// Controller-side handle of a running mirror
pub struct MirrorHandle {
    descriptor: EndpointDescriptor,
    prefix: DomainPrefix,
    inbox: mpsc::UnboundedSender<MirrorEvent>,
    state: watch::Receiver<MirrorState>,
    task: JoinHandle<()>,
}

impl MirrorHandle {
    pub fn descriptor(&self) -> &EndpointDescriptor {
        &self.descriptor
    }

    pub fn prefix(&self) -> &DomainPrefix {
        &self.prefix
    }

    pub fn state(&self) -> MirrorState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn watch_state(&self) -> watch::Receiver<MirrorState> {
        self.state.clone()
    }

    /// Whether the mirror is still running and not winding down
    pub fn is_live(&self) -> bool {
        !self.task.is_finished() && !self.state().is_terminal()
    }

    /// Tear the mirror down and wait for it to finish.
    ///
    /// Returns the number of proxies removed, or `None` if the mirror had
    /// already stopped on its own.
    pub async fn tear_down(self) -> Option<usize> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.inbox.send(MirrorEvent::Teardown(ack_tx)).is_err() {
            return None;
        }
        ack_rx.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::InProcessConnector;
    use focal_registry::{BasicObject, InMemoryObjectRegistry};
    use focal_types::{ObjectInfo, ServiceId};

    fn name(s: &str) -> ObjectName {
        ObjectName::parse(s).unwrap()
    }

    fn object(n: &str) -> Arc<BasicObject> {
        Arc::new(BasicObject::new(name(n), ObjectInfo::new("Test", "")))
    }

    #[tokio::test]
    async fn test_register_with_retry_replaces_stale_occupant() {
        let registry = InMemoryObjectRegistry::new();
        let n = name("svc:remoteDomain=demo,type=Cache");

        register_with_retry(&registry, &n, object("demo:type=Cache")).await.unwrap();
        register_with_retry(&registry, &n, object("demo:type=Cache")).await.unwrap();

        assert_eq!(registry.query_names(None).await.unwrap(), vec![n]);
    }

    #[tokio::test]
    async fn test_register_with_retry_surfaces_other_errors() {
        let registry = InMemoryObjectRegistry::new();
        let err = register_with_retry(
            &registry,
            &name("registry:type=X"),
            object("registry:type=X"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FederationError::Registry(_)));
    }

    #[tokio::test]
    async fn test_sweep_prefix_spares_sibling_endpoints() {
        let registry = InMemoryObjectRegistry::new();
        for n in [
            "svc___a_1100:remoteDomain=demo,type=Cache",
            "svc___a_1100:remoteDomain=demo,type=Queue",
            "svc___a_11000:remoteDomain=demo,type=Cache",
        ] {
            registry.register(name(n), object(n)).await.unwrap();
        }

        let prefix = DomainPrefix::sanitize("svc://a:1100");
        assert_eq!(sweep_prefix(&registry, &prefix).await, 2);
        assert_eq!(sweep_prefix(&registry, &prefix).await, 0);
        assert_eq!(registry.object_count().await, 1);
    }

    #[tokio::test]
    async fn test_mirror_lifecycle() {
        let remote = Arc::new(InMemoryObjectRegistry::new());
        remote
            .register(name("demo:type=Cache"), object("demo:type=Cache"))
            .await
            .unwrap();
        let connector = Arc::new(InProcessConnector::new());
        connector.publish("svc://a:1100", remote.clone());
        let local = Arc::new(InMemoryObjectRegistry::new());

        let handle = RemoteMirror::spawn(
            EndpointDescriptor::new(ServiceId::new("a"), "svc://a:1100"),
            local.clone(),
            connector.clone(),
            EventSink::new(64),
        );
        let mut state = handle.watch_state();
        state
            .wait_for(|s| *s == MirrorState::Synced)
            .await
            .unwrap();

        let proxy_name = name("svc___a_1100:remoteDomain=demo,type=Cache");
        assert!(local.is_registered(&proxy_name).await);

        assert_eq!(handle.tear_down().await, Some(1));
        assert_eq!(local.object_count().await, 0);
        assert!(connector.connections_to("svc://a:1100").iter().all(|c| !c.is_open()));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_abandoned() {
        let connector = Arc::new(InProcessConnector::new());
        let local = Arc::new(InMemoryObjectRegistry::new());

        let handle = RemoteMirror::spawn(
            EndpointDescriptor::new(ServiceId::new("gone"), "svc://gone:1"),
            local.clone(),
            connector,
            EventSink::new(64),
        );
        let mut state = handle.watch_state();
        state
            .wait_for(|s| *s == MirrorState::Abandoned)
            .await
            .unwrap();

        assert_eq!(handle.tear_down().await, None);
        assert_eq!(local.object_count().await, 0);
    }
}
