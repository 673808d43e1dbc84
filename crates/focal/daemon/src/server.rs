//! Server setup and lifecycle management

use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::simulation::Simulation;
use focal_bridge::{
    bridge_name, membership_name, BridgeObject, DiscoveryMembership, FederationController,
    FederationError, FederationEvent, InMemoryDiscoveryTransport, InProcessConnector,
    MembershipObject, ShutdownSignal,
};
use focal_registry::{InMemoryObjectRegistry, ObjectRegistry};
use focal_types::RegistrationEvent;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

/// Focal Daemon Server
pub struct Server {
    config: DaemonConfig,
    local: Arc<InMemoryObjectRegistry>,
    transport: Arc<InMemoryDiscoveryTransport>,
    connector: Arc<InProcessConnector>,
    controller: Arc<FederationController>,
    shutdown: ShutdownSignal,
    registrations: broadcast::Receiver<RegistrationEvent>,
}

impl Server {
    /// Create a new server with the given configuration
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        config.validate().map_err(DaemonError::Config)?;
        let locators = config.locators().map_err(DaemonError::Config)?;

        // Local registry; subscribe before anything is registered
        let local = Arc::new(InMemoryObjectRegistry::new());
        let registrations = local.subscribe_registrations();

        let transport = Arc::new(InMemoryDiscoveryTransport::with_config(
            config.discovery.group_selection(),
            locators,
        ));
        let connector = Arc::new(InProcessConnector::new());
        let controller = Arc::new(FederationController::new(
            config.federation.federation_config(),
            local.clone(),
            connector.clone(),
        ));

        let membership = DiscoveryMembership::new(transport.clone());
        membership.listen(controller.clone());

        // Management surface of the bridge itself
        let shutdown = ShutdownSignal::new();
        let domain = &config.federation.management_domain;
        local
            .register(
                membership_name(domain).map_err(FederationError::from)?,
                Arc::new(MembershipObject::new(membership)),
            )
            .await
            .map_err(FederationError::from)?;
        local
            .register(
                bridge_name(domain).map_err(FederationError::from)?,
                Arc::new(BridgeObject::new(&controller, shutdown.clone())),
            )
            .await
            .map_err(FederationError::from)?;

        Ok(Self {
            config,
            local,
            transport,
            connector,
            controller,
            shutdown,
            registrations,
        })
    }

    pub fn local_registry(&self) -> &Arc<InMemoryObjectRegistry> {
        &self.local
    }

    pub fn controller(&self) -> &Arc<FederationController> {
        &self.controller
    }

    pub fn transport(&self) -> &Arc<InMemoryDiscoveryTransport> {
        &self.transport
    }

    pub fn connector(&self) -> &Arc<InProcessConnector> {
        &self.connector
    }

    /// Handle that stops [`Server::run`] when triggered
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Run until a termination signal or a management shutdown request
    pub async fn run(self) -> DaemonResult<()> {
        let simulation = self.spawn_simulation();

        let registration_log = tokio::spawn(log_registrations(self.registrations));
        let event_log = tokio::spawn(log_federation_events(self.controller.subscribe()));

        tracing::info!(
            domain = %self.config.federation.management_domain,
            "Focal daemon running"
        );

        tokio::select! {
            _ = shutdown_signal() => {}
            _ = self.shutdown.requested() => {
                tracing::info!("Management shutdown requested, initiating graceful shutdown");
            }
        }

        tracing::info!("Focal daemon shutting down");

        if let Some(simulation) = simulation {
            simulation.abort();
        }
        self.controller.shutdown().await;

        registration_log.abort();
        event_log.abort();
        Ok(())
    }

    fn spawn_simulation(&self) -> Option<JoinHandle<()>> {
        if self.config.simulation.endpoints == 0 {
            return None;
        }
        let simulation = Simulation::new(
            self.config.simulation.clone(),
            self.connector.clone(),
            self.transport.clone(),
        );
        Some(tokio::spawn(simulation.run()))
    }
}

/// Log every registration change in the local registry
async fn log_registrations(mut rx: broadcast::Receiver<RegistrationEvent>) {
    loop {
        match rx.recv().await {
            Ok(RegistrationEvent::Registered(name)) => {
                tracing::debug!(name = %name, "Registered");
            }
            Ok(RegistrationEvent::Unregistered(name)) => {
                tracing::debug!(name = %name, "Unregistered");
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Registration log lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn log_federation_events(mut rx: broadcast::Receiver<FederationEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => tracing::trace!(event = %json, "Federation event"),
                Err(err) => tracing::trace!(error = %err, "Unserializable federation event"),
            },
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Federation event log lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use focal_types::{EndpointDescriptor, ObjectName, ServiceId, TypedArgument};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_management_objects_registered() {
        let server = Server::new(DaemonConfig::default()).await.unwrap();
        let local = server.local_registry();

        assert!(local.is_registered(&membership_name("focal").unwrap()).await);
        assert!(local.is_registered(&bridge_name("focal").unwrap()).await);
        assert_eq!(local.object_count().await, 2);
    }

    #[tokio::test]
    async fn test_invalid_locator_rejected() {
        let mut config = DaemonConfig::default();
        config.discovery.locators = vec!["http://registry".to_string()];
        assert!(matches!(
            Server::new(config).await,
            Err(DaemonError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_discovered_endpoint_is_mirrored() {
        let server = Server::new(DaemonConfig::default()).await.unwrap();

        let remote = Arc::new(InMemoryObjectRegistry::new());
        let name = ObjectName::parse("demo:type=Cache").unwrap();
        remote
            .register(
                name.clone(),
                Arc::new(focal_registry::BasicObject::new(
                    name,
                    focal_types::ObjectInfo::new("Cache", ""),
                )),
            )
            .await
            .unwrap();
        server.connector().publish("service://10.0.0.5:1100", remote);
        server
            .transport()
            .announce(EndpointDescriptor::new(
                ServiceId::new("s1"),
                "service://10.0.0.5:1100",
            ))
            .await;

        let mut state = server
            .controller()
            .watch_mirror(&ServiceId::new("s1"))
            .unwrap();
        state
            .wait_for(|s| *s == focal_bridge::MirrorState::Synced)
            .await
            .unwrap();

        let proxy =
            ObjectName::parse("service___10_0_0_5_1100:type=Cache,remoteDomain=demo").unwrap();
        assert!(server.local_registry().is_registered(&proxy).await);
    }

    #[tokio::test]
    async fn test_management_shutdown_stops_run() {
        let server = Server::new(DaemonConfig::default()).await.unwrap();
        let local = server.local_registry().clone();
        let running = tokio::spawn(server.run());

        local
            .invoke(&bridge_name("focal").unwrap(), "shutdown", Vec::<TypedArgument>::new())
            .await
            .unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(
            local
                .get_attribute(&bridge_name("focal").unwrap(), "MirrorCount")
                .await
                .unwrap(),
            json!(0)
        );
    }
}
