//! Federation controller
//!
//! The FederationController consumes discovery events and keeps one
//! [`RemoteMirror`] per live endpoint. `endpoint_lost` is the only trigger
//! that removes an endpoint's proxies; connection failure merely latches the
//! mirror until then.
//!
//! Found and lost for one service id are serialized: a rediscovered endpoint
//! gets its new mirror only after the previous mirror finished tearing down,
//! so the old teardown never sweeps proxies of the new one.

use crate::connection::Connector;
use crate::discovery::DiscoveryListener;
use crate::events::{EventSink, FederationEvent};
use crate::mirror::{sweep_prefix, MirrorHandle, MirrorState, RemoteMirror};
use async_trait::async_trait;
use dashmap::DashMap;
use focal_registry::ObjectRegistry;
use focal_types::{DomainPrefix, EndpointDescriptor, ServiceId};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, instrument};

/// Federation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Capacity of the federation event channel
    pub event_channel_capacity: usize,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: 1024,
        }
    }
}

/// Point-in-time view of one mirror
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MirrorSummary {
    pub service_id: ServiceId,
    pub address: String,
    pub prefix: DomainPrefix,
    pub state: MirrorState,
}

/// Orchestrates one mirror per discovered endpoint
pub struct FederationController {
    local: Arc<dyn ObjectRegistry>,
    connector: Arc<dyn Connector>,
    mirrors: DashMap<ServiceId, MirrorHandle>,
    /// Per-service lock held across a whole found or lost transition
    gates: DashMap<ServiceId, Arc<Mutex<()>>>,
    events: EventSink,
}

impl FederationController {
    pub fn new(
        config: FederationConfig,
        local: Arc<dyn ObjectRegistry>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        Self {
            local,
            connector,
            mirrors: DashMap::new(),
            gates: DashMap::new(),
            events: EventSink::new(config.event_channel_capacity),
        }
    }

    /// Subscribe to federation events
    pub fn subscribe(&self) -> broadcast::Receiver<FederationEvent> {
        self.events.subscribe()
    }

    /// Registry the proxies are registered in
    pub fn local_registry(&self) -> &Arc<dyn ObjectRegistry> {
        &self.local
    }

    /// Start mirroring an endpoint unless a live mirror already exists.
    ///
    /// Waits for a teardown of the same service that is still in progress.
    #[instrument(skip(self, descriptor), fields(service = %descriptor.service_id))]
    pub async fn handle_endpoint_found(&self, descriptor: EndpointDescriptor) {
        let gate = self.gate(&descriptor.service_id);
        let _serial = gate.lock().await;

        let live = self
            .mirrors
            .get(&descriptor.service_id)
            .map(|mirror| mirror.is_live());
        match live {
            Some(true) => {
                debug!(address = %descriptor.address, "Endpoint already mirrored");
                return;
            }
            Some(false) => {
                info!(address = %descriptor.address, "Endpoint rediscovered, starting new mirror");
                if let Some((_, stale)) = self.mirrors.remove(&descriptor.service_id) {
                    // Wait for the stopped mirror to finish before reusing its prefix
                    if let Some(removed) = stale.tear_down().await {
                        debug!(removed, "Stale mirror torn down");
                    }
                }
            }
            None => info!(address = %descriptor.address, "Endpoint discovered"),
        }

        let mirror = self.spawn_mirror(descriptor.clone());
        self.mirrors.insert(descriptor.service_id, mirror);
    }

    /// Tear down the endpoint's mirror and unregister all of its proxies.
    ///
    /// Returns the number of proxies removed.
    #[instrument(skip(self, descriptor), fields(service = %descriptor.service_id))]
    pub async fn handle_endpoint_lost(&self, descriptor: EndpointDescriptor) -> usize {
        match self.retire(&descriptor.service_id).await {
            Some(removed) => {
                info!(address = %descriptor.address, removed, "Endpoint lost");
                removed
            }
            None => {
                debug!(address = %descriptor.address, "Lost endpoint was not mirrored");
                0
            }
        }
    }

    /// Tear down every mirror
    pub async fn shutdown(&self) {
        let ids: Vec<ServiceId> = self.mirrors.iter().map(|e| e.key().clone()).collect();
        info!(mirrors = ids.len(), "Shutting down federation");
        join_all(ids.iter().map(|id| self.retire(id))).await;
    }

    pub fn mirror_count(&self) -> usize {
        self.mirrors.len()
    }

    pub fn mirror_state(&self, service_id: &ServiceId) -> Option<MirrorState> {
        self.mirrors.get(service_id).map(|m| m.state())
    }

    /// Watch the state of the current mirror for a service
    pub fn watch_mirror(&self, service_id: &ServiceId) -> Option<watch::Receiver<MirrorState>> {
        self.mirrors.get(service_id).map(|m| m.watch_state())
    }

    /// Summaries of all known mirrors, ordered by service id
    pub fn mirrors(&self) -> Vec<MirrorSummary> {
        let mut summaries: Vec<MirrorSummary> = self
            .mirrors
            .iter()
            .map(|entry| MirrorSummary {
                service_id: entry.key().clone(),
                address: entry.descriptor().address.clone(),
                prefix: entry.prefix().clone(),
                state: entry.state(),
            })
            .collect();
        summaries.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        summaries
    }

    fn gate(&self, service_id: &ServiceId) -> Arc<Mutex<()>> {
        self.gates.entry(service_id.clone()).or_default().clone()
    }

    /// Remove and tear down the mirror of `service_id` under its gate.
    ///
    /// `None` if the service had no mirror.
    async fn retire(&self, service_id: &ServiceId) -> Option<usize> {
        let gate = self.gate(service_id);
        let _serial = gate.lock().await;

        let (_, handle) = self.mirrors.remove(service_id)?;
        let prefix = handle.prefix().clone();
        Some(match handle.tear_down().await {
            Some(removed) => removed,
            // The mirror stopped by itself; clear whatever it left behind
            None => sweep_prefix(self.local.as_ref(), &prefix).await,
        })
    }

    fn spawn_mirror(&self, descriptor: EndpointDescriptor) -> MirrorHandle {
        RemoteMirror::spawn(
            descriptor,
            self.local.clone(),
            self.connector.clone(),
            self.events.clone(),
        )
    }
}

#[async_trait]
impl DiscoveryListener for FederationController {
    async fn endpoint_found(&self, descriptor: EndpointDescriptor) {
        self.handle_endpoint_found(descriptor).await;
    }

    async fn endpoint_lost(&self, descriptor: EndpointDescriptor) {
        self.handle_endpoint_lost(descriptor).await;
    }
}
