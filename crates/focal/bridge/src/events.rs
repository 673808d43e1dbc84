//! Federation lifecycle events
//!
//! The controller and its mirrors publish these on one broadcast channel.
//! Nothing depends on them being received; a lagging subscriber only misses
//! events.

use focal_types::{DomainPrefix, ObjectName, ServiceId};
use serde::Serialize;
use tokio::sync::broadcast;

/// Events emitted while mirroring remote registries
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FederationEvent {
    /// A mirror started connecting to a discovered endpoint
    MirrorConnecting {
        service_id: ServiceId,
        prefix: DomainPrefix,
    },

    /// The endpoint could not be reached; the mirror was abandoned
    ConnectFailed {
        service_id: ServiceId,
        address: String,
        reason: String,
    },

    /// Initial enumeration finished
    MirrorSynced {
        service_id: ServiceId,
        prefix: DomainPrefix,
        proxies: usize,
    },

    /// The mirror's connection reported permanent failure
    MirrorFailed {
        service_id: ServiceId,
        prefix: DomainPrefix,
        reason: String,
    },

    /// Every proxy under the prefix was unregistered
    MirrorTornDown {
        service_id: ServiceId,
        prefix: DomainPrefix,
        removed: usize,
    },

    ProxyRegistered {
        local: ObjectName,
        remote: ObjectName,
    },

    ProxyUnregistered {
        local: ObjectName,
    },

    /// A remote object could not be mirrored
    ProxySkipped {
        remote: ObjectName,
        reason: String,
    },
}

/// Sending half shared by the controller and its mirrors
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<FederationEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FederationEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: FederationEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
