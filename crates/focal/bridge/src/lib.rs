//! Focal Bridge - Discovery-driven federation of management registries
//!
//! The bridge discovers remote management registries and mirrors every
//! object they host as a proxy in one local registry:
//!
//! - **Discovery**: [`DiscoveryMembership`] edits groups and locators and
//!   raises `endpoint_found` / `endpoint_lost`
//! - **FederationController**: keeps one [`RemoteMirror`] per live endpoint
//! - **RemoteMirror**: connects, enumerates, follows remote registration
//!   changes, and unregisters everything when its endpoint is lost
//! - **ProxyObject**: forwards attribute, operation and notification calls
//!   to the remote object
//! - **Management**: the bridge's own manageable objects
//!
//! Proxies for an endpoint at `service://10.0.0.5:1100` live in the local
//! domain `service___10_0_0_5_1100`, with the remote domain kept in the
//! `remoteDomain` property.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod connection;
pub mod controller;
pub mod discovery;
pub mod error;
pub mod events;
pub mod management;
pub mod mirror;
pub mod proxy;

// Re-exports
pub use connection::{
    ConnectionFailureListener, Connector, InProcessConnection, InProcessConnector,
    ManagementConnection, RegistrationListener,
};
pub use controller::{FederationConfig, FederationController, MirrorSummary};
pub use discovery::{
    DiscoveryListener, DiscoveryMembership, DiscoveryTransport, GroupSelection,
    InMemoryDiscoveryTransport, Locator, DEFAULT_DISCOVERY_PORT,
};
pub use error::{
    ConnectionError, ConnectionResult, DiscoveryError, DiscoveryResult, FederationError, Result,
};
pub use events::{EventSink, FederationEvent};
pub use management::{bridge_name, membership_name, BridgeObject, MembershipObject, ShutdownSignal};
pub use mirror::{register_with_retry, sweep_prefix, MirrorHandle, MirrorState, RemoteMirror};
pub use proxy::ProxyObject;
