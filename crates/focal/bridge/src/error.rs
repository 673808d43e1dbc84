//! Error types for the federation bridge

use focal_registry::{ObjectError, RegistryError};
use focal_types::{NamingError, ObjectName};
use thiserror::Error;

/// Failures of a management connection
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to connect to {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("Transport failure on {address}: {reason}")]
    Transport { address: String, reason: String },

    #[error("Connection to {0} is closed")]
    Closed(String),

    #[error("Remote instance not found: {0}")]
    InstanceNotFound(ObjectName),

    /// Failure reported by the remote object itself
    #[error(transparent)]
    Object(ObjectError),
}

impl ConnectionError {
    pub fn connect(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connect {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn transport(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Map a failure of the far-side registry to a connection error
    pub(crate) fn from_registry(error: RegistryError) -> Self {
        match error {
            RegistryError::NotFound(name) => Self::InstanceNotFound(name),
            RegistryError::Object(e) => Self::Object(e),
            other => Self::Object(ObjectError::operation_failed("remote", other.to_string())),
        }
    }
}

/// Result type for connection operations
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Discovery configuration and transport errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Invalid discovery address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Cannot remove group '{0}' while discovering all groups")]
    AllGroupsSelected(String),

    #[error("Discovery transport error: {0}")]
    Transport(String),
}

impl DiscoveryError {
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for discovery operations
pub type DiscoveryResult<T> = std::result::Result<T, DiscoveryError>;

/// Errors surfaced by the federation layer
#[derive(Debug, Error)]
pub enum FederationError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Naming error: {0}")]
    Naming(#[from] NamingError),

    /// The local name was still taken after evicting its occupant once
    #[error("Registration conflict persists for {0}")]
    RegistrationConflict(ObjectName),
}

/// Result type for federation operations
pub type Result<T> = std::result::Result<T, FederationError>;
