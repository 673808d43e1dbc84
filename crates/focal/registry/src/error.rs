//! Registry and object error types

use focal_types::{NamingError, ObjectName, SubscriptionId};
use thiserror::Error;

/// Failures of a single manageable object operation
#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    #[error("Attribute is read-only: {0}")]
    ReadOnlyAttribute(String),

    #[error("Invalid value for attribute {name}: {reason}")]
    InvalidAttributeValue { name: String, reason: String },

    #[error("Operation not found: {0}")]
    OperationNotFound(String),

    #[error("Operation {operation} failed: {reason}")]
    OperationFailed { operation: String, reason: String },

    #[error("Notification listener not found: {0}")]
    ListenerNotFound(SubscriptionId),

    #[error("Object does not emit notifications")]
    NotificationsUnsupported,

    /// The connection behind a forwarding object is no longer usable
    #[error("Remote object {name} unavailable: {source}")]
    RemoteUnavailable {
        name: ObjectName,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ObjectError {
    pub fn operation_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_value(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAttributeValue {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn remote_unavailable(
        name: ObjectName,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::RemoteUnavailable {
            name,
            source: Box::new(source),
        }
    }
}

/// Result type for object operations
pub type ObjectResult<T> = std::result::Result<T, ObjectError>;

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Object already registered: {0}")]
    AlreadyRegistered(ObjectName),

    #[error("Object not found: {0}")]
    NotFound(ObjectName),

    #[error("Object not compliant: {0}")]
    NotCompliant(String),

    #[error("Object error: {0}")]
    Object(#[from] ObjectError),

    #[error("Naming error: {0}")]
    Naming(#[from] NamingError),
}

impl RegistryError {
    pub fn is_already_registered(&self) -> bool {
        matches!(self, Self::AlreadyRegistered(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
