//! Descriptors of discovered remote registries

use crate::ids::ServiceId;
use crate::naming::DomainPrefix;
use serde::{Deserialize, Serialize};

/// A remote management registry found through discovery.
///
/// Immutable once discovered. Two descriptors with the same `service_id`
/// describe the same announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    /// Identity used to deduplicate announcements
    pub service_id: ServiceId,

    /// Connection address of the remote registry
    pub address: String,

    /// Discovery groups the service announces itself in
    #[serde(default)]
    pub groups: Vec<String>,
}

impl EndpointDescriptor {
    pub fn new(service_id: ServiceId, address: impl Into<String>) -> Self {
        Self {
            service_id,
            address: address.into(),
            groups: Vec::new(),
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    /// Local domain prefix for this endpoint's proxies
    pub fn domain_prefix(&self) -> DomainPrefix {
        DomainPrefix::sanitize(&self.address)
    }
}
