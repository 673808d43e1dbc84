//! Discovery of remote management registries
//!
//! The discovery transport announces remote registries by multicast group or
//! through configured unicast locators. [`DiscoveryMembership`] exposes the
//! mutable group and locator configuration and lets a [`DiscoveryListener`]
//! receive `endpoint_found` / `endpoint_lost` callbacks.
//!
//! [`InMemoryDiscoveryTransport`] is a process-local transport: services are
//! announced and withdrawn explicitly, and listeners are told about every
//! announcement visible under the current configuration.

use crate::error::{DiscoveryError, DiscoveryResult};
use async_trait::async_trait;
use dashmap::DashMap;
use focal_types::{EndpointDescriptor, ServiceId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// Port used by locators that do not name one
pub const DEFAULT_DISCOVERY_PORT: u16 = 4160;

/// URL scheme of unicast locators
pub const LOCATOR_SCHEME: &str = "lookup://";

/// Unicast address of a lookup service, `lookup://host[:port]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator {
    host: String,
    port: u16,
}

impl Locator {
    pub fn new(host: impl Into<String>, port: u16) -> DiscoveryResult<Self> {
        let host = host.into();
        validate_host(&host).map_err(|reason| {
            DiscoveryError::invalid_address(format!("{}{}:{}", LOCATOR_SCHEME, host, port), reason)
        })?;
        if port == 0 {
            return Err(DiscoveryError::invalid_address(
                format!("{}{}:0", LOCATOR_SCHEME, host),
                "port must be non-zero",
            ));
        }
        Ok(Self { host, port })
    }

    /// Parse `lookup://host[:port]`
    pub fn parse(url: &str) -> DiscoveryResult<Self> {
        let invalid = |reason: &str| DiscoveryError::invalid_address(url, reason);

        let rest = url
            .strip_prefix(LOCATOR_SCHEME)
            .ok_or_else(|| invalid("expected lookup:// scheme"))?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);

        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;
                (host, port)
            }
            None => (rest, DEFAULT_DISCOVERY_PORT),
        };
        validate_host(host).map_err(invalid)?;
        if port == 0 {
            return Err(invalid("port must be non-zero"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

fn validate_host(host: &str) -> std::result::Result<(), &'static str> {
    if host.is_empty() {
        return Err("host is empty");
    }
    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
    {
        return Err("host contains illegal characters");
    }
    Ok(())
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:{}", LOCATOR_SCHEME, self.host, self.port)
    }
}

impl FromStr for Locator {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> DiscoveryResult<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Locator {
    type Error = DiscoveryError;

    fn try_from(value: String) -> DiscoveryResult<Self> {
        Self::parse(&value)
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.to_string()
    }
}

/// Which multicast groups are discovered
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupSelection {
    /// Every group
    #[default]
    All,
    /// Only the listed groups; an empty list discovers nothing by multicast
    Named(Vec<String>),
}

impl GroupSelection {
    /// Whether a service announcing in `groups` is visible
    pub fn includes(&self, groups: &[String]) -> bool {
        match self {
            Self::All => true,
            Self::Named(selected) => groups.iter().any(|g| selected.contains(g)),
        }
    }

    /// Group names, or `None` when every group is selected
    pub fn names(&self) -> Option<&[String]> {
        match self {
            Self::All => None,
            Self::Named(groups) => Some(groups),
        }
    }
}

impl From<Option<Vec<String>>> for GroupSelection {
    fn from(groups: Option<Vec<String>>) -> Self {
        groups.map_or(Self::All, Self::Named)
    }
}

/// Receiver of discovery events
#[async_trait]
pub trait DiscoveryListener: Send + Sync {
    /// A service became visible. May repeat for the same service.
    async fn endpoint_found(&self, descriptor: EndpointDescriptor);

    /// A previously found service was withdrawn or expired
    async fn endpoint_lost(&self, descriptor: EndpointDescriptor);
}

/// Discovery transport consumed by [`DiscoveryMembership`]
pub trait DiscoveryTransport: Send + Sync {
    fn groups(&self) -> GroupSelection;

    fn set_groups(&self, groups: GroupSelection) -> DiscoveryResult<()>;

    fn locators(&self) -> Vec<Locator>;

    fn set_locators(&self, locators: Vec<Locator>) -> DiscoveryResult<()>;

    /// Start delivering discovery events to `listener`
    fn add_listener(&self, listener: Arc<dyn DiscoveryListener>);
}

/// Mutable discovery configuration over a transport
#[derive(Clone)]
pub struct DiscoveryMembership {
    transport: Arc<dyn DiscoveryTransport>,
}

impl DiscoveryMembership {
    pub fn new(transport: Arc<dyn DiscoveryTransport>) -> Self {
        Self { transport }
    }

    pub fn list_groups(&self) -> GroupSelection {
        self.transport.groups()
    }

    /// Add a group; when every group is selected this narrows to just `group`
    pub fn add_group(&self, group: impl Into<String>) -> DiscoveryResult<()> {
        let group = group.into();
        let groups = match self.transport.groups() {
            GroupSelection::All => vec![group.clone()],
            GroupSelection::Named(mut groups) => {
                if !groups.contains(&group) {
                    groups.push(group.clone());
                }
                groups
            }
        };
        info!(group = %group, "Adding discovery group");
        self.transport.set_groups(GroupSelection::Named(groups))
    }

    /// Remove a group. Already discovered endpoints stay discovered.
    pub fn remove_group(&self, group: &str) -> DiscoveryResult<()> {
        match self.transport.groups() {
            GroupSelection::All => Err(DiscoveryError::AllGroupsSelected(group.to_string())),
            GroupSelection::Named(mut groups) => {
                groups.retain(|g| g != group);
                info!(group = %group, "Removing discovery group");
                self.transport.set_groups(GroupSelection::Named(groups))
            }
        }
    }

    pub fn set_groups<I, S>(&self, groups: I) -> DiscoveryResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let groups: Vec<String> = groups.into_iter().map(Into::into).collect();
        info!(groups = ?groups, "Setting discovery groups");
        self.transport.set_groups(GroupSelection::Named(groups))
    }

    /// Discover every group
    pub fn set_all_groups(&self) -> DiscoveryResult<()> {
        info!("Discovering all groups");
        self.transport.set_groups(GroupSelection::All)
    }

    pub fn list_locators(&self) -> Vec<Locator> {
        self.transport.locators()
    }

    pub fn add_locator(&self, url: &str) -> DiscoveryResult<()> {
        let locator = Locator::parse(url)?;
        let mut locators = self.transport.locators();
        if !locators.contains(&locator) {
            locators.push(locator);
        }
        info!(locator = %url, "Adding discovery locator");
        self.transport.set_locators(locators)
    }

    pub fn remove_locator(&self, url: &str) -> DiscoveryResult<()> {
        let locator = Locator::parse(url)?;
        let mut locators = self.transport.locators();
        locators.retain(|l| l != &locator);
        info!(locator = %url, "Removing discovery locator");
        self.transport.set_locators(locators)
    }

    /// Replace all locators. Nothing changes if any url is malformed.
    pub fn set_locators<I, S>(&self, urls: I) -> DiscoveryResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let locators = urls
            .into_iter()
            .map(|url| Locator::parse(url.as_ref()))
            .collect::<DiscoveryResult<Vec<_>>>()?;
        self.transport.set_locators(locators)
    }

    /// Deliver discovery events to `listener`
    pub fn listen(&self, listener: Arc<dyn DiscoveryListener>) {
        self.transport.add_listener(listener);
    }
}

#[derive(Debug, Clone)]
struct Announcement {
    descriptor: EndpointDescriptor,
    /// Whether listeners were told about this announcement
    delivered: bool,
}

#[derive(Debug, Default)]
struct DiscoveryConfig {
    groups: GroupSelection,
    locators: Vec<Locator>,
}

impl DiscoveryConfig {
    fn admits_service(&self, descriptor: &EndpointDescriptor, locator: Option<&Locator>) -> bool {
        self.groups.includes(&descriptor.groups)
            || locator.is_some_and(|l| self.locators.contains(l))
    }
}

/// Process-local discovery transport
#[derive(Default)]
pub struct InMemoryDiscoveryTransport {
    config: RwLock<DiscoveryConfig>,
    announcements: DashMap<ServiceId, Announcement>,
    listeners: RwLock<Vec<Arc<dyn DiscoveryListener>>>,
}

impl InMemoryDiscoveryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(groups: GroupSelection, locators: Vec<Locator>) -> Self {
        Self {
            config: RwLock::new(DiscoveryConfig { groups, locators }),
            ..Self::default()
        }
    }

    /// Announce a service by multicast in its descriptor's groups.
    ///
    /// Repeated announcements are delivered again.
    pub async fn announce(&self, descriptor: EndpointDescriptor) {
        self.announce_via(descriptor, None).await;
    }

    /// Announce a service that is also reachable through `locator`
    pub async fn announce_via(&self, descriptor: EndpointDescriptor, locator: Option<Locator>) {
        let visible = self.read_config().admits_service(&descriptor, locator.as_ref());
        // A re-announcement of a delivered service stays delivered
        let previously_delivered = self
            .announcements
            .get(&descriptor.service_id)
            .is_some_and(|previous| previous.delivered);
        self.announcements.insert(
            descriptor.service_id.clone(),
            Announcement {
                descriptor: descriptor.clone(),
                delivered: visible || previously_delivered,
            },
        );

        if visible {
            debug!(
                service = %descriptor.service_id,
                address = %descriptor.address,
                "Service announced"
            );
            for listener in self.listeners_snapshot() {
                listener.endpoint_found(descriptor.clone()).await;
            }
        }
    }

    /// Withdraw a service; listeners that saw it are told it is lost
    pub async fn withdraw(&self, service_id: &ServiceId) {
        let Some((_, announcement)) = self.announcements.remove(service_id) else {
            return;
        };
        if !announcement.delivered {
            return;
        }

        debug!(service = %service_id, "Service withdrawn");
        for listener in self.listeners_snapshot() {
            listener.endpoint_lost(announcement.descriptor.clone()).await;
        }
    }

    /// Services currently announced, visible or not
    pub fn announced(&self) -> Vec<EndpointDescriptor> {
        self.announcements
            .iter()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    fn read_config(&self) -> std::sync::RwLockReadGuard<'_, DiscoveryConfig> {
        self.config.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_config(&self) -> std::sync::RwLockWriteGuard<'_, DiscoveryConfig> {
        self.config.write().unwrap_or_else(|p| p.into_inner())
    }

    fn listeners_snapshot(&self) -> Vec<Arc<dyn DiscoveryListener>> {
        self.listeners
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

impl DiscoveryTransport for InMemoryDiscoveryTransport {
    fn groups(&self) -> GroupSelection {
        self.read_config().groups.clone()
    }

    // Narrowing the configuration never withdraws what was already delivered
    fn set_groups(&self, groups: GroupSelection) -> DiscoveryResult<()> {
        self.write_config().groups = groups;
        Ok(())
    }

    fn locators(&self) -> Vec<Locator> {
        self.read_config().locators.clone()
    }

    fn set_locators(&self, locators: Vec<Locator>) -> DiscoveryResult<()> {
        self.write_config().locators = locators;
        Ok(())
    }

    fn add_listener(&self, listener: Arc<dyn DiscoveryListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .push(listener);
    }
}
