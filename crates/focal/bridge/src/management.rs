//! Management surface of the bridge itself
//!
//! The bridge registers two objects in its own local registry so operators
//! can drive it with the same tools they use for everything else:
//!
//! - `<domain>:type=DiscoveryMembership` edits discovery groups and locators
//! - `<domain>:type=FederationBridge` lists mirrors and requests shutdown

use crate::controller::FederationController;
use crate::discovery::{DiscoveryMembership, GroupSelection};
use crate::error::DiscoveryError;
use async_trait::async_trait;
use focal_registry::{ManagedObject, ObjectError, ObjectResult};
use focal_types::{
    Attribute, AttributeInfo, AttributeValue, NamingError, ObjectInfo, ObjectName, OperationImpact,
    OperationInfo, ParameterInfo, TypedArgument,
};
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use tokio::sync::Notify;
use tracing::info;

/// Name of the membership object in `domain`
pub fn membership_name(domain: &str) -> Result<ObjectName, NamingError> {
    ObjectName::new(domain, [("type", "DiscoveryMembership")])
}

/// Name of the bridge object in `domain`
pub fn bridge_name(domain: &str) -> Result<ObjectName, NamingError> {
    ObjectName::new(domain, [("type", "FederationBridge")])
}

/// Manageable view of [`DiscoveryMembership`]
pub struct MembershipObject {
    membership: DiscoveryMembership,
    info: ObjectInfo,
}

impl MembershipObject {
    pub fn new(membership: DiscoveryMembership) -> Self {
        let string_op = |name: &str, description: &str, parameter: &str| {
            OperationInfo::new(name, description)
                .with_parameter(ParameterInfo::new(parameter, "string", ""))
                .with_impact(OperationImpact::Action)
        };
        let info = ObjectInfo::new("DiscoveryMembership", "Discovery groups and locators")
            .with_attribute(AttributeInfo::read_write(
                "Groups",
                "string[]",
                "Discovered groups, null for all groups",
            ))
            .with_attribute(AttributeInfo::read_write(
                "Locators",
                "string[]",
                "Unicast locators, lookup://host[:port]",
            ))
            .with_operation(string_op("addGroup", "Add a discovery group", "group"))
            .with_operation(string_op("removeGroup", "Remove a discovery group", "group"))
            .with_operation(
                OperationInfo::new("setAllGroups", "Discover all groups")
                    .with_impact(OperationImpact::Action),
            )
            .with_operation(string_op("addLocator", "Add a unicast locator", "url"))
            .with_operation(string_op("removeLocator", "Remove a unicast locator", "url"));

        Self { membership, info }
    }
}

fn string_list(attribute: &str, value: &Value) -> ObjectResult<Vec<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| ObjectError::invalid_value(attribute, "expected an array of strings"))?;
    items
        .iter()
        .map(|item| {
            item.as_str().map(String::from).ok_or_else(|| {
                ObjectError::invalid_value(attribute, "expected an array of strings")
            })
        })
        .collect()
}

fn single_string<'a>(operation: &str, arguments: &'a [TypedArgument]) -> ObjectResult<&'a str> {
    match arguments {
        [argument] => argument
            .value
            .as_str()
            .ok_or_else(|| ObjectError::operation_failed(operation, "argument must be a string")),
        _ => Err(ObjectError::operation_failed(
            operation,
            format!("expected 1 argument, got {}", arguments.len()),
        )),
    }
}

fn discovery_failed(operation: &str, error: DiscoveryError) -> ObjectError {
    ObjectError::operation_failed(operation, error.to_string())
}

#[async_trait]
impl ManagedObject for MembershipObject {
    async fn info(&self) -> ObjectResult<ObjectInfo> {
        Ok(self.info.clone())
    }

    async fn get_attribute(&self, attribute: &str) -> ObjectResult<AttributeValue> {
        match attribute {
            "Groups" => Ok(match self.membership.list_groups() {
                GroupSelection::All => Value::Null,
                GroupSelection::Named(groups) => json!(groups),
            }),
            "Locators" => Ok(json!(self
                .membership
                .list_locators()
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>())),
            other => Err(ObjectError::AttributeNotFound(other.to_string())),
        }
    }

    async fn set_attribute(&self, attribute: Attribute) -> ObjectResult<()> {
        match attribute.name.as_str() {
            "Groups" if attribute.value.is_null() => self.membership.set_all_groups(),
            "Groups" => self
                .membership
                .set_groups(string_list("Groups", &attribute.value)?),
            "Locators" => self
                .membership
                .set_locators(string_list("Locators", &attribute.value)?),
            _ => return Err(ObjectError::AttributeNotFound(attribute.name)),
        }
        .map_err(|e| ObjectError::invalid_value(attribute.name.clone(), e.to_string()))
    }

    async fn invoke(
        &self,
        operation: &str,
        arguments: Vec<TypedArgument>,
    ) -> ObjectResult<AttributeValue> {
        let result = match operation {
            "addGroup" => self.membership.add_group(single_string(operation, &arguments)?),
            "removeGroup" => self
                .membership
                .remove_group(single_string(operation, &arguments)?),
            "setAllGroups" => self.membership.set_all_groups(),
            "addLocator" => self
                .membership
                .add_locator(single_string(operation, &arguments)?),
            "removeLocator" => self
                .membership
                .remove_locator(single_string(operation, &arguments)?),
            other => return Err(ObjectError::OperationNotFound(other.to_string())),
        };
        result
            .map(|()| Value::Null)
            .map_err(|e| discovery_failed(operation, e))
    }
}

/// One-shot shutdown request observed by the host process
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    notify: Arc<Notify>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown; a later `requested().await` completes immediately
    pub fn trigger(&self) {
        self.notify.notify_one();
    }

    /// Wait until shutdown is requested
    pub async fn requested(&self) {
        self.notify.notified().await;
    }
}

/// Manageable view of the federation controller
pub struct BridgeObject {
    controller: Weak<FederationController>,
    shutdown: ShutdownSignal,
    info: ObjectInfo,
}

impl BridgeObject {
    pub fn new(controller: &Arc<FederationController>, shutdown: ShutdownSignal) -> Self {
        let info = ObjectInfo::new("FederationBridge", "Federation of remote registries")
            .with_attribute(AttributeInfo::read_only(
                "Mirrors",
                "object[]",
                "Mirrored endpoints and their state",
            ))
            .with_attribute(AttributeInfo::read_only(
                "MirrorCount",
                "long",
                "Number of mirrored endpoints",
            ))
            .with_operation(
                OperationInfo::new("shutdown", "Stop the bridge")
                    .with_impact(OperationImpact::Action),
            );

        Self {
            controller: Arc::downgrade(controller),
            shutdown,
            info,
        }
    }
}

#[async_trait]
impl ManagedObject for BridgeObject {
    async fn info(&self) -> ObjectResult<ObjectInfo> {
        Ok(self.info.clone())
    }

    async fn get_attribute(&self, attribute: &str) -> ObjectResult<AttributeValue> {
        let mirrors = self
            .controller
            .upgrade()
            .map(|controller| controller.mirrors())
            .unwrap_or_default();
        match attribute {
            "Mirrors" => serde_json::to_value(&mirrors)
                .map_err(|e| ObjectError::invalid_value("Mirrors", e.to_string())),
            "MirrorCount" => Ok(json!(mirrors.len())),
            other => Err(ObjectError::AttributeNotFound(other.to_string())),
        }
    }

    async fn set_attribute(&self, attribute: Attribute) -> ObjectResult<()> {
        match attribute.name.as_str() {
            "Mirrors" | "MirrorCount" => Err(ObjectError::ReadOnlyAttribute(attribute.name)),
            _ => Err(ObjectError::AttributeNotFound(attribute.name)),
        }
    }

    async fn invoke(
        &self,
        operation: &str,
        _arguments: Vec<TypedArgument>,
    ) -> ObjectResult<AttributeValue> {
        match operation {
            "shutdown" => {
                info!("Shutdown requested through the management interface");
                self.shutdown.trigger();
                Ok(Value::Null)
            }
            other => Err(ObjectError::OperationNotFound(other.to_string())),
        }
    }
}
