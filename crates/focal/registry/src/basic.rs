//! A configurable manageable object
//!
//! `BasicObject` keeps attribute values in memory and runs registered
//! closures for operations. Writing an attribute emits an
//! `attribute.change` notification.

use crate::error::{ObjectError, ObjectResult};
use crate::object::{ManagedObject, NotificationBroadcaster, NotificationListener};
use async_trait::async_trait;
use dashmap::DashMap;
use focal_types::{
    Attribute, AttributeInfo, AttributeValue, Notification, NotificationFilter, NotificationInfo,
    ObjectInfo, ObjectName, OperationInfo, SubscriptionId, TypedArgument,
};
use serde_json::json;
use std::sync::Arc;

/// Notification type emitted when an attribute is written
pub const ATTRIBUTE_CHANGE: &str = "attribute.change";

/// Handler for one operation
pub type OperationHandler =
    Arc<dyn Fn(&[TypedArgument]) -> ObjectResult<AttributeValue> + Send + Sync>;

/// Manageable object backed by in-memory attribute storage
pub struct BasicObject {
    name: ObjectName,
    info: ObjectInfo,
    attributes: DashMap<String, AttributeValue>,
    operations: DashMap<String, OperationHandler>,
    broadcaster: NotificationBroadcaster,
}

impl BasicObject {
    /// Create an object; `name` is used as the source of its notifications
    pub fn new(name: ObjectName, info: ObjectInfo) -> Self {
        let info = info.with_notification(NotificationInfo {
            name: "AttributeChange".to_string(),
            description: "An attribute value was written".to_string(),
            types: vec![ATTRIBUTE_CHANGE.to_string()],
        });
        Self {
            name,
            info,
            attributes: DashMap::new(),
            operations: DashMap::new(),
            broadcaster: NotificationBroadcaster::new(),
        }
    }

    /// Add a writable attribute with an initial value
    pub fn with_attribute(self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.with_attribute_info(name, value, true)
    }

    /// Add an attribute that rejects writes
    pub fn with_read_only_attribute(self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.with_attribute_info(name, value, false)
    }

    fn with_attribute_info(
        mut self,
        name: impl Into<String>,
        value: AttributeValue,
        writable: bool,
    ) -> Self {
        let name = name.into();
        let type_name = json_type_name(&value);
        let attribute = if writable {
            AttributeInfo::read_write(name.clone(), type_name, "")
        } else {
            AttributeInfo::read_only(name.clone(), type_name, "")
        };
        self.info.attributes.push(attribute);
        self.attributes.insert(name, value);
        self
    }

    /// Add an operation and its handler
    pub fn with_operation(mut self, operation: OperationInfo, handler: OperationHandler) -> Self {
        self.operations.insert(operation.name.clone(), handler);
        self.info.operations.push(operation);
        self
    }

    pub fn name(&self) -> &ObjectName {
        &self.name
    }

    /// Emit a notification from this object
    pub fn notify(
        &self,
        notification_type: &str,
        message: &str,
        user_data: Option<AttributeValue>,
    ) {
        let mut notification = Notification::new(
            notification_type,
            self.name.clone(),
            self.broadcaster.next_sequence(),
            message,
        );
        notification.user_data = user_data;
        self.broadcaster.emit(&notification);
    }

    pub fn listener_count(&self) -> usize {
        self.broadcaster.listener_count()
    }
}

#[async_trait]
impl ManagedObject for BasicObject {
    async fn info(&self) -> ObjectResult<ObjectInfo> {
        Ok(self.info.clone())
    }

    async fn get_attribute(&self, attribute: &str) -> ObjectResult<AttributeValue> {
        self.attributes
            .get(attribute)
            .map(|v| v.value().clone())
            .ok_or_else(|| ObjectError::AttributeNotFound(attribute.to_string()))
    }

    async fn set_attribute(&self, attribute: Attribute) -> ObjectResult<()> {
        let declared = self
            .info
            .attribute(&attribute.name)
            .ok_or_else(|| ObjectError::AttributeNotFound(attribute.name.clone()))?;
        if !declared.writable {
            return Err(ObjectError::ReadOnlyAttribute(attribute.name));
        }

        let old = self
            .attributes
            .insert(attribute.name.clone(), attribute.value.clone());
        self.notify(
            ATTRIBUTE_CHANGE,
            &format!("{} changed", attribute.name),
            Some(json!({
                "attribute": attribute.name,
                "old": old,
                "new": attribute.value,
            })),
        );
        Ok(())
    }

    async fn invoke(
        &self,
        operation: &str,
        arguments: Vec<TypedArgument>,
    ) -> ObjectResult<AttributeValue> {
        let declared = self
            .info
            .operation(operation)
            .ok_or_else(|| ObjectError::OperationNotFound(operation.to_string()))?;

        if declared.signature.len() != arguments.len() {
            return Err(ObjectError::operation_failed(
                operation,
                format!(
                    "expected {} arguments, got {}",
                    declared.signature.len(),
                    arguments.len()
                ),
            ));
        }
        for (parameter, argument) in declared.signature.iter().zip(&arguments) {
            if parameter.type_name != argument.type_name {
                return Err(ObjectError::operation_failed(
                    operation,
                    format!(
                        "parameter {} expects {}, got {}",
                        parameter.name, parameter.type_name, argument.type_name
                    ),
                ));
            }
        }

        let handler = self
            .operations
            .get(operation)
            .map(|h| h.value().clone())
            .ok_or_else(|| ObjectError::OperationNotFound(operation.to_string()))?;
        handler(&arguments)
    }

    async fn add_notification_listener(
        &self,
        listener: Arc<dyn NotificationListener>,
        filter: Option<NotificationFilter>,
        handback: Option<String>,
    ) -> ObjectResult<SubscriptionId> {
        Ok(self.broadcaster.add_listener(listener, filter, handback))
    }

    async fn remove_notification_listener(&self, subscription: SubscriptionId) -> ObjectResult<()> {
        self.broadcaster.remove_listener(subscription)
    }
}

fn json_type_name(value: &AttributeValue) -> &'static str {
    match value {
        AttributeValue::Null => "null",
        AttributeValue::Bool(_) => "boolean",
        AttributeValue::Number(n) if n.is_f64() => "double",
        AttributeValue::Number(_) => "long",
        AttributeValue::String(_) => "string",
        AttributeValue::Array(_) => "array",
        AttributeValue::Object(_) => "object",
    }
}
