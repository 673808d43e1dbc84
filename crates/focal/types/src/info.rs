//! Descriptive metadata of manageable objects

use serde::{Deserialize, Serialize};

/// Metadata describing what a manageable object exposes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Implementation class or kind of the object
    pub class_name: String,

    /// Human readable description
    pub description: String,

    #[serde(default)]
    pub attributes: Vec<AttributeInfo>,

    #[serde(default)]
    pub operations: Vec<OperationInfo>,

    #[serde(default)]
    pub notifications: Vec<NotificationInfo>,
}

impl ObjectInfo {
    pub fn new(class_name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, attribute: AttributeInfo) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_operation(mut self, operation: OperationInfo) -> Self {
        self.operations.push(operation);
        self
    }

    pub fn with_notification(mut self, notification: NotificationInfo) -> Self {
        self.notifications.push(notification);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeInfo> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn operation(&self, name: &str) -> Option<&OperationInfo> {
        self.operations.iter().find(|o| o.name == name)
    }
}

/// Description of one attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeInfo {
    pub name: String,
    pub type_name: String,
    pub description: String,
    pub readable: bool,
    pub writable: bool,
}

impl AttributeInfo {
    pub fn read_only(
        name: impl Into<String>,
        type_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            description: description.into(),
            readable: true,
            writable: false,
        }
    }

    pub fn read_write(
        name: impl Into<String>,
        type_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            writable: true,
            ..Self::read_only(name, type_name, description)
        }
    }
}

/// Effect an operation has on the object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationImpact {
    /// Returns information, no state change
    Info,
    /// Changes state
    Action,
    /// Both
    ActionInfo,
    #[default]
    Unknown,
}

/// Description of one invokable operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationInfo {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub signature: Vec<ParameterInfo>,
    pub return_type: String,
    #[serde(default)]
    pub impact: OperationImpact,
}

impl OperationInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            signature: Vec::new(),
            return_type: "void".to_string(),
            impact: OperationImpact::Unknown,
        }
    }

    pub fn with_parameter(mut self, parameter: ParameterInfo) -> Self {
        self.signature.push(parameter);
        self
    }

    pub fn returning(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    pub fn with_impact(mut self, impact: OperationImpact) -> Self {
        self.impact = impact;
        self
    }
}

/// Description of one operation parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    pub type_name: String,
    pub description: String,
}

impl ParameterInfo {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            description: description.into(),
        }
    }
}

/// Notifications an object may emit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationInfo {
    pub name: String,
    pub description: String,
    pub types: Vec<String>,
}
