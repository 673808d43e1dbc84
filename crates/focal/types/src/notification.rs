//! Object notifications and registry registration events

use crate::name::ObjectName;
use crate::value::AttributeValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A notification emitted by a manageable object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Dotted type string, e.g. `cache.evicted`
    pub notification_type: String,
    pub source: ObjectName,
    pub sequence_number: u64,
    pub timestamp: DateTime<Utc>,
    pub message: String,
    #[serde(default)]
    pub user_data: Option<AttributeValue>,
}

impl Notification {
    pub fn new(
        notification_type: impl Into<String>,
        source: ObjectName,
        sequence_number: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            notification_type: notification_type.into(),
            source,
            sequence_number,
            timestamp: Utc::now(),
            message: message.into(),
            user_data: None,
        }
    }

    pub fn with_user_data(mut self, data: AttributeValue) -> Self {
        self.user_data = Some(data);
        self
    }
}

/// Filter passing notifications whose type starts with an enabled prefix
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFilter {
    pub enabled_types: Vec<String>,
}

impl NotificationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_type(mut self, prefix: impl Into<String>) -> Self {
        self.enabled_types.push(prefix.into());
        self
    }

    pub fn is_enabled(&self, notification: &Notification) -> bool {
        self.enabled_types
            .iter()
            .any(|prefix| notification.notification_type.starts_with(prefix.as_str()))
    }
}

/// Registration change published by a registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum RegistrationEvent {
    Registered(ObjectName),
    Unregistered(ObjectName),
}

impl RegistrationEvent {
    pub fn name(&self) -> &ObjectName {
        match self {
            Self::Registered(name) | Self::Unregistered(name) => name,
        }
    }

    pub fn is_registration(&self) -> bool {
        matches!(self, Self::Registered(_))
    }
}
