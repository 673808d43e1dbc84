//! Focal Types - Core types for the management federation bridge
//!
//! Focal mirrors the manageable objects of remote management registries into
//! a single local registry. This crate holds the vocabulary every other Focal
//! crate speaks:
//!
//! - **ObjectName**: structured identifier (`domain:key=value,...`)
//! - **ObjectNamePattern**: query pattern with domain globs and property wildcards
//! - **Naming**: derivation of local identifiers from remote ones
//! - **Values**: attributes, typed invocation arguments, object metadata
//! - **Notifications**: object notifications and registry registration events
//! - **Endpoints**: descriptors of discovered remote registries
//!
//! ## Naming at a glance
//!
//! ```rust
//! use focal_types::{naming, DomainPrefix, ObjectName};
//!
//! let prefix = DomainPrefix::sanitize("service://10.0.0.5:1100");
//! assert_eq!(prefix.as_str(), "service___10_0_0_5_1100");
//!
//! let remote = ObjectName::parse("demo:type=Cache").unwrap();
//! let local = naming::to_local(&prefix, &remote).unwrap();
//! assert_eq!(local.to_string(), "service___10_0_0_5_1100:remoteDomain=demo,type=Cache");
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod endpoint;
pub mod error;
pub mod ids;
pub mod info;
pub mod name;
pub mod naming;
pub mod notification;
pub mod value;

// Re-export main types
pub use endpoint::EndpointDescriptor;
pub use error::{NamingError, Result};
pub use ids::{ServiceId, SubscriptionId};
pub use info::{
    AttributeInfo, NotificationInfo, ObjectInfo, OperationImpact, OperationInfo, ParameterInfo,
};
pub use name::{ObjectName, ObjectNamePattern};
pub use naming::{DomainPrefix, REMOTE_DOMAIN_KEY};
pub use notification::{Notification, NotificationFilter, RegistrationEvent};
pub use value::{Attribute, AttributeList, AttributeValue, TypedArgument};
