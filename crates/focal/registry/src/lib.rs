//! Focal Registry - Manageable objects and the local registry
//!
//! This crate provides the registry side of the federation bridge:
//!
//! - **ManagedObject**: the contract every manageable object implements
//!   (attributes, operations, notifications, metadata)
//! - **ObjectRegistry**: a store of manageable objects addressed by
//!   [`ObjectName`](focal_types::ObjectName), with atomic per-name
//!   register/unregister, pattern queries and dispatch
//! - **InMemoryObjectRegistry**: `DashMap`-backed registry used by the bridge
//!   host, by tests, and as the far side of in-process connections
//! - **BasicObject**: a configurable object with attribute storage and
//!   operation handlers

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod basic;
pub mod error;
pub mod memory;
pub mod object;
pub mod registry;

// Re-exports
pub use basic::{BasicObject, OperationHandler};
pub use error::{ObjectError, ObjectResult, RegistryError, Result};
pub use memory::InMemoryObjectRegistry;
pub use object::{ManagedObject, NotificationBroadcaster, NotificationListener};
pub use registry::{ObjectRegistry, RESERVED_DOMAIN};
