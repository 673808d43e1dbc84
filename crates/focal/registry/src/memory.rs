//! In-memory object registry
//!
//! Used by the bridge host as its local registry and by in-process
//! connections as the far-side registry.

use crate::error::{RegistryError, Result};
use crate::object::ManagedObject;
use crate::registry::{check_compliant, ObjectRegistry};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use focal_types::{ObjectName, ObjectNamePattern, RegistrationEvent};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Channel capacity for registration events
const REGISTRATION_CHANNEL_CAPACITY: usize = 1024;

/// In-memory object registry
pub struct InMemoryObjectRegistry {
    objects: DashMap<ObjectName, Arc<dyn ManagedObject>>,
    event_tx: broadcast::Sender<RegistrationEvent>,
}

impl InMemoryObjectRegistry {
    pub fn new() -> Self {
        Self::with_capacity(REGISTRATION_CHANNEL_CAPACITY)
    }

    /// Create a registry with a specific registration channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            objects: DashMap::new(),
            event_tx,
        }
    }
}

impl Default for InMemoryObjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectRegistry for InMemoryObjectRegistry {
    async fn register(&self, name: ObjectName, object: Arc<dyn ManagedObject>) -> Result<()> {
        check_compliant(&name)?;

        match self.objects.entry(name.clone()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyRegistered(name)),
            Entry::Vacant(slot) => {
                slot.insert(object);
                // Still under the shard lock, so events for one name stay ordered
                let _ = self.event_tx.send(RegistrationEvent::Registered(name));
                Ok(())
            }
        }
    }

    async fn unregister(&self, name: &ObjectName) -> Result<()> {
        let object = match self.objects.entry(name.clone()) {
            Entry::Vacant(_) => return Err(RegistryError::NotFound(name.clone())),
            Entry::Occupied(occupied) => {
                let _ = self
                    .event_tx
                    .send(RegistrationEvent::Unregistered(name.clone()));
                occupied.remove()
            }
        };

        debug!(name = %name, "Object unregistered");
        object.on_unregistered().await;
        Ok(())
    }

    async fn query_names(&self, pattern: Option<&ObjectNamePattern>) -> Result<Vec<ObjectName>> {
        let mut names: Vec<ObjectName> = self
            .objects
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|name| pattern.map_or(true, |p| p.matches(name)))
            .collect();
        names.sort();
        Ok(names)
    }

    async fn is_registered(&self, name: &ObjectName) -> bool {
        self.objects.contains_key(name)
    }

    async fn object_count(&self) -> usize {
        self.objects.len()
    }

    async fn lookup(&self, name: &ObjectName) -> Result<Arc<dyn ManagedObject>> {
        self.objects
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::NotFound(name.clone()))
    }

    fn subscribe_registrations(&self) -> broadcast::Receiver<RegistrationEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::BasicObject;
    use crate::error::ObjectError;
    use focal_types::{Attribute, ObjectInfo};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn name(s: &str) -> ObjectName {
        ObjectName::parse(s).unwrap()
    }

    fn cache(object_name: &str) -> Arc<BasicObject> {
        Arc::new(
            BasicObject::new(name(object_name), ObjectInfo::new("Cache", "test cache"))
                .with_attribute("Size", json!(3)),
        )
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = InMemoryObjectRegistry::new();
        let n = name("demo:type=Cache");

        registry.register(n.clone(), cache("demo:type=Cache")).await.unwrap();

        assert!(registry.is_registered(&n).await);
        assert_eq!(registry.object_count().await, 1);
        assert_eq!(registry.get_attribute(&n, "Size").await.unwrap(), json!(3));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let registry = InMemoryObjectRegistry::new();
        let n = name("demo:type=Cache");

        registry.register(n.clone(), cache("demo:type=Cache")).await.unwrap();
        let err = registry
            .register(n.clone(), cache("demo:type=Cache"))
            .await
            .unwrap_err();
        assert!(err.is_already_registered());
    }

    #[tokio::test]
    async fn test_unregister_missing_is_not_found() {
        let registry = InMemoryObjectRegistry::new();
        let err = registry.unregister(&name("demo:type=Cache")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_reserved_domain_not_compliant() {
        let registry = InMemoryObjectRegistry::new();
        let err = registry
            .register(name("registry:type=Delegate"), cache("registry:type=Delegate"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::NotCompliant(_)));
    }

    #[tokio::test]
    async fn test_query_with_pattern() {
        let registry = InMemoryObjectRegistry::new();
        for n in ["a_1:type=X", "a_1:type=Y", "a_10:type=X", "b:type=X"] {
            registry.register(name(n), cache(n)).await.unwrap();
        }

        let all = registry.query_names(None).await.unwrap();
        assert_eq!(all.len(), 4);

        let pattern = ObjectNamePattern::parse("a_1*:*").unwrap();
        let under_a = registry.query_names(Some(&pattern)).await.unwrap();
        assert_eq!(under_a.len(), 3);

        let pattern = ObjectNamePattern::parse("*:type=X").unwrap();
        assert_eq!(registry.query_names(Some(&pattern)).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_registration_events_published() {
        let registry = InMemoryObjectRegistry::new();
        let mut events = registry.subscribe_registrations();
        let n = name("demo:type=Cache");

        registry.register(n.clone(), cache("demo:type=Cache")).await.unwrap();
        registry.unregister(&n).await.unwrap();

        assert_eq!(events.recv().await.unwrap(), RegistrationEvent::Registered(n.clone()));
        assert_eq!(events.recv().await.unwrap(), RegistrationEvent::Unregistered(n));
    }

    struct Counting {
        unregistered: AtomicUsize,
    }

    #[async_trait]
    impl ManagedObject for Counting {
        async fn info(&self) -> crate::ObjectResult<ObjectInfo> {
            Ok(ObjectInfo::new("Counting", ""))
        }

        async fn get_attribute(&self, attribute: &str) -> crate::ObjectResult<serde_json::Value> {
            Err(ObjectError::AttributeNotFound(attribute.to_string()))
        }

        async fn set_attribute(&self, attribute: Attribute) -> crate::ObjectResult<()> {
            Err(ObjectError::AttributeNotFound(attribute.name))
        }

        async fn invoke(
            &self,
            operation: &str,
            _arguments: Vec<focal_types::TypedArgument>,
        ) -> crate::ObjectResult<serde_json::Value> {
            Err(ObjectError::OperationNotFound(operation.to_string()))
        }

        async fn on_unregistered(&self) {
            self.unregistered.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_unregister_runs_hook_once() {
        let registry = InMemoryObjectRegistry::new();
        let object = Arc::new(Counting {
            unregistered: AtomicUsize::new(0),
        });
        let n = name("demo:type=Counting");

        registry.register(n.clone(), object.clone()).await.unwrap();
        registry.unregister(&n).await.unwrap();
        assert!(registry.unregister(&n).await.is_err());

        assert_eq!(object.unregistered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dispatch_missing_object() {
        let registry = InMemoryObjectRegistry::new();
        let err = registry
            .get_attribute(&name("demo:type=Cache"), "Size")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
