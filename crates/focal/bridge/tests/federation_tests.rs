//! End-to-end federation tests: discovery -> controller -> mirrors -> proxies.
//!
//! Every test wires an in-memory discovery transport, in-process remote
//! registries and an in-memory local registry together.

use async_trait::async_trait;
use focal_bridge::{
    ConnectionResult, Connector, DiscoveryMembership, DiscoveryTransport, FederationConfig,
    FederationController, FederationEvent, GroupSelection, InMemoryDiscoveryTransport,
    InProcessConnector, ManagementConnection, MembershipObject, MirrorState,
};
use focal_registry::{
    BasicObject, InMemoryObjectRegistry, ObjectError, ObjectRegistry, RegistryError,
};
use focal_types::{
    naming, DomainPrefix, EndpointDescriptor, ObjectInfo, ObjectName, ServiceId, TypedArgument,
};
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const WAIT: Duration = Duration::from_secs(2);

fn name(s: &str) -> ObjectName {
    ObjectName::parse(s).unwrap()
}

fn cache(object_name: &str, size: i64) -> Arc<BasicObject> {
    Arc::new(
        BasicObject::new(name(object_name), ObjectInfo::new("Cache", "remote cache"))
            .with_attribute("Size", json!(size)),
    )
}

fn descriptor(id: &str, address: &str) -> EndpointDescriptor {
    EndpointDescriptor::new(ServiceId::new(id), address).with_groups(["prod"])
}

/// Poll `condition` until it holds or the wait budget runs out
async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(WAIT, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Receive events until one matches
async fn expect_event<F>(
    rx: &mut broadcast::Receiver<FederationEvent>,
    mut matches: F,
) -> FederationEvent
where
    F: FnMut(&FederationEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let event = rx.recv().await.expect("event channel closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not received in time")
}

/// Connector whose first connection attempt stalls before succeeding
struct SlowFirstConnect {
    inner: Arc<InProcessConnector>,
    stalled: AtomicBool,
}

#[async_trait]
impl Connector for SlowFirstConnect {
    async fn connect(&self, address: &str) -> ConnectionResult<Arc<dyn ManagementConnection>> {
        if !self.stalled.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        self.inner.connect(address).await
    }
}

struct Harness {
    local: Arc<InMemoryObjectRegistry>,
    connector: Arc<InProcessConnector>,
    transport: Arc<InMemoryDiscoveryTransport>,
    membership: DiscoveryMembership,
    controller: Arc<FederationController>,
}

impl Harness {
    fn new() -> Self {
        let local = Arc::new(InMemoryObjectRegistry::new());
        let connector = Arc::new(InProcessConnector::new());
        let transport = Arc::new(InMemoryDiscoveryTransport::new());
        let membership = DiscoveryMembership::new(transport.clone());
        let controller = Arc::new(FederationController::new(
            FederationConfig::default(),
            local.clone(),
            connector.clone(),
        ));
        membership.listen(controller.clone());

        Self {
            local,
            connector,
            transport,
            membership,
            controller,
        }
    }

    /// Publish a remote registry holding `objects` under `address`
    async fn remote(&self, address: &str, objects: &[&str]) -> Arc<InMemoryObjectRegistry> {
        let registry = Arc::new(InMemoryObjectRegistry::new());
        for (i, object) in objects.iter().enumerate() {
            registry
                .register(name(object), cache(object, i as i64))
                .await
                .unwrap();
        }
        self.connector.publish(address, registry.clone());
        registry
    }

    async fn wait_for_state(&self, id: &str, state: MirrorState) {
        let mut rx = self
            .controller
            .watch_mirror(&ServiceId::new(id))
            .expect("mirror exists");
        tokio::time::timeout(WAIT, rx.wait_for(|s| *s == state))
            .await
            .expect("state not reached in time")
            .expect("mirror state channel closed");
    }

    async fn proxies(&self, address: &str) -> Vec<ObjectName> {
        let prefix = DomainPrefix::sanitize(address);
        self.local
            .query_names(Some(&naming::wildcard_of(&prefix)))
            .await
            .unwrap()
            .into_iter()
            .filter(|n| n.domain() == prefix.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn discovered_endpoint_is_mirrored_under_sanitized_prefix() {
    let harness = Harness::new();
    let address = "service://10.0.0.5:1100";
    harness.remote(address, &["demo:type=Cache"]).await;

    harness.transport.announce(descriptor("s1", address)).await;
    harness.wait_for_state("s1", MirrorState::Synced).await;

    let local_name = name("service___10_0_0_5_1100:remoteDomain=demo,type=Cache");
    assert_eq!(harness.proxies(address).await, vec![local_name.clone()]);
    assert_eq!(local_name.domain(), "service___10_0_0_5_1100");
    assert_eq!(local_name.property("remoteDomain"), Some("demo"));
    assert_eq!(local_name.property("type"), Some("Cache"));

    // Calls on the proxy reach the remote object
    assert_eq!(
        harness.local.get_attribute(&local_name, "Size").await.unwrap(),
        json!(0)
    );
}

#[tokio::test]
async fn remote_additions_and_removals_are_followed() {
    let harness = Harness::new();
    let address = "svc://node-1:1100";
    let remote = harness.remote(address, &["demo:type=Cache"]).await;

    harness.transport.announce(descriptor("s1", address)).await;
    harness.wait_for_state("s1", MirrorState::Synced).await;

    remote
        .register(name("demo:type=Queue"), cache("demo:type=Queue", 9))
        .await
        .unwrap();
    let queue = name("svc___node-1_1100:remoteDomain=demo,type=Queue");
    let (local, queue_ref) = (&harness.local, &queue);
    eventually(move || async move { local.is_registered(queue_ref).await }).await;
    assert_eq!(harness.local.get_attribute(&queue, "Size").await.unwrap(), json!(9));

    remote.unregister(&name("demo:type=Queue")).await.unwrap();
    eventually(move || async move { !local.is_registered(queue_ref).await }).await;
    assert_eq!(harness.proxies(address).await.len(), 1);
}

#[tokio::test]
async fn endpoint_lost_unregisters_every_proxy_and_closes_connection() {
    let harness = Harness::new();
    let address = "svc://node-1:1100";
    harness
        .remote(address, &["demo:type=Cache", "demo:type=Queue", "app:name=orders"])
        .await;

    harness.transport.announce(descriptor("s1", address)).await;
    harness.wait_for_state("s1", MirrorState::Synced).await;
    assert_eq!(harness.proxies(address).await.len(), 3);

    harness.transport.withdraw(&ServiceId::new("s1")).await;

    let prefix = DomainPrefix::sanitize(address);
    let leftover = harness
        .local
        .query_names(Some(&naming::wildcard_of(&prefix)))
        .await
        .unwrap();
    assert!(leftover.is_empty());
    assert!(harness
        .connector
        .connections_to(address)
        .iter()
        .all(|c| !c.is_open()));
    assert_eq!(harness.controller.mirror_count(), 0);
}

#[tokio::test]
async fn teardown_spares_endpoint_with_longer_prefix() {
    let harness = Harness::new();
    harness.remote("svc://a:1100", &["demo:type=Cache"]).await;
    harness.remote("svc://a:11000", &["demo:type=Cache"]).await;

    harness.transport.announce(descriptor("short", "svc://a:1100")).await;
    harness.transport.announce(descriptor("long", "svc://a:11000")).await;
    harness.wait_for_state("short", MirrorState::Synced).await;
    harness.wait_for_state("long", MirrorState::Synced).await;

    harness.transport.withdraw(&ServiceId::new("short")).await;

    assert!(harness.proxies("svc://a:1100").await.is_empty());
    assert_eq!(harness.proxies("svc://a:11000").await.len(), 1);
}

#[tokio::test]
async fn remote_addition_after_teardown_leaves_no_proxy() {
    let harness = Harness::new();
    let address = "svc://node-1:1100";
    let remote = harness.remote(address, &["demo:type=Cache"]).await;

    harness.transport.announce(descriptor("s1", address)).await;
    harness.wait_for_state("s1", MirrorState::Synced).await;

    harness.transport.withdraw(&ServiceId::new("s1")).await;
    remote
        .register(name("demo:type=Late"), cache("demo:type=Late", 1))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.proxies(address).await.is_empty());
}

#[tokio::test]
async fn remote_addition_racing_teardown_leaves_no_proxy() {
    let harness = Harness::new();
    let address = "svc://node-1:1100";
    let remote = harness.remote(address, &["demo:type=Cache"]).await;

    harness.transport.announce(descriptor("s1", address)).await;
    harness.wait_for_state("s1", MirrorState::Synced).await;

    for i in 0..20 {
        let n = format!("demo:type=Burst,index={}", i);
        remote.register(name(&n), cache(&n, i)).await.unwrap();
    }
    harness.transport.withdraw(&ServiceId::new("s1")).await;

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(harness.proxies(address).await.is_empty());
}

#[tokio::test]
async fn removal_of_never_mirrored_object_is_a_noop() {
    let harness = Harness::new();
    let address = "svc://node-1:1100";
    let remote = harness
        .remote(address, &["demo:type=Cache", "demo:type=Queue"])
        .await;
    let mut events = harness.controller.subscribe();

    harness.transport.announce(descriptor("s1", address)).await;
    harness.wait_for_state("s1", MirrorState::Synced).await;

    // Another path already removed the proxy
    let queue = name("svc___node-1_1100:remoteDomain=demo,type=Queue");
    harness.local.unregister(&queue).await.unwrap();
    remote.unregister(&name("demo:type=Queue")).await.unwrap();

    // The mirror keeps working afterwards
    remote
        .register(name("demo:type=Index"), cache("demo:type=Index", 2))
        .await
        .unwrap();
    expect_event(&mut events, |e| {
        matches!(
            e,
            FederationEvent::ProxyRegistered { remote, .. } if remote == &name("demo:type=Index")
        )
    })
    .await;

    assert_eq!(
        harness.controller.mirror_state(&ServiceId::new("s1")),
        Some(MirrorState::Synced)
    );
    assert_eq!(harness.proxies(address).await.len(), 2);
}

#[tokio::test]
async fn duplicate_found_events_yield_one_mirror() {
    let harness = Harness::new();
    let address = "svc://node-1:1100";
    harness
        .remote(address, &["demo:type=Cache", "demo:type=Queue"])
        .await;
    let mut events = harness.controller.subscribe();

    harness.transport.announce(descriptor("s1", address)).await;
    harness.transport.announce(descriptor("s1", address)).await;
    harness.wait_for_state("s1", MirrorState::Synced).await;

    assert_eq!(harness.controller.mirror_count(), 1);
    assert_eq!(harness.proxies(address).await.len(), 2);
    assert_eq!(harness.connector.connections_to(address).len(), 1);

    let mut connecting = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            FederationEvent::MirrorConnecting { .. } => connecting += 1,
            FederationEvent::ProxySkipped { remote, reason } => {
                panic!("unexpected skip of {remote}: {reason}")
            }
            _ => {}
        }
    }
    assert_eq!(connecting, 1);
}

#[tokio::test]
async fn stale_local_registration_is_replaced() {
    let harness = Harness::new();
    let address = "svc://node-1:1100";
    harness.remote(address, &["demo:type=Cache"]).await;

    // Leftover from an earlier mirror that never cleaned up
    let local_name = name("svc___node-1_1100:remoteDomain=demo,type=Cache");
    harness
        .local
        .register(local_name.clone(), cache("stale:type=Cache", 42))
        .await
        .unwrap();

    harness.transport.announce(descriptor("s1", address)).await;
    harness.wait_for_state("s1", MirrorState::Synced).await;

    assert_eq!(
        harness.local.get_attribute(&local_name, "Size").await.unwrap(),
        json!(0)
    );
}

#[tokio::test]
async fn unreachable_endpoint_is_abandoned_until_rediscovered() {
    let harness = Harness::new();
    let address = "svc://node-1:1100";
    harness.remote(address, &["demo:type=Cache"]).await;
    harness.connector.set_unreachable(address, "connection refused");
    let mut events = harness.controller.subscribe();

    harness.transport.announce(descriptor("s1", address)).await;
    expect_event(&mut events, |e| matches!(e, FederationEvent::ConnectFailed { .. })).await;
    harness.wait_for_state("s1", MirrorState::Abandoned).await;
    assert!(harness.proxies(address).await.is_empty());

    // A later announcement retries
    harness.connector.set_reachable(address);
    harness.transport.announce(descriptor("s1", address)).await;
    harness.wait_for_state("s1", MirrorState::Synced).await;
    assert_eq!(harness.proxies(address).await.len(), 1);
}

#[tokio::test]
async fn endpoint_rediscovered_after_loss_gets_fresh_mirror() {
    let harness = Harness::new();
    let address = "svc://node-1:1100";
    harness
        .remote(address, &["demo:type=Cache", "demo:type=Queue"])
        .await;
    let mut events = harness.controller.subscribe();

    harness.transport.announce(descriptor("s1", address)).await;
    harness.wait_for_state("s1", MirrorState::Synced).await;
    assert_eq!(harness.proxies(address).await.len(), 2);

    harness.transport.withdraw(&ServiceId::new("s1")).await;
    assert!(harness.proxies(address).await.is_empty());
    assert_eq!(harness.controller.mirror_count(), 0);

    harness.transport.announce(descriptor("s1", address)).await;
    harness.wait_for_state("s1", MirrorState::Synced).await;
    expect_event(&mut events, |e| {
        matches!(e, FederationEvent::MirrorTornDown { removed: 2, .. })
    })
    .await;
    expect_event(&mut events, |e| {
        matches!(e, FederationEvent::MirrorSynced { proxies: 2, .. })
    })
    .await;

    assert_eq!(harness.proxies(address).await.len(), 2);
    let open = harness
        .connector
        .connections_to(address)
        .iter()
        .filter(|c| c.is_open())
        .count();
    assert_eq!(open, 1);

    let local_name = name("svc___node-1_1100:remoteDomain=demo,type=Queue");
    assert_eq!(
        harness.local.get_attribute(&local_name, "Size").await.unwrap(),
        json!(1)
    );
}

#[tokio::test]
async fn rediscovery_racing_teardown_keeps_new_proxies() {
    let address = "svc://node-1:1100";
    let remote = Arc::new(InMemoryObjectRegistry::new());
    remote
        .register(name("demo:type=Cache"), cache("demo:type=Cache", 7))
        .await
        .unwrap();
    let inner = Arc::new(InProcessConnector::new());
    inner.publish(address, remote);

    let local = Arc::new(InMemoryObjectRegistry::new());
    let controller = Arc::new(FederationController::new(
        FederationConfig::default(),
        local.clone(),
        Arc::new(SlowFirstConnect {
            inner,
            stalled: AtomicBool::new(false),
        }),
    ));
    let endpoint = descriptor("s1", address);

    // First mirror is still connecting when the endpoint is lost
    controller.handle_endpoint_found(endpoint.clone()).await;
    let lost = {
        let controller = controller.clone();
        let endpoint = endpoint.clone();
        tokio::spawn(async move { controller.handle_endpoint_lost(endpoint).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Rediscovery waits for that teardown to finish
    controller.handle_endpoint_found(endpoint.clone()).await;
    assert_eq!(lost.await.unwrap(), 1);

    let mut state = controller.watch_mirror(&ServiceId::new("s1")).unwrap();
    tokio::time::timeout(WAIT, state.wait_for(|s| *s == MirrorState::Synced))
        .await
        .expect("state not reached in time")
        .unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(
        controller.mirror_state(&ServiceId::new("s1")),
        Some(MirrorState::Synced)
    );
    let local_name = name("svc___node-1_1100:remoteDomain=demo,type=Cache");
    assert!(local.is_registered(&local_name).await);
    assert_eq!(
        local.get_attribute(&local_name, "Size").await.unwrap(),
        json!(7)
    );
}

#[tokio::test]
async fn connection_failure_keeps_proxies_until_endpoint_lost() {
    let harness = Harness::new();
    let address = "svc://node-1:1100";
    harness.remote(address, &["demo:type=Cache"]).await;

    harness.transport.announce(descriptor("s1", address)).await;
    harness.wait_for_state("s1", MirrorState::Synced).await;

    harness.connector.fail(address, "remote process died");
    harness.connector.fail(address, "remote process died");
    harness.wait_for_state("s1", MirrorState::Failed).await;

    let local_name = name("svc___node-1_1100:remoteDomain=demo,type=Cache");
    assert!(harness.local.is_registered(&local_name).await);

    let err = harness
        .local
        .get_attribute(&local_name, "Size")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Object(ObjectError::RemoteUnavailable { .. })
    ));

    harness.transport.withdraw(&ServiceId::new("s1")).await;
    assert!(harness.proxies(address).await.is_empty());
}

#[tokio::test]
async fn failure_after_endpoint_lost_is_harmless() {
    let harness = Harness::new();
    let address = "svc://node-1:1100";
    harness.remote(address, &["demo:type=Cache"]).await;

    harness.transport.announce(descriptor("s1", address)).await;
    harness.wait_for_state("s1", MirrorState::Synced).await;

    harness.transport.withdraw(&ServiceId::new("s1")).await;
    harness.connector.fail(address, "remote process died");

    assert!(harness.proxies(address).await.is_empty());
    assert_eq!(harness.controller.mirror_count(), 0);
}

#[tokio::test]
async fn removing_a_group_does_not_tear_down_discovered_endpoints() {
    let harness = Harness::new();
    let address = "svc://node-1:1100";
    harness.remote(address, &["demo:type=Cache"]).await;
    harness.remote("svc://node-2:1100", &["demo:type=Cache"]).await;

    harness.membership.add_group("prod").unwrap();
    harness.transport.announce(descriptor("s1", address)).await;
    harness.wait_for_state("s1", MirrorState::Synced).await;

    harness.membership.remove_group("prod").unwrap();
    assert_eq!(harness.membership.list_groups(), GroupSelection::Named(vec![]));
    assert_eq!(harness.proxies(address).await.len(), 1);

    // New announcements in the removed group are no longer seen
    harness
        .transport
        .announce(descriptor("s2", "svc://node-2:1100"))
        .await;
    assert!(harness.controller.mirror_state(&ServiceId::new("s2")).is_none());
}

#[tokio::test]
async fn membership_is_operable_through_local_registry() {
    let harness = Harness::new();
    let membership_name = focal_bridge::membership_name("focal").unwrap();
    harness
        .local
        .register(
            membership_name.clone(),
            Arc::new(MembershipObject::new(harness.membership.clone())),
        )
        .await
        .unwrap();

    harness
        .local
        .invoke(
            &membership_name,
            "addLocator",
            vec![TypedArgument::string("lookup://registry-host")],
        )
        .await
        .unwrap();
    assert_eq!(harness.transport.locators().len(), 1);
    assert_eq!(
        harness
            .local
            .get_attribute(&membership_name, "Locators")
            .await
            .unwrap(),
        json!(["lookup://registry-host:4160"])
    );
}

#[tokio::test]
async fn shutdown_removes_all_mirrored_proxies() {
    let harness = Harness::new();
    harness.remote("svc://a:1", &["demo:type=Cache"]).await;
    harness.remote("svc://b:1", &["demo:type=Cache", "demo:type=Queue"]).await;

    harness.transport.announce(descriptor("a", "svc://a:1")).await;
    harness.transport.announce(descriptor("b", "svc://b:1")).await;
    harness.wait_for_state("a", MirrorState::Synced).await;
    harness.wait_for_state("b", MirrorState::Synced).await;
    assert_eq!(harness.local.object_count().await, 3);

    harness.controller.shutdown().await;
    assert_eq!(harness.local.object_count().await, 0);
}
