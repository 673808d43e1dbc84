//! Simulated remote endpoints
//!
//! Publishes in-process registries through the connector, announces them on
//! the discovery transport and churns them so the bridge has something to
//! mirror without a network.

use crate::config::SimulationConfig;
use focal_bridge::{InMemoryDiscoveryTransport, InProcessConnector};
use focal_registry::{
    BasicObject, InMemoryObjectRegistry, ObjectRegistry, ObjectResult, OperationHandler,
};
use focal_types::{
    Attribute, AttributeValue, EndpointDescriptor, NamingError, ObjectInfo, ObjectName,
    OperationImpact, OperationInfo, ParameterInfo, ServiceId, TypedArgument,
};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use serde_json::json;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

const SIMULATED_DOMAIN: &str = "demo";
const BASE_PORT: u16 = 1100;

/// One simulated remote registry
struct SimulatedEndpoint {
    descriptor: EndpointDescriptor,
    registry: Arc<InMemoryObjectRegistry>,
    objects: Vec<ObjectName>,
    next_object: usize,
    announced: bool,
}

/// Simulation engine for remote endpoints
pub struct Simulation {
    config: SimulationConfig,
    connector: Arc<InProcessConnector>,
    transport: Arc<InMemoryDiscoveryTransport>,
    endpoints: Vec<SimulatedEndpoint>,
}

impl Simulation {
    pub fn new(
        config: SimulationConfig,
        connector: Arc<InProcessConnector>,
        transport: Arc<InMemoryDiscoveryTransport>,
    ) -> Self {
        Self {
            config,
            connector,
            transport,
            endpoints: Vec::new(),
        }
    }

    /// Publish and announce every endpoint
    pub async fn publish(&mut self) -> Result<(), NamingError> {
        for index in 0..self.config.endpoints {
            let port = BASE_PORT.saturating_add(u16::try_from(index).unwrap_or(u16::MAX));
            let address = format!("service://127.0.0.1:{}", port);
            let descriptor =
                EndpointDescriptor::new(ServiceId::new(format!("sim-{}", index)), &address)
                    .with_groups([self.config.group.clone()]);

            let mut endpoint = SimulatedEndpoint {
                descriptor,
                registry: Arc::new(InMemoryObjectRegistry::new()),
                objects: Vec::new(),
                next_object: 0,
                announced: false,
            };
            for _ in 0..self.config.objects_per_endpoint {
                add_object(&mut endpoint).await?;
            }

            self.connector.publish(address.clone(), endpoint.registry.clone());
            self.transport.announce(endpoint.descriptor.clone()).await;
            endpoint.announced = true;

            tracing::info!(
                service = %endpoint.descriptor.service_id,
                address = %address,
                objects = endpoint.objects.len(),
                "Simulated endpoint published"
            );
            self.endpoints.push(endpoint);
        }
        Ok(())
    }

    /// Publish, then churn until the task is aborted
    pub async fn run(mut self) {
        if let Err(err) = self.publish().await {
            tracing::warn!(error = %err, "Simulation could not publish endpoints");
            return;
        }
        if self.config.churn_interval_secs == 0 || self.endpoints.is_empty() {
            return;
        }

        let mut rng = StdRng::from_entropy();
        let mut ticker = interval(Duration::from_secs(self.config.churn_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = self.churn(&mut rng).await {
                tracing::warn!(error = %err, "Simulation churn step failed");
            }
        }
    }

    /// Apply one random change to one random endpoint
    pub async fn churn(&mut self, rng: &mut StdRng) -> Result<(), NamingError> {
        let Some(endpoint) = self.endpoints.choose_mut(rng) else {
            return Ok(());
        };
        let service = endpoint.descriptor.service_id.clone();

        match rng.gen_range(0..10) {
            // Endpoint goes away or comes back
            0 => {
                if endpoint.announced {
                    self.transport.withdraw(&service).await;
                    tracing::debug!(service = %service, "Simulated endpoint withdrawn");
                } else {
                    self.transport.announce(endpoint.descriptor.clone()).await;
                    tracing::debug!(service = %service, "Simulated endpoint re-announced");
                }
                endpoint.announced = !endpoint.announced;
            }
            1..=3 => {
                let name = add_object(endpoint).await?;
                tracing::debug!(service = %service, name = %name, "Simulated object added");
            }
            4..=5 => {
                if endpoint.objects.is_empty() {
                    return Ok(());
                }
                let index = rng.gen_range(0..endpoint.objects.len());
                let name = endpoint.objects.swap_remove(index);
                if let Err(err) = endpoint.registry.unregister(&name).await {
                    tracing::debug!(name = %name, error = %err, "Simulated object already gone");
                }
                tracing::debug!(service = %service, name = %name, "Simulated object removed");
            }
            _ => {
                let Some(name) = endpoint.objects.choose(rng) else {
                    return Ok(());
                };
                let hits: u64 = rng.gen_range(0..10_000);
                if let Err(err) = endpoint
                    .registry
                    .set_attribute(name, Attribute::new("Hits", json!(hits)))
                    .await
                {
                    tracing::debug!(name = %name, error = %err, "Simulated write failed");
                }
            }
        }
        Ok(())
    }

    /// Number of published endpoints
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Names hosted by each endpoint, keyed by address
    pub fn hosted(&self) -> Vec<(String, Vec<ObjectName>)> {
        self.endpoints
            .iter()
            .map(|e| (e.descriptor.address.clone(), e.objects.clone()))
            .collect()
    }
}

async fn add_object(endpoint: &mut SimulatedEndpoint) -> Result<ObjectName, NamingError> {
    let index = endpoint.next_object;
    endpoint.next_object += 1;

    let name = ObjectName::new(
        SIMULATED_DOMAIN,
        [("type", "Cache".to_string()), ("name", format!("cache-{}", index))],
    )?;
    let object = demo_cache(name.clone());
    match endpoint.registry.register(name.clone(), Arc::new(object)).await {
        Ok(()) => endpoint.objects.push(name.clone()),
        Err(err) => tracing::debug!(name = %name, error = %err, "Simulated object not registered"),
    }
    Ok(name)
}

fn demo_cache(name: ObjectName) -> BasicObject {
    let ping: OperationHandler =
        Arc::new(|_: &[TypedArgument]| -> ObjectResult<AttributeValue> { Ok(json!("pong")) });
    let resize: OperationHandler =
        Arc::new(|arguments: &[TypedArgument]| -> ObjectResult<AttributeValue> {
            let size = arguments
                .first()
                .and_then(|argument| argument.value.as_u64())
                .unwrap_or_default();
            Ok(json!(size))
        });

    BasicObject::new(name, ObjectInfo::new("Cache", "Simulated cache"))
        .with_read_only_attribute("Capacity", json!(1024))
        .with_attribute("Size", json!(0))
        .with_attribute("Hits", json!(0))
        .with_operation(
            OperationInfo::new("ping", "Liveness check")
                .returning("string")
                .with_impact(OperationImpact::Info),
            ping,
        )
        .with_operation(
            OperationInfo::new("resize", "Change the cache size")
                .with_parameter(ParameterInfo::new("size", "long", "New size"))
                .returning("long")
                .with_impact(OperationImpact::Action),
            resize,
        )
}
