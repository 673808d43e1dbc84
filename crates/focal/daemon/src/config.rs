//! Configuration for focal-daemon

use focal_bridge::{membership_name, FederationConfig, GroupSelection, Locator};
use serde::{Deserialize, Serialize};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Discovery membership at startup
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Federation configuration
    #[serde(default)]
    pub federation: FederationSettings,

    /// Simulated remote endpoints
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Initial discovery groups and locators
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Groups to discover; absent means all groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,

    /// Unicast locators, `lookup://host[:port]`
    #[serde(default)]
    pub locators: Vec<String>,
}

impl DiscoveryConfig {
    pub fn group_selection(&self) -> GroupSelection {
        GroupSelection::from(self.groups.clone())
    }
}

/// Federation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederationSettings {
    /// Domain of the bridge's own management objects
    #[serde(default = "default_management_domain")]
    pub management_domain: String,

    /// Capacity of the federation event channel
    #[serde(default = "default_event_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for FederationSettings {
    fn default() -> Self {
        Self {
            management_domain: default_management_domain(),
            event_channel_capacity: default_event_capacity(),
        }
    }
}

impl FederationSettings {
    pub fn federation_config(&self) -> FederationConfig {
        FederationConfig {
            event_channel_capacity: self.event_channel_capacity,
        }
    }
}

/// Simulated remote endpoints published in-process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of endpoints; zero disables the simulation
    #[serde(default)]
    pub endpoints: usize,

    /// Objects hosted by each endpoint at startup
    #[serde(default = "default_objects_per_endpoint")]
    pub objects_per_endpoint: usize,

    /// Seconds between churn steps; zero disables churn
    #[serde(default = "default_churn_interval")]
    pub churn_interval_secs: u64,

    /// Discovery group the endpoints announce in
    #[serde(default = "default_simulation_group")]
    pub group: String,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            endpoints: 0,
            objects_per_endpoint: default_objects_per_endpoint(),
            churn_interval_secs: default_churn_interval(),
            group: default_simulation_group(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_management_domain() -> String {
    "focal".to_string()
}

fn default_event_capacity() -> usize {
    1024
}

fn default_objects_per_endpoint() -> usize {
    4
}

fn default_churn_interval() -> u64 {
    5
}

fn default_simulation_group() -> String {
    "simulated".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// Environment variables use the `FOCAL_` prefix and `__` between
    /// sections, e.g. `FOCAL_SIMULATION__ENDPOINTS=3`.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        // Add default configuration
        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        // Add file configuration if provided
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // Add environment variables with FOCAL_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("FOCAL")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("discovery.groups")
                .with_list_parse_key("discovery.locators")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Check values the deserializer cannot
    pub fn validate(&self) -> Result<(), String> {
        membership_name(&self.federation.management_domain).map_err(|e| {
            format!(
                "Invalid management domain '{}': {}",
                self.federation.management_domain, e
            )
        })?;
        self.locators()?;
        if self.federation.event_channel_capacity == 0 {
            return Err("event_channel_capacity must be positive".to_string());
        }
        Ok(())
    }

    /// Parsed discovery locators
    pub fn locators(&self) -> Result<Vec<Locator>, String> {
        self.discovery
            .locators
            .iter()
            .map(|url| Locator::parse(url).map_err(|e| e.to_string()))
            .collect()
    }
}
