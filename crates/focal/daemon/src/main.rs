//! Focal Daemon - Federation bridge host
//!
//! The focal daemon provides:
//! - Discovery-driven mirroring of remote management registries
//! - The bridge's own management objects in the local registry
//! - Logging of local registration changes
//! - Optional simulated endpoints for local experimentation

use clap::Parser;
use focal_daemon::{DaemonConfig, DaemonError, DaemonResult, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Focal Daemon CLI
#[derive(Parser)]
#[command(name = "focald")]
#[command(about = "Focal Daemon - Federation of management registries", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "FOCAL_CONFIG")]
    config: Option<String>,

    /// Log level
    #[arg(long, env = "FOCAL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "FOCAL_LOG_JSON")]
    json: bool,

    /// Publish this many simulated endpoints
    #[arg(long, env = "FOCAL_SIMULATE")]
    simulate: Option<usize>,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())?;

    // Override with CLI args
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    if cli.json {
        config.logging.json = true;
    }
    if let Some(endpoints) = cli.simulate {
        config.simulation.endpoints = endpoints;
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    config.validate().map_err(DaemonError::Config)?;

    // Print startup banner
    println!(
        r#"
  _____ ___   ____    _    _
 |  ___/ _ \ / ___|  / \  | |
 | |_ | | | | |     / _ \ | |
 |  _|| |_| | |___ / ___ \| |___
 |_|   \___/ \____/_/   \_\_____|

  Focal - Management Registry Federation
  Version: {}
  Management domain: {}
  Discovery groups: {}
  Simulated endpoints: {}
"#,
        env!("CARGO_PKG_VERSION"),
        config.federation.management_domain,
        config
            .discovery
            .groups
            .as_ref()
            .map_or_else(|| "all".to_string(), |groups| groups.join(", ")),
        config.simulation.endpoints
    );

    // Create and run server
    let server = Server::new(config).await?;
    server.run().await
}
