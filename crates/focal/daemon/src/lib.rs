//! Focal Daemon library
//!
//! This module provides the core components for the focal daemon:
//! - Configuration loading
//! - Server lifecycle management
//! - Simulated remote endpoints

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod server;
pub mod simulation;

pub use config::DaemonConfig;
pub use error::{DaemonError, DaemonResult};
pub use server::Server;
pub use simulation::Simulation;
