//! IoT Device Registry
//!
//! This crate provides an in-process registry of sensor devices, including:
//! - Devices holding their latest reading
//! - Device groups that create and track devices on demand
//! - Per-request group queries collecting every reading under a deadline
//! - A device manager routing requests to groups
//! - A typed async client and TOML configuration

// Re-export the reply helpers and test inboxes
pub use iot_runtime;

pub mod config;
pub mod error;
pub mod messages;

// Registry actors
pub mod device;
pub mod group;
pub mod manager;
pub mod query;
pub mod supervisor;

// Outside access
pub mod client;

pub use client::{IotSystem, RegistryClient};
pub use config::{ConfigError, IotConfig};
pub use error::{Error, Result};
pub use messages::*;
