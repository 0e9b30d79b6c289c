//! Configuration Module
//!
//! Loads and validates configuration from TOML files and the environment.

pub mod loader;

pub use loader::{
    load_config, BackendSection, BrokerSection, Config, ConfigError, KeystoreSection,
    MonitorSection, NetworkSection, NetworksSection,
};
