//! Configuration Module
//!
//! Environment-driven configuration for the stream monitor.

mod settings;

pub use settings::{
    ConfigError, ConnectionSettings, Credential, DetectorSettings, MonitorConfig,
    StorageSettings, SupervisorSettings,
};
