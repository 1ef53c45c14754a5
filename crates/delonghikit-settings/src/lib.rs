//! DelonghiKit Settings Crate
//!
//! Loads, validates and saves the connection, protocol and state store
//! configuration, and turns it into an engine configuration.

pub mod config;
pub mod error;

pub use config::{default_config_path, Config, ConnectionSettings, ProtocolSettings, StoreSettings};
pub use error::{ConfigError, SettingsError, SettingsResult};
