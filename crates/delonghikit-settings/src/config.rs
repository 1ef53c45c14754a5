//! Configuration and settings management for DelonghiKit
//!
//! Provides configuration file handling and validation. Supports JSON and
//! TOML file formats stored in the platform config directory.
//!
//! Configuration is organized into sections:
//! - Connection settings (port, framing, timeouts)
//! - Protocol settings (appliance generation)
//! - Store settings (log history)
//!
//! Every section is optional in the file; missing values take defaults.

use delonghikit_communication::{EngineConfig, SerialParams, SerialParity};
use delonghikit_core::{ProtocolVersion, StateStoreConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, SettingsError, SettingsResult};

/// Directory name under the platform config directory
const APP_DIR: &str = "delonghikit";

/// Default config file name
const CONFIG_FILE: &str = "config.toml";

/// Serial connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port of the bridge
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
    /// Read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds
    pub write_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        let params = SerialParams::default();
        Self {
            port: params.port,
            baud_rate: params.baud_rate,
            data_bits: params.data_bits,
            stop_bits: params.stop_bits,
            parity: params.parity,
            flow_control: params.flow_control,
            read_timeout_ms: params.read_timeout.as_millis() as u64,
            write_timeout_ms: params.write_timeout.as_millis() as u64,
        }
    }
}

impl ConnectionSettings {
    /// Serial parameters for the transport
    pub fn serial_params(&self) -> SerialParams {
        SerialParams {
            port: self.port.clone(),
            baud_rate: self.baud_rate,
            data_bits: self.data_bits,
            stop_bits: self.stop_bits,
            parity: self.parity,
            flow_control: self.flow_control,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

/// Appliance protocol settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolSettings {
    /// Protocol generation of the appliance
    pub version: ProtocolVersion,
}

/// State store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Log lines to keep; 0 keeps everything
    pub max_log_entries: usize,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            max_log_entries: 1000,
        }
    }
}

impl StoreSettings {
    /// Log bound for the state store, `None` when unlimited
    pub fn log_limit(&self) -> Option<usize> {
        match self.max_log_entries {
            0 => None,
            max => Some(max),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionSettings,
    /// Protocol settings
    pub protocol: ProtocolSettings,
    /// Store settings
    pub store: StoreSettings,
}

#[derive(Clone, Copy)]
enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(ConfigError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )
        .into()),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| {
            SettingsError::LoadError(format!("{}: {}", path.display(), e))
        })?;

        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load config from file, or defaults if the file does not exist
    pub fn load_or_default(path: &Path) -> SettingsResult<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SettingsError::ConfigDirectory(format!("{}: {}", parent.display(), e))
            })?;
        }
        std::fs::write(path, content)
            .map_err(|e| SettingsError::SaveError(format!("{}: {}", path.display(), e)))?;

        tracing::debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        let connection = &self.connection;

        if connection.port.trim().is_empty() {
            return Err(SettingsError::invalid("connection.port", "must not be empty"));
        }
        if connection.baud_rate == 0 {
            return Err(SettingsError::invalid("connection.baud_rate", "must be > 0"));
        }
        if !(5..=8).contains(&connection.data_bits) {
            return Err(out_of_range("connection.data_bits", connection.data_bits));
        }
        if !(1..=2).contains(&connection.stop_bits) {
            return Err(out_of_range("connection.stop_bits", connection.stop_bits));
        }
        if connection.read_timeout_ms == 0 {
            return Err(SettingsError::invalid("connection.read_timeout_ms", "must be > 0"));
        }
        if connection.write_timeout_ms == 0 {
            return Err(SettingsError::invalid("connection.write_timeout_ms", "must be > 0"));
        }

        Ok(())
    }

    /// Engine configuration described by this config
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            serial: self.connection.serial_params(),
            protocol_version: self.protocol.version,
            store: StateStoreConfig {
                max_log_entries: self.store.log_limit(),
            },
        }
    }
}

fn out_of_range(key: &str, value: impl ToString) -> SettingsError {
    ConfigError::ValueOutOfRange {
        key: key.to_string(),
        value: value.to_string(),
    }
    .into()
}

/// Platform config file location, e.g. `~/.config/delonghikit/config.toml`
pub fn default_config_path() -> SettingsResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
        .ok_or_else(|| {
            SettingsError::ConfigDirectory("no config directory on this platform".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.protocol.version, ProtocolVersion::V2);
        assert_eq!(config.connection.baud_rate, 115_200);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::new();
        config.connection.baud_rate = 0;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::InvalidSetting { .. })
        ));

        let mut config = Config::new();
        config.connection.data_bits = 9;
        assert!(matches!(
            config.validate(),
            Err(SettingsError::Config(ConfigError::ValueOutOfRange { .. }))
        ));

        let mut config = Config::new();
        config.connection.port = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_engine_config_mapping() {
        let mut config = Config::new();
        config.connection.port = "/dev/ttyACM0".to_string();
        config.connection.write_timeout_ms = 250;
        config.protocol.version = ProtocolVersion::V1;
        config.store.max_log_entries = 0;

        let engine = config.engine_config();
        assert_eq!(engine.serial.port, "/dev/ttyACM0");
        assert_eq!(engine.serial.write_timeout, Duration::from_millis(250));
        assert_eq!(engine.protocol_version, ProtocolVersion::V1);
        assert_eq!(engine.store.max_log_entries, None);

        config.store.max_log_entries = 20;
        assert_eq!(config.engine_config().store.max_log_entries, Some(20));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [connection]
            port = "COM7"

            [protocol]
            version = "v1"
            "#,
        )
        .unwrap();

        assert_eq!(config.connection.port, "COM7");
        assert_eq!(config.connection.baud_rate, 115_200);
        assert_eq!(config.protocol.version, ProtocolVersion::V1);
        assert_eq!(config.store, StoreSettings::default());
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(
            Config::new().save_to_file(Path::new("config.yaml")),
            Err(SettingsError::Config(ConfigError::UnsupportedFormat(_)))
        ));
    }

    #[test]
    fn test_default_path_ends_with_app_dir() {
        if let Ok(path) = default_config_path() {
            assert!(path.ends_with("delonghikit/config.toml"));
        }
    }
}
