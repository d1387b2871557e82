//! Configuration and CLI surface for the BME280 agent.

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use enviropub_common::config::{LoggingConfig, ZenohConfig};
use enviropub_common::serialization::Format;

/// Default path probed when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "bme280.json5";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    NotFound { path: String },
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] json5::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// CLI arguments for the agent.
///
/// Flags only ever switch a setting on; defaults come from the
/// configuration file, so a mode enabled there cannot be disabled from
/// the command line.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "zenoh-bridge-bme280",
    about = "Publish BME280 temperature/humidity readings to Zenoh"
)]
pub struct AgentArgs {
    /// Zenoh endpoint locator, e.g. "tcp/gateway.example.com:7447".
    pub connection: Option<String>,

    /// Use simulated temperature and humidity data instead of the BME280.
    #[arg(short, long)]
    pub simulated: bool,

    /// Time between published messages, in milliseconds.
    #[arg(short = 't', long = "time", value_name = "MS")]
    pub time: Option<u64>,

    /// Do not send anything, only print telemetry to the console.
    #[arg(short = 'n', long = "no-send")]
    pub no_send: bool,

    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Complete agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Zenoh connection settings.
    #[serde(default)]
    pub zenoh: ZenohConfig,

    /// Sensor and publishing settings.
    #[serde(default)]
    pub bme280: Bme280Config,

    /// Wire format for telemetry payloads.
    #[serde(default)]
    pub serialization: Format,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Sensor and publish-cycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bme280Config {
    /// Key expression prefix (default: "enviropub/bme280").
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    /// Device identifier used in key expressions and message payloads.
    /// Use "auto" to derive it from the hostname (default).
    #[serde(default = "default_device_id")]
    pub device_id: String,

    /// Time between published messages in milliseconds (default: 2000).
    /// A zero interval is allowed and produces a busy loop.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Generate simulated readings instead of sampling the BME280.
    #[serde(default)]
    pub simulated: bool,

    /// Format and print telemetry without sending it.
    #[serde(default)]
    pub no_send: bool,

    /// I2C bus settings for the hardware sensor.
    #[serde(default)]
    pub i2c: I2cConfig,
}

/// I2C bus settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct I2cConfig {
    /// Device node of the I2C bus (default: "/dev/i2c-1").
    #[serde(default = "default_i2c_bus")]
    pub bus: String,

    /// Sensor address on the bus (default: 0x76).
    #[serde(default = "default_i2c_address")]
    pub address: u8,
}

fn default_key_prefix() -> String {
    "enviropub/bme280".to_string()
}

fn default_device_id() -> String {
    "auto".to_string()
}

fn default_interval_ms() -> u64 {
    2000
}

fn default_i2c_bus() -> String {
    "/dev/i2c-1".to_string()
}

fn default_i2c_address() -> u8 {
    0x76
}

impl Default for Bme280Config {
    fn default() -> Self {
        Self {
            key_prefix: default_key_prefix(),
            device_id: default_device_id(),
            interval_ms: default_interval_ms(),
            simulated: false,
            no_send: false,
            i2c: I2cConfig::default(),
        }
    }
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self {
            bus: default_i2c_bus(),
            address: default_i2c_address(),
        }
    }
}

impl AgentConfig {
    /// Resolve the effective configuration: file defaults, then CLI
    /// overrides, then validation.
    pub fn resolve(args: &AgentArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::load(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    Self::load(default)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON5 file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;
        Ok(config)
    }

    /// Layer CLI arguments over the file configuration.
    pub fn apply_args(&mut self, args: &AgentArgs) {
        if let Some(locator) = &args.connection {
            self.zenoh = ZenohConfig::from_locator(locator);
        }
        if args.simulated {
            self.bme280.simulated = true;
        }
        if let Some(interval) = args.time {
            self.bme280.interval_ms = interval;
        }
        if args.no_send {
            self.bme280.no_send = true;
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the resolved configuration.
    ///
    /// A missing endpoint while sending is enabled is a hard failure here,
    /// before any sensor detection or connection attempt.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.bme280.no_send && self.zenoh.connect.is_empty() {
            return Err(ConfigError::Validation(
                "no Zenoh endpoint configured; supply a connection locator as an argument, \
                 set zenoh.connect in the config file, or pass --no-send"
                    .to_string(),
            ));
        }

        if self.bme280.key_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "key_prefix must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Bme280Config {
    /// Get the device identifier, resolving "auto" from the hostname.
    pub fn get_device_id(&self) -> String {
        if self.device_id == "auto" {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string())
        } else {
            self.device_id.clone()
        }
    }
}
