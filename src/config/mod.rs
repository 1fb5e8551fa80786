//! Configuration module
//!
//! Handles loading and saving gdb-baud configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::handshake::uart_divider;
use crate::protocol::{DEFAULT_BAUD_REGISTER, MAX_RESPONSE_SIZE};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Serial link settings
    #[serde(default)]
    pub serial: SerialConfig,

    /// Target hardware settings
    #[serde(default)]
    pub target: TargetConfig,

    /// Packet handling settings
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

/// General configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Echo every frame sent and received
    #[serde(default)]
    pub verbose: bool,
}

/// Serial link configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port name
    #[serde(default = "default_port")]
    pub port: String,
    /// Speed the GDB stub starts at
    #[serde(default = "default_initial_baud")]
    pub initial_baud: u32,
    /// Speed to switch to
    #[serde(default = "default_target_baud")]
    pub target_baud: u32,
    /// Read window per reply (ms)
    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,
    /// Maximum bytes read per reply
    #[serde(default = "default_max_response_size")]
    pub max_response_size: usize,
    /// Pause around the speed switch (ms)
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

/// Default serial port name for this platform
pub fn default_port() -> String {
    if cfg!(windows) {
        "COM7".to_string()
    } else {
        "/dev/ttyUSB0".to_string()
    }
}

fn default_initial_baud() -> u32 {
    115_200
}

fn default_target_baud() -> u32 {
    921_600
}

fn default_read_timeout() -> u64 {
    200
}

fn default_max_response_size() -> usize {
    MAX_RESPONSE_SIZE
}

fn default_settle_delay() -> u64 {
    10
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            initial_baud: default_initial_baud(),
            target_baud: default_target_baud(),
            read_timeout_ms: default_read_timeout(),
            max_response_size: default_max_response_size(),
            settle_delay_ms: default_settle_delay(),
        }
    }
}

/// Target hardware configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Core clock feeding the target UART (Hz)
    #[serde(default = "default_system_clock")]
    pub system_clock_hz: u32,
    /// Address of the UART baud divider register
    #[serde(default = "default_baud_register")]
    pub baud_register: u32,
}

fn default_system_clock() -> u32 {
    250_000_000
}

fn default_baud_register() -> u32 {
    DEFAULT_BAUD_REGISTER
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            system_clock_hz: default_system_clock(),
            baud_register: default_baud_register(),
        }
    }
}

/// Packet handling configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Drop replies whose checksum does not match (off by default)
    #[serde(default)]
    pub verify_checksums: bool,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the default location
    pub fn load_default() -> ConfigResult<Self> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("gdb-baud/config.toml")),
            Some(PathBuf::from("./gdb-baud.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Reject values the handshake cannot work with
    pub fn validate(&self) -> ConfigResult<()> {
        let serial = &self.serial;
        if serial.port.is_empty() {
            return Err(ConfigError::Invalid("serial port name is empty".into()));
        }
        if serial.initial_baud == 0 || serial.target_baud == 0 {
            return Err(ConfigError::Invalid("baud rates must be non-zero".into()));
        }
        if serial.max_response_size == 0 {
            return Err(ConfigError::Invalid("max_response_size must be non-zero".into()));
        }
        if self.target.system_clock_hz == 0 {
            return Err(ConfigError::Invalid("system_clock_hz must be non-zero".into()));
        }
        if uart_divider(self.target.system_clock_hz, serial.target_baud).is_none() {
            return Err(ConfigError::Invalid(format!(
                "{} baud cannot be derived from a {} Hz system clock",
                serial.target_baud, self.target.system_clock_hz
            )));
        }
        Ok(())
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.serial.read_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.serial.settle_delay_ms)
    }
}
