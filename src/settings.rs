//! Persisted driver settings.
//!
//! A flat YAML document read once at construction and rewritten after every
//! successful setter call. Fields that are missing from the file fall back to
//! their defaults; fields that parse but fail validation are also replaced by
//! defaults so the in-memory configuration is never partially invalid.

use crate::config::{
    BaudRate, DriverConfig, FunctionCode, Mode, Parity, PollInterval, RegisterCount, RtuConfig,
    SlaveAddress, TcpConfig,
};
use crate::error::{Error, Result};
use directories_next::ProjectDirs;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub mode: u8,
    #[serde(default = "default_slave_address")]
    pub slave_address: u8,
    #[serde(default = "default_function_code")]
    pub function_code: u8,
    #[serde(default)]
    pub start_address: u16,
    #[serde(default = "default_register_count")]
    pub register_count: u16,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_tcp_host")]
    pub tcp_host: String,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    #[serde(default)]
    pub serial_port_index: u8,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default)]
    pub parity: u8,
}

fn default_slave_address() -> u8 {
    1
}

fn default_function_code() -> u8 {
    3
}

fn default_register_count() -> u16 {
    10
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_tcp_host() -> String {
    String::from("127.0.0.1")
}

fn default_tcp_port() -> u16 {
    502
}

fn default_baud_rate() -> u32 {
    9600
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&DriverConfig::default())
    }
}

impl From<&DriverConfig> for Settings {
    fn from(config: &DriverConfig) -> Self {
        Self {
            mode: config.mode as u8,
            slave_address: config.slave_address.get(),
            function_code: config.function_code as u8,
            start_address: config.start_address,
            register_count: config.register_count.get(),
            poll_interval: config.poll_interval.get(),
            tcp_host: config.tcp.host.clone(),
            tcp_port: config.tcp.port,
            serial_port_index: config.rtu.port_index,
            baud_rate: config.rtu.baud_rate.get(),
            parity: config.rtu.parity as u8,
        }
    }
}

impl Settings {
    /// Reads the settings document, falling back to defaults if the file does
    /// not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let file = fs::File::open(path)
            .map_err(|e| Error::Settings(format!("cannot open {}: {e}", path.display())))?;
        serde_yaml::from_reader(&file)
            .map_err(|e| Error::Settings(format!("cannot parse {}: {e}", path.display())))
    }

    /// Writes the settings document, creating parent directories as needed.
    pub fn store(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::Settings(format!("cannot create {}: {e}", parent.display())))?;
        }
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| Error::Settings(format!("cannot serialize settings: {e}")))?;
        fs::write(path, yaml)
            .map_err(|e| Error::Settings(format!("cannot write {}: {e}", path.display())))
    }

    /// Converts the raw document to a validated configuration. Each field
    /// that fails validation is replaced by its default and logged.
    pub fn to_config(&self) -> DriverConfig {
        DriverConfig {
            mode: checked("mode", Mode::try_from(self.mode)),
            slave_address: checked("slave address", SlaveAddress::try_from(self.slave_address)),
            function_code: checked("function code", FunctionCode::try_from(self.function_code)),
            start_address: self.start_address,
            register_count: checked(
                "register count",
                RegisterCount::try_from(self.register_count),
            ),
            poll_interval: checked("poll interval", PollInterval::try_from(self.poll_interval)),
            tcp: TcpConfig {
                host: self.tcp_host.clone(),
                port: self.tcp_port,
            },
            rtu: RtuConfig {
                port_index: self.serial_port_index,
                baud_rate: checked("baud rate", BaudRate::try_from(self.baud_rate)),
                parity: checked("parity", Parity::try_from(self.parity)),
            },
        }
    }
}

fn checked<T: Default>(field: &str, value: Result<T>) -> T {
    match value {
        Ok(v) => v,
        Err(e) => {
            warn!("Persisted {field} is invalid ({e}), using default");
            T::default()
        }
    }
}

/// Default settings file location for hosts that do not provide one.
pub fn default_settings_path() -> Option<PathBuf> {
    ProjectDirs::from("io", "modbus-feed", "mbfeed")
        .map(|dirs| dirs.config_dir().join("settings.yml"))
}
