//! The configuration store.
//!
//! Owns the validated [`DriverConfig`], persists every accepted mutation and
//! reports back whether a setter actually changed the stored value. Rejected
//! values are ignored and leave the previous value in place; the setter then
//! returns `false`. Change propagation is the caller's business: there are no
//! hidden observers.

use crate::config::{
    BaudRate, DriverConfig, FunctionCode, Mode, Parity, PollInterval, RegisterCount, SlaveAddress,
};
use crate::ports::SerialPorts;
use crate::settings::Settings;
use log::warn;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Validating configuration store with optional durable persistence.
///
/// Cloning is cheap; all clones share the same configuration. The poll task
/// holds a clone and snapshots the config once per tick.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    config: Arc<Mutex<DriverConfig>>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// A store that never touches the filesystem.
    pub fn ephemeral() -> Self {
        Self {
            config: Arc::new(Mutex::new(DriverConfig::default())),
            path: None,
        }
    }

    /// Loads persisted settings from `path`. A missing file yields defaults;
    /// an unreadable file is logged and also yields defaults, so construction
    /// never fails.
    pub fn load(path: PathBuf) -> Self {
        let config = match Settings::load(&path) {
            Ok(settings) => settings.to_config(),
            Err(e) => {
                warn!("Cannot load settings: {e}, using defaults");
                DriverConfig::default()
            }
        };
        Self {
            config: Arc::new(Mutex::new(config)),
            path: Some(path),
        }
    }

    /// A copy of the current configuration.
    pub fn snapshot(&self) -> DriverConfig {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DriverConfig> {
        // The config mutex is never held across await points, so a poisoned
        // lock can only come from a panic in a setter; propagating it is fine.
        self.config.lock().expect("config lock poisoned")
    }

    /// Applies `mutate` to the stored config and persists on change.
    /// Returns whether the stored value changed.
    fn update(&self, mutate: impl FnOnce(&mut DriverConfig) -> bool) -> bool {
        let mut config = self.lock();
        if !mutate(&mut config) {
            return false;
        }
        if let Some(path) = &self.path {
            if let Err(e) = Settings::from(&*config).store(path) {
                warn!("Cannot persist settings: {e}");
            }
        }
        true
    }

    pub fn set_mode(&self, mode: Mode) -> bool {
        self.update(|c| {
            if c.mode == mode {
                return false;
            }
            c.mode = mode;
            true
        })
    }

    /// Accepts 1 to 247; anything else is ignored.
    pub fn set_slave_address(&self, address: u8) -> bool {
        let Ok(address) = SlaveAddress::try_from(address) else {
            return false;
        };
        self.update(|c| {
            if c.slave_address == address {
                return false;
            }
            c.slave_address = address;
            true
        })
    }

    pub fn set_function_code(&self, code: FunctionCode) -> bool {
        self.update(|c| {
            if c.function_code == code {
                return false;
            }
            c.function_code = code;
            true
        })
    }

    /// Any 16-bit start address is valid.
    pub fn set_start_address(&self, address: u16) -> bool {
        self.update(|c| {
            if c.start_address == address {
                return false;
            }
            c.start_address = address;
            true
        })
    }

    /// Accepts 1 to 125; anything else is ignored.
    pub fn set_register_count(&self, count: u16) -> bool {
        let Ok(count) = RegisterCount::try_from(count) else {
            return false;
        };
        self.update(|c| {
            if c.register_count == count {
                return false;
            }
            c.register_count = count;
            true
        })
    }

    /// Accepts periods of at least 100 ms; shorter ones are ignored.
    pub fn set_poll_interval(&self, interval: Duration) -> bool {
        let Ok(interval) = PollInterval::try_from(interval) else {
            return false;
        };
        self.update(|c| {
            if c.poll_interval == interval {
                return false;
            }
            c.poll_interval = interval;
            true
        })
    }

    pub fn set_tcp_host(&self, host: &str) -> bool {
        self.update(|c| {
            if c.tcp.host == host {
                return false;
            }
            c.tcp.host = host.to_string();
            true
        })
    }

    pub fn set_tcp_port(&self, port: u16) -> bool {
        self.update(|c| {
            if c.tcp.port == port {
                return false;
            }
            c.tcp.port = port;
            true
        })
    }

    /// Accepts indices into the given port snapshot, the placeholder (0)
    /// included; out-of-range indices are ignored.
    pub fn set_serial_port_index(&self, index: u8, ports: &SerialPorts) -> bool {
        if !ports.contains_index(index) {
            return false;
        }
        self.update(|c| {
            if c.rtu.port_index == index {
                return false;
            }
            c.rtu.port_index = index;
            true
        })
    }

    /// Accepts any positive baud rate; zero is ignored.
    pub fn set_baud_rate(&self, rate: u32) -> bool {
        let Ok(rate) = BaudRate::try_from(rate) else {
            return false;
        };
        self.update(|c| {
            if c.rtu.baud_rate == rate {
                return false;
            }
            c.rtu.baud_rate = rate;
            true
        })
    }

    pub fn set_parity(&self, parity: Parity) -> bool {
        self.update(|c| {
            if c.rtu.parity == parity {
                return false;
            }
            c.rtu.parity = parity;
            true
        })
    }

    /// Pure completeness predicate: RTU needs a real (non-placeholder) port
    /// selection, TCP a non-empty host.
    pub fn configuration_ok(&self, ports: &SerialPorts) -> bool {
        let config = self.lock();
        match config.mode {
            Mode::Rtu => ports.resolve(config.rtu.port_index).is_some(),
            Mode::Tcp => !config.tcp.host.is_empty(),
        }
    }
}
