//! Serial port enumeration.
//!
//! The driver selects its RTU port by index into a snapshot of the enumerated
//! ports. Index 0 is reserved as the "no selection" placeholder so a freshly
//! constructed configuration is never silently bound to a real device. The
//! host refreshes the snapshot on its own cadence (typically 1 Hz).

use log::warn;

/// Display name of the reserved entry at index 0.
pub const NO_SELECTION: &str = "Select port";

/// A snapshot of the available serial ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPorts {
    names: Vec<String>,
}

impl Default for SerialPorts {
    fn default() -> Self {
        Self {
            names: vec![NO_SELECTION.to_string()],
        }
    }
}

impl SerialPorts {
    /// Creates a snapshot holding only the placeholder entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-enumerates the system's serial ports. Returns `true` if the list
    /// changed compared to the previous snapshot.
    pub fn refresh(&mut self) -> bool {
        let mut names = vec![NO_SELECTION.to_string()];
        match tokio_serial::available_ports() {
            Ok(ports) => {
                for info in ports {
                    // On macOS each device shows up twice; keep the callout
                    // (cu.*) entry and skip the tty.* twin.
                    #[cfg(target_os = "macos")]
                    if info.port_name.to_lowercase().contains("tty.") {
                        continue;
                    }
                    names.push(info.port_name);
                }
            }
            Err(e) => warn!("Serial port enumeration failed: {e}"),
        }

        if self.names != names {
            self.names = names;
            true
        } else {
            false
        }
    }

    /// All entries, placeholder included.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of entries, placeholder included.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if no real port is available (only the placeholder remains).
    pub fn is_empty(&self) -> bool {
        self.names.len() <= 1
    }

    /// True if `index` addresses any entry of the snapshot, the placeholder
    /// included. Used by the configuration setter.
    pub fn contains_index(&self, index: u8) -> bool {
        (index as usize) < self.names.len()
    }

    /// Maps a configured index to a system port name. The placeholder and
    /// out-of-range indices resolve to `None`.
    pub fn resolve(&self, index: u8) -> Option<&str> {
        if index == 0 {
            return None;
        }
        self.names.get(index as usize).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(ports: &[&str]) -> SerialPorts {
        let mut names = vec![NO_SELECTION.to_string()];
        names.extend(ports.iter().map(|s| s.to_string()));
        SerialPorts { names }
    }

    #[test]
    fn placeholder_is_never_a_port() {
        let ports = snapshot(&["/dev/ttyUSB0"]);
        assert_eq!(ports.resolve(0), None);
        assert_eq!(ports.resolve(1), Some("/dev/ttyUSB0"));
        assert_eq!(ports.resolve(2), None);
    }

    #[test]
    fn empty_system_still_has_placeholder() {
        let ports = SerialPorts::new();
        assert_eq!(ports.len(), 1);
        assert!(ports.contains_index(0));
        assert!(!ports.contains_index(1));
        assert_eq!(ports.resolve(0), None);
    }
}
