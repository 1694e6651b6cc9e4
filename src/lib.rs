//! A polling data-source driver for Modbus RTU (serial) and Modbus TCP
//! (network) servers.
//!
//! The driver reads a block of coils, discrete inputs, holding registers or
//! input registers on a fixed interval and emits each result as one
//! comma-separated, newline-terminated byte frame, ready for a host
//! application's generic line-based data pipeline. Wire-level Modbus is
//! delegated to `tokio-modbus`; this crate implements the decision logic
//! around it:
//!
//! - **Configuration** ([`store::ConfigStore`] over [`config`]): validated,
//!   persisted operating parameters. Setters reject out-of-range values and
//!   report whether the stored value changed.
//! - **Lifecycle** ([`driver::ModbusDriver`]): open/close semantics and the
//!   `Disconnected -> Connecting -> Connected` state machine.
//! - **Polling** ([`driver`]): one read per interval, with per-mode timeouts
//!   and retries; at most one request in flight.
//! - **Formatting** ([`frame`]): pure projection of decoded values into CSV
//!   lines.
//!
//! # Quick Start
//!
//! ```no_run
//! use modbus_feed::config::{FunctionCode, Mode};
//! use modbus_feed::driver::{DriverEvent, ModbusDriver};
//! use modbus_feed::store::ConfigStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = ConfigStore::ephemeral();
//!     let (mut driver, mut events) = ModbusDriver::new(store);
//!
//!     driver.set_mode(Mode::Tcp);
//!     driver.set_tcp_host("192.168.1.100");
//!     driver.set_tcp_port(502);
//!     driver.set_function_code(FunctionCode::ReadHoldingRegisters);
//!     driver.set_register_count(3);
//!
//!     driver.open().await?;
//!     while let Some(event) = events.recv().await {
//!         if let DriverEvent::DataReceived(frame) = event {
//!             print!("{}", String::from_utf8_lossy(&frame));
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod frame;
pub mod ports;
pub mod settings;
pub mod store;

pub use error::{Error, Result};
