//! Typed configuration values for the polling driver.
//!
//! Every value that has a constrained domain gets its own type with a
//! validating [`TryFrom`] implementation, so a [`DriverConfig`] can never hold
//! an out-of-range field. Rejected values leave the previous value in place;
//! see [`crate::store::ConfigStore`].

use crate::error::Error;
use std::time::Duration;

/// Transport selection: exactly one of the RTU or TCP parameter sets is
/// active, chosen by this mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Mode {
    /// Modbus RTU over a serial link.
    #[default]
    Rtu = 0,
    /// Modbus TCP over a network socket.
    Tcp = 1,
}

impl Mode {
    /// Human-readable names, index-aligned with the wire encoding.
    pub const NAMES: [&'static str; 2] = ["Modbus RTU (serial)", "Modbus TCP (network)"];
}

impl TryFrom<u8> for Mode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Mode::Rtu),
            1 => Ok(Mode::Tcp),
            _ => Err(Error::ValueOutOfRange {
                field: "mode",
                value: value.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Self::NAMES[*self as usize])
    }
}

/// The four supported read function codes.
///
/// Write function codes (5/6/15/16) are deliberately unsupported; the driver
/// is a read-only data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FunctionCode {
    /// 0x01 - Read Coils
    ReadCoils = 1,
    /// 0x02 - Read Discrete Inputs
    ReadDiscreteInputs = 2,
    /// 0x03 - Read Holding Registers
    #[default]
    ReadHoldingRegisters = 3,
    /// 0x04 - Read Input Registers
    ReadInputRegisters = 4,
}

impl FunctionCode {
    /// All supported codes, in function-code order.
    pub const ALL: [FunctionCode; 4] = [
        FunctionCode::ReadCoils,
        FunctionCode::ReadDiscreteInputs,
        FunctionCode::ReadHoldingRegisters,
        FunctionCode::ReadInputRegisters,
    ];

    /// True for the bit-addressed spaces (coils and discrete inputs).
    pub fn is_bit_space(&self) -> bool {
        matches!(self, FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs)
    }
}

impl TryFrom<u8> for FunctionCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(FunctionCode::ReadCoils),
            2 => Ok(FunctionCode::ReadDiscreteInputs),
            3 => Ok(FunctionCode::ReadHoldingRegisters),
            4 => Ok(FunctionCode::ReadInputRegisters),
            _ => Err(Error::ValueOutOfRange {
                field: "function code",
                value: value.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FunctionCode::ReadCoils => "01 - Read Coils",
            FunctionCode::ReadDiscreteInputs => "02 - Read Discrete Inputs",
            FunctionCode::ReadHoldingRegisters => "03 - Read Holding Registers",
            FunctionCode::ReadInputRegisters => "04 - Read Input Registers",
        };
        write!(f, "{name}")
    }
}

/// Modbus slave/unit address, valid range 1 to 247.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaveAddress(u8);

impl SlaveAddress {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 247;

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl Default for SlaveAddress {
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u8> for SlaveAddress {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::ValueOutOfRange {
                field: "slave address",
                value: value.to_string(),
            })
        }
    }
}

impl std::fmt::Display for SlaveAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Number of registers or coils read per poll, valid range 1 to 125.
///
/// 125 is the largest quantity a single read-holding-registers request can
/// carry, so the same bound is applied to all four read codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterCount(u16);

impl RegisterCount {
    pub const MIN: u16 = 1;
    pub const MAX: u16 = 125;

    pub fn get(&self) -> u16 {
        self.0
    }
}

impl Default for RegisterCount {
    fn default() -> Self {
        Self(10)
    }
}

impl TryFrom<u16> for RegisterCount {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::ValueOutOfRange {
                field: "register count",
                value: value.to_string(),
            })
        }
    }
}

impl std::fmt::Display for RegisterCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Polling period, at least 100 ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollInterval(Duration);

impl PollInterval {
    pub const MIN: Duration = Duration::from_millis(100);

    pub fn get(&self) -> Duration {
        self.0
    }
}

impl Default for PollInterval {
    fn default() -> Self {
        Self(Duration::from_millis(1000))
    }
}

impl TryFrom<Duration> for PollInterval {
    type Error = Error;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        if value >= Self::MIN {
            Ok(Self(value))
        } else {
            Err(Error::ValueOutOfRange {
                field: "poll interval",
                value: format!("{value:?}"),
            })
        }
    }
}

impl std::fmt::Display for PollInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ms", self.0.as_millis())
    }
}

/// Serial baud rate. Any positive rate is accepted; [`BaudRate::SUPPORTED`]
/// lists the conventional choices a host UI would offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaudRate(u32);

impl BaudRate {
    pub const SUPPORTED: [u32; 11] = [
        1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600,
    ];

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for BaudRate {
    fn default() -> Self {
        Self(9600)
    }
}

impl TryFrom<u32> for BaudRate {
    type Error = Error;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value > 0 {
            Ok(Self(value))
        } else {
            Err(Error::ValueOutOfRange {
                field: "baud rate",
                value: value.to_string(),
            })
        }
    }
}

impl std::fmt::Display for BaudRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serial parity. Data bits and stop bits are fixed at 8 and 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Parity {
    #[default]
    None = 0,
    Even = 1,
    Odd = 2,
}

impl Parity {
    pub const NAMES: [&'static str; 3] = ["None", "Even", "Odd"];
}

impl TryFrom<u8> for Parity {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Parity::None),
            1 => Ok(Parity::Even),
            2 => Ok(Parity::Odd),
            _ => Err(Error::ValueOutOfRange {
                field: "parity",
                value: value.to_string(),
            }),
        }
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Even => tokio_serial::Parity::Even,
            Parity::Odd => tokio_serial::Parity::Odd,
        }
    }
}

impl std::fmt::Display for Parity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Self::NAMES[*self as usize])
    }
}

/// TCP endpoint parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpConfig {
    /// Host name or IP address. An empty host makes the configuration
    /// incomplete; `open()` refuses to connect.
    pub host: String,
    pub port: u16,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 502,
        }
    }
}

/// Serial (RTU) endpoint parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtuConfig {
    /// Index into the enumerated port list. Index 0 is the "no selection"
    /// placeholder; a real port starts at 1.
    pub port_index: u8,
    pub baud_rate: BaudRate,
    pub parity: Parity,
}

/// The complete, always-valid driver configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DriverConfig {
    pub mode: Mode,
    pub slave_address: SlaveAddress,
    pub function_code: FunctionCode,
    pub start_address: u16,
    pub register_count: RegisterCount,
    pub poll_interval: PollInterval,
    pub tcp: TcpConfig,
    pub rtu: RtuConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn slave_address_range() {
        assert_matches!(SlaveAddress::try_from(0), Err(Error::ValueOutOfRange { .. }));
        assert_matches!(SlaveAddress::try_from(1), Ok(a) if a.get() == 1);
        assert_matches!(SlaveAddress::try_from(247), Ok(a) if a.get() == 247);
        assert_matches!(
            SlaveAddress::try_from(248),
            Err(Error::ValueOutOfRange { .. })
        );
    }

    #[test]
    fn register_count_range() {
        assert_matches!(RegisterCount::try_from(0), Err(Error::ValueOutOfRange { .. }));
        assert_matches!(RegisterCount::try_from(1), Ok(c) if c.get() == 1);
        assert_matches!(RegisterCount::try_from(125), Ok(c) if c.get() == 125);
        assert_matches!(
            RegisterCount::try_from(126),
            Err(Error::ValueOutOfRange { .. })
        );
    }

    #[test]
    fn poll_interval_minimum() {
        assert_matches!(
            PollInterval::try_from(Duration::from_millis(99)),
            Err(Error::ValueOutOfRange { .. })
        );
        assert_matches!(
            PollInterval::try_from(Duration::from_millis(100)),
            Ok(i) if i.get() == Duration::from_millis(100)
        );
    }

    #[test]
    fn function_code_mapping_is_total() {
        for code in 1..=4u8 {
            assert_matches!(FunctionCode::try_from(code), Ok(_));
        }
        assert_matches!(FunctionCode::try_from(0), Err(_));
        assert_matches!(FunctionCode::try_from(5), Err(_));
    }

    #[test]
    fn bit_space_classification() {
        assert!(FunctionCode::ReadCoils.is_bit_space());
        assert!(FunctionCode::ReadDiscreteInputs.is_bit_space());
        assert!(!FunctionCode::ReadHoldingRegisters.is_bit_space());
        assert!(!FunctionCode::ReadInputRegisters.is_bit_space());
    }

    #[test]
    fn parity_conversion() {
        assert_eq!(
            tokio_serial::Parity::from(Parity::Even),
            tokio_serial::Parity::Even
        );
        assert_matches!(Parity::try_from(3), Err(Error::ValueOutOfRange { .. }));
    }

    #[test]
    fn defaults() {
        let config = DriverConfig::default();
        assert_eq!(config.mode, Mode::Rtu);
        assert_eq!(config.slave_address.get(), 1);
        assert_eq!(config.function_code, FunctionCode::ReadHoldingRegisters);
        assert_eq!(config.start_address, 0);
        assert_eq!(config.register_count.get(), 10);
        assert_eq!(config.poll_interval.get(), Duration::from_millis(1000));
        assert_eq!(config.tcp.port, 502);
        assert_eq!(config.rtu.port_index, 0);
    }
}
