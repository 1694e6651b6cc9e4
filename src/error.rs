//! Driver error taxonomy.

/// Represents all possible errors the driver can report.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The configuration is incomplete or inconsistent for the selected mode,
    /// e.g. no serial port selected for RTU or an empty TCP host. Surfaced
    /// synchronously from `open()`; no transport call is made.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A value handed to a setter or parsed from persisted settings was
    /// outside its valid domain.
    #[error("{field} out of range: {value}")]
    ValueOutOfRange {
        field: &'static str,
        value: String,
    },

    /// Establishing the transport session failed (socket connect, serial
    /// port open, or connect timeout).
    #[error("connect failed: {0}")]
    Connect(String),

    /// Wraps `tokio_modbus::Error`: the transport died after the session was
    /// established.
    #[error(transparent)]
    Transport(#[from] tokio_modbus::Error),

    /// Wraps `tokio_modbus::ExceptionCode`: the server answered with a Modbus
    /// exception.
    #[error(transparent)]
    Exception(#[from] tokio_modbus::ExceptionCode),

    /// The write path is a read-only gap, not a silent zero-byte success.
    #[error("Modbus write is not supported by this driver")]
    WriteNotSupported,

    /// Loading or storing the persisted settings document failed.
    #[error("settings error: {0}")]
    Settings(String),
}

/// The result type used throughout the driver.
pub type Result<T> = std::result::Result<T, Error>;
