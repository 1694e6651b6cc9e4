use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use modbus_feed::config::{FunctionCode, Parity};
use std::path::PathBuf;
use std::time::Duration;

fn default_device_name() -> String {
    if cfg!(target_os = "windows") {
        String::from("COM1")
    } else {
        String::from("/dev/ttyUSB0")
    }
}

fn parse_function_code(s: &str) -> Result<FunctionCode, String> {
    let code =
        clap_num::maybe_hex::<u8>(s).map_err(|e| format!("Invalid function code format: {e}"))?;
    FunctionCode::try_from(code).map_err(|e| e.to_string())
}

fn parse_parity(s: &str) -> Result<Parity, String> {
    match s.to_ascii_lowercase().as_str() {
        "none" | "n" => Ok(Parity::None),
        "even" | "e" => Ok(Parity::Even),
        "odd" | "o" => Ok(Parity::Odd),
        _ => Err(format!("Invalid parity '{s}', expected none, even or odd")),
    }
}

/// Polling parameters shared by both transports.
#[derive(Args, Debug, Clone, PartialEq)]
pub struct PollArgs {
    /// Modbus slave/unit address of the target device (1 to 247).
    #[arg(short = 'a', long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=247))]
    pub slave: u8,

    /// Read function code: 1 (coils), 2 (discrete inputs),
    /// 3 (holding registers) or 4 (input registers).
    #[arg(short = 'f', long, default_value = "3", value_parser = parse_function_code)]
    pub function_code: FunctionCode,

    /// First register or coil address to read (0 to 65535).
    #[arg(short = 's', long, default_value_t = 0)]
    pub start_address: u16,

    /// Number of registers or coils to read per poll (1 to 125).
    #[arg(short = 'c', long, default_value_t = 10, value_parser = clap::value_parser!(u16).range(1..=125))]
    pub count: u16,

    /// Polling interval (e.g. "500ms", "2s"). Minimum 100 ms.
    #[arg(short = 'p', long, default_value = "1s", value_parser = humantime::parse_duration)]
    pub poll_interval: Duration,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliConnection {
    /// Poll a server via Modbus TCP and stream the frames to stdout.
    Tcp {
        /// Host and port of the Modbus TCP server.
        /// Example: "192.168.1.100:502" or "modbus-gateway.local:502".
        address: String,

        #[command(flatten)]
        poll: PollArgs,
    },
    /// Poll a server via Modbus RTU (serial) and stream the frames to stdout.
    Rtu {
        /// Serial port device name.
        /// Examples: "/dev/ttyUSB0" (Linux), "COM3" (Windows).
        #[arg(short, long, default_value_t = default_device_name())]
        device: String,

        /// Baud rate for serial communication.
        /// Must match the server's configured baud rate.
        #[arg(long, default_value_t = 9600)]
        baud_rate: u32,

        /// Serial parity: none, even or odd. Data bits and stop bits are
        /// fixed at 8 and 1.
        #[arg(long, default_value = "none", value_parser = parse_parity)]
        parity: Parity,

        #[command(flatten)]
        poll: PollArgs,
    },
    /// List the available serial ports and exit.
    ListPorts,
}

const fn about_text() -> &'static str {
    "mbfeed - poll a Modbus RTU/TCP server and emit register values as CSV line frames."
}

#[derive(Parser, Debug)]
#[command(name="mbfeed", author, version, about=about_text(), long_about = None, propagate_version = true)]
pub struct CliArgs {
    /// Configure verbosity of logging output.
    /// -v for info, -vv for debug, -vvv for trace. Default is warn.
    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// Specifies the transport and polling parameters.
    #[command(subcommand)]
    pub connection: CliConnection,

    /// Settings file to read at startup and update with the values given on
    /// the command line. Without it, nothing is persisted.
    #[arg(global = true, long)]
    pub settings_file: Option<PathBuf>,
}
