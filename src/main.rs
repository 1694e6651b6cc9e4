//! mbfeed - Modbus polling CLI
//!
//! A stand-in host for the `modbus_feed` driver: it configures the driver
//! from command-line arguments, opens the connection and streams one CSV
//! frame per successful poll to stdout until interrupted.

use anyhow::{bail, Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use modbus_feed::config::Mode;
use modbus_feed::driver::{ConnectionState, DriverEvent, ModbusDriver};
use modbus_feed::store::ConfigStore;
use std::io::{stdout, Write};
use std::panic;

mod commandline;

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown_file>", 0, 0));

        let cause_str = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            *s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.as_str()
        } else {
            "<unknown_panic_cause>"
        };

        error!(
            target: "panic",
            "Thread '{}' panicked at '{}': {}:{} - Cause: {}",
            std::thread::current().name().unwrap_or("<unnamed>"),
            filename,
            line,
            column,
            cause_str
        );
    }));
    log_handle
}

/// Splits "host:port" into its parts. The last colon separates the port, so
/// bracketed IPv6 literals pass through as the host.
fn split_endpoint(address: &str) -> Result<(&str, u16)> {
    let (host, port) = address
        .rsplit_once(':')
        .with_context(|| format!("Invalid address '{address}', expected host:port"))?;
    let port = port
        .parse::<u16>()
        .with_context(|| format!("Invalid port in '{address}'"))?;
    if host.is_empty() {
        bail!("Invalid address '{address}', host must not be empty");
    }
    Ok((host.trim_matches(['[', ']']), port))
}

fn apply_poll_args(driver: &ModbusDriver, poll: &commandline::PollArgs) {
    driver.set_slave_address(poll.slave);
    driver.set_function_code(poll.function_code);
    driver.set_start_address(poll.start_address);
    driver.set_register_count(poll.count);
    if !driver.set_poll_interval(poll.poll_interval)
        && driver.config().poll_interval.get() != poll.poll_interval
    {
        warn!(
            "Poll interval {:?} is below the 100 ms minimum, keeping {}",
            poll.poll_interval,
            driver.config().poll_interval
        );
    }
}

fn handle_list_ports(driver: &ModbusDriver) {
    // Skip the "no selection" placeholder at index 0.
    let names = &driver.ports().names()[1..];
    if names.is_empty() {
        println!("No serial ports found.");
    } else {
        for name in names {
            println!("{name}");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = commandline::CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());
    info!(
        "mbfeed started. Log level: {}",
        args.verbose.log_level_filter()
    );

    let store = match &args.settings_file {
        Some(path) => ConfigStore::load(path.clone()),
        None => ConfigStore::ephemeral(),
    };
    let (mut driver, mut events) = ModbusDriver::new(store);
    driver.refresh_ports();

    match &args.connection {
        commandline::CliConnection::ListPorts => {
            handle_list_ports(&driver);
            return Ok(());
        }
        commandline::CliConnection::Tcp { address, poll } => {
            let (host, port) = split_endpoint(address)?;
            driver.set_mode(Mode::Tcp);
            driver.set_tcp_host(host);
            driver.set_tcp_port(port);
            apply_poll_args(&driver, poll);
        }
        commandline::CliConnection::Rtu {
            device,
            baud_rate,
            parity,
            poll,
        } => {
            driver.set_mode(Mode::Rtu);
            let index = driver
                .ports()
                .names()
                .iter()
                .position(|name| name == device)
                .with_context(|| {
                    format!("Serial port '{device}' not found; try `mbfeed list-ports`")
                })?;
            driver.set_serial_port_index(index as u8);
            driver.set_baud_rate(*baud_rate);
            driver.set_parity(*parity);
            apply_poll_args(&driver, poll);
        }
    }

    if !driver.configuration_ok() {
        bail!("Configuration is incomplete for the selected mode");
    }

    driver
        .open()
        .await
        .with_context(|| "Cannot open Modbus connection")?;
    info!("Connected; streaming frames to stdout, press Ctrl-C to stop");

    let mut out = stdout();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, closing connection");
                break;
            }
            event = events.recv() => {
                match event {
                    Some(DriverEvent::DataReceived(frame)) => {
                        out.write_all(&frame)
                            .and_then(|()| out.flush())
                            .context("Failed to write to stdout")?;
                    }
                    Some(DriverEvent::ConnectionError(message)) => {
                        warn!("Connection error: {message}");
                    }
                    Some(DriverEvent::StateChanged(ConnectionState::Disconnected)) => {
                        warn!("Transport disconnected, stopping");
                        break;
                    }
                    Some(DriverEvent::StateChanged(state)) => {
                        debug!("Connection state: {state}");
                    }
                    None => break,
                }
            }
        }
    }

    driver.close();
    Ok(())
}
