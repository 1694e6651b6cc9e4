//! The polling driver: connection lifecycle and poll scheduler.
//!
//! A [`ModbusDriver`] owns the validated configuration and the serial port
//! snapshot. `open()` builds the transport session from the active mode and,
//! on success, hands the `tokio-modbus` context to a dedicated poll task.
//! That task issues one read per poll interval and reports results through an
//! event channel; `close()` aborts it, which also tears down the transport.
//!
//! At most one read is ever in flight: the poll task awaits each request
//! inline, so a slow response delays the next tick instead of overlapping
//! with it.

use crate::config::{DriverConfig, FunctionCode, Mode};
use crate::error::{Error, Result};
use crate::frame::{format_frame, RegisterValues};
use crate::ports::SerialPorts;
use crate::store::ConfigStore;
use log::{debug, warn};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_modbus::client::Context;
use tokio_modbus::prelude::{Reader, SlaveContext};
use tokio_modbus::Slave;

/// Request timeout for Modbus RTU transactions.
const RTU_REQUEST_TIMEOUT: Duration = Duration::from_millis(1000);
/// Request and connect timeout for Modbus TCP.
const TCP_REQUEST_TIMEOUT: Duration = Duration::from_millis(3000);
/// Attempts per poll cycle before a timeout is surfaced.
const REQUEST_RETRIES: u32 = 3;
/// TCP connect attempts before `open()` gives up.
const CONNECT_ATTEMPTS: u32 = 3;

/// Connection state machine:
/// `Disconnected -> Connecting -> Connected -> Disconnected`, with
/// `Connecting -> Disconnected` on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        write!(f, "{name}")
    }
}

/// Events delivered to the host through the channel returned by
/// [`ModbusDriver::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverEvent {
    /// The connection state machine moved.
    StateChanged(ConnectionState),
    /// One formatted frame per successful poll.
    DataReceived(Vec<u8>),
    /// A transport or device error; polling may or may not continue
    /// depending on whether the transport survived.
    ConnectionError(String),
}

type EventSender = mpsc::UnboundedSender<DriverEvent>;

/// A Modbus RTU/TCP polling driver.
///
/// Construct one per data source; there is no global instance. The driver is
/// inert until `open()` succeeds and stops when `close()` is called, the
/// transport dies, or the driver is dropped.
#[derive(Debug)]
pub struct ModbusDriver {
    config: ConfigStore,
    ports: SerialPorts,
    events: EventSender,
    state: Arc<Mutex<ConnectionState>>,
    interval_tx: watch::Sender<Duration>,
    poll_task: Option<JoinHandle<()>>,
}

impl ModbusDriver {
    /// Creates a driver over `config` and returns it together with the
    /// receiving end of its event channel.
    pub fn new(config: ConfigStore) -> (Self, mpsc::UnboundedReceiver<DriverEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let interval = config.snapshot().poll_interval.get();
        let (interval_tx, _) = watch::channel(interval);
        let driver = Self {
            config,
            ports: SerialPorts::new(),
            events,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            interval_tx,
            poll_task: None,
        };
        (driver, receiver)
    }

    /// Opens the transport session for the configured mode and starts
    /// polling.
    ///
    /// Any existing session is closed first. An incomplete configuration
    /// (placeholder serial port in RTU mode, empty host in TCP mode) fails
    /// with [`Error::Configuration`] before any transport call.
    pub async fn open(&mut self) -> Result<()> {
        self.close();
        let config = self.config.snapshot();

        let connected = match config.mode {
            Mode::Rtu => {
                let Some(port_name) = self.ports.resolve(config.rtu.port_index) else {
                    return Err(Error::Configuration(
                        "no serial port selected for Modbus RTU".to_string(),
                    ));
                };
                let port_name = port_name.to_string();
                self.transition(ConnectionState::Connecting);
                connect_rtu(&port_name, &config)
            }
            Mode::Tcp => {
                if config.tcp.host.is_empty() {
                    return Err(Error::Configuration(
                        "TCP host must not be empty".to_string(),
                    ));
                }
                self.transition(ConnectionState::Connecting);
                connect_tcp(&config).await
            }
        };

        let ctx = match connected {
            Ok(ctx) => ctx,
            Err(e) => {
                self.transition(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        self.transition(ConnectionState::Connected);

        // The watch value may be stale if the interval was changed between
        // construction and open; re-seed it before the worker subscribes.
        self.interval_tx
            .send_replace(config.poll_interval.get());
        let worker = PollWorker {
            ctx,
            config: self.config.clone(),
            events: self.events.clone(),
            state: Arc::clone(&self.state),
            interval: self.interval_tx.subscribe(),
            request_timeout: request_timeout(config.mode),
        };
        debug!("Polling started, interval {}", config.poll_interval);
        self.poll_task = Some(tokio::spawn(worker.run()));
        Ok(())
    }

    /// Stops polling and releases the transport session. Safe to call at any
    /// time, in any state, any number of times.
    pub fn close(&mut self) {
        if let Some(task) = self.poll_task.take() {
            // Aborting the task drops the Modbus context, which closes the
            // underlying socket or serial port.
            task.abort();
            debug!("Polling stopped");
        }
        self.transition(ConnectionState::Disconnected);
    }

    /// Write support is a deliberate gap (read-only data source), reported
    /// as an explicit error rather than a silent zero-byte success.
    pub fn write(&self, data: &[u8]) -> Result<usize> {
        warn!("Rejecting write of {} bytes: not supported", data.len());
        Err(Error::WriteNotSupported)
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().expect("state lock poisoned")
    }

    /// True if the active mode has everything it needs to attempt `open()`.
    pub fn configuration_ok(&self) -> bool {
        self.config.configuration_ok(&self.ports)
    }

    /// Re-enumerates serial ports; returns whether the list changed.
    pub fn refresh_ports(&mut self) -> bool {
        self.ports.refresh()
    }

    pub fn ports(&self) -> &SerialPorts {
        &self.ports
    }

    /// Read access to the current configuration.
    pub fn config(&self) -> DriverConfig {
        self.config.snapshot()
    }

    // Setter passthroughs. Each returns whether the stored value changed;
    // rejected values are ignored.

    pub fn set_mode(&self, mode: Mode) -> bool {
        self.config.set_mode(mode)
    }

    pub fn set_slave_address(&self, address: u8) -> bool {
        self.config.set_slave_address(address)
    }

    pub fn set_function_code(&self, code: FunctionCode) -> bool {
        self.config.set_function_code(code)
    }

    pub fn set_start_address(&self, address: u16) -> bool {
        self.config.set_start_address(address)
    }

    pub fn set_register_count(&self, count: u16) -> bool {
        self.config.set_register_count(count)
    }

    /// Changing the interval while polling restarts the timer: the pending
    /// tick is dropped and the next tick fires one new period from now.
    pub fn set_poll_interval(&self, interval: Duration) -> bool {
        if self.config.set_poll_interval(interval) {
            self.interval_tx.send_replace(interval);
            true
        } else {
            false
        }
    }

    pub fn set_tcp_host(&self, host: &str) -> bool {
        self.config.set_tcp_host(host)
    }

    pub fn set_tcp_port(&self, port: u16) -> bool {
        self.config.set_tcp_port(port)
    }

    pub fn set_serial_port_index(&self, index: u8) -> bool {
        self.config.set_serial_port_index(index, &self.ports)
    }

    pub fn set_baud_rate(&self, rate: u32) -> bool {
        self.config.set_baud_rate(rate)
    }

    pub fn set_parity(&self, parity: crate::config::Parity) -> bool {
        self.config.set_parity(parity)
    }

    fn transition(&self, new: ConnectionState) {
        set_state(&self.state, &self.events, new);
    }
}

impl Drop for ModbusDriver {
    fn drop(&mut self) {
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
    }
}

fn set_state(state: &Arc<Mutex<ConnectionState>>, events: &EventSender, new: ConnectionState) {
    let mut current = state.lock().expect("state lock poisoned");
    if *current != new {
        debug!("Connection state: {current} -> {new}");
        *current = new;
        let _ = events.send(DriverEvent::StateChanged(new));
    }
}

fn request_timeout(mode: Mode) -> Duration {
    match mode {
        Mode::Rtu => RTU_REQUEST_TIMEOUT,
        Mode::Tcp => TCP_REQUEST_TIMEOUT,
    }
}

/// Opens the serial port and attaches an RTU context. 8 data bits and 1 stop
/// bit are fixed; baud rate and parity come from the configuration.
fn connect_rtu(port_name: &str, config: &DriverConfig) -> Result<Context> {
    let builder = tokio_serial::new(port_name, config.rtu.baud_rate.get())
        .parity(config.rtu.parity.into())
        .data_bits(tokio_serial::DataBits::Eight)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None);
    let port = tokio_serial::SerialStream::open(&builder)
        .map_err(|e| Error::Connect(format!("{port_name}: {e}")))?;
    Ok(tokio_modbus::client::rtu::attach_slave(
        port,
        Slave(config.slave_address.get()),
    ))
}

/// Resolves the configured endpoint and connects, retrying a few times with
/// the TCP timeout applied per attempt.
async fn connect_tcp(config: &DriverConfig) -> Result<Context> {
    let endpoint = format!("{}:{}", config.tcp.host, config.tcp.port);
    let socket_addr = tokio::net::lookup_host(&endpoint)
        .await
        .map_err(|e| Error::Connect(format!("cannot resolve {endpoint}: {e}")))?
        .next()
        .ok_or_else(|| Error::Connect(format!("no address found for {endpoint}")))?;

    let slave = Slave(config.slave_address.get());
    let mut last_error = String::new();
    for attempt in 1..=CONNECT_ATTEMPTS {
        match tokio::time::timeout(
            TCP_REQUEST_TIMEOUT,
            tokio_modbus::client::tcp::connect_slave(socket_addr, slave),
        )
        .await
        {
            Ok(Ok(ctx)) => return Ok(ctx),
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => last_error = format!("timed out after {TCP_REQUEST_TIMEOUT:?}"),
        }
        debug!("TCP connect attempt {attempt}/{CONNECT_ATTEMPTS} to {endpoint} failed: {last_error}");
    }
    Err(Error::Connect(format!("{endpoint}: {last_error}")))
}

/// The poll scheduler. Owns the Modbus context for the lifetime of one
/// connection.
struct PollWorker {
    ctx: Context,
    config: ConfigStore,
    events: EventSender,
    state: Arc<Mutex<ConnectionState>>,
    interval: watch::Receiver<Duration>,
    request_timeout: Duration,
}

impl PollWorker {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(*self.interval.borrow());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = self.interval.changed() => {
                    if changed.is_err() {
                        // Driver dropped without close(); stop quietly.
                        break;
                    }
                    let period = *self.interval.borrow_and_update();
                    debug!("Poll interval changed to {period:?}, restarting timer");
                    ticker = tokio::time::interval_at(
                        tokio::time::Instant::now() + period,
                        period,
                    );
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                }
                _ = ticker.tick() => {
                    if self.poll_once().await.is_break() {
                        set_state(&self.state, &self.events, ConnectionState::Disconnected);
                        break;
                    }
                }
            }
        }
    }

    /// One poll cycle. `Break` means the transport died and polling must
    /// stop; device exceptions and exhausted timeouts keep the loop alive.
    async fn poll_once(&mut self) -> ControlFlow<()> {
        let config = self.config.snapshot();
        self.ctx.set_slave(Slave(config.slave_address.get()));
        let start = config.start_address;
        let count = config.register_count.get();

        for attempt in 1..=REQUEST_RETRIES {
            let request = read_values(&mut self.ctx, config.function_code, start, count);
            match tokio::time::timeout(self.request_timeout, request).await {
                Ok(Ok(Ok(values))) => {
                    let _ = self
                        .events
                        .send(DriverEvent::DataReceived(format_frame(&values)));
                    return ControlFlow::Continue(());
                }
                Ok(Ok(Err(exception))) => {
                    let _ = self.events.send(DriverEvent::ConnectionError(
                        Error::Exception(exception).to_string(),
                    ));
                    return ControlFlow::Continue(());
                }
                Ok(Err(transport)) => {
                    let _ = self
                        .events
                        .send(DriverEvent::ConnectionError(transport.to_string()));
                    return ControlFlow::Break(());
                }
                Err(_elapsed) => {
                    warn!(
                        "Poll request timed out after {:?} (attempt {attempt}/{REQUEST_RETRIES})",
                        self.request_timeout
                    );
                }
            }
        }

        let _ = self.events.send(DriverEvent::ConnectionError(format!(
            "request timed out after {REQUEST_RETRIES} attempts"
        )));
        ControlFlow::Continue(())
    }
}

/// Maps the function code to the matching read call. Total over the four
/// supported codes; there is no fallthrough.
async fn read_values(
    ctx: &mut Context,
    code: FunctionCode,
    start: u16,
    count: u16,
) -> std::result::Result<
    std::result::Result<RegisterValues, tokio_modbus::ExceptionCode>,
    tokio_modbus::Error,
> {
    match code {
        FunctionCode::ReadCoils => Ok(ctx
            .read_coils(start, count)
            .await?
            .map(RegisterValues::Bits)),
        FunctionCode::ReadDiscreteInputs => Ok(ctx
            .read_discrete_inputs(start, count)
            .await?
            .map(RegisterValues::Bits)),
        FunctionCode::ReadHoldingRegisters => Ok(ctx
            .read_holding_registers(start, count)
            .await?
            .map(RegisterValues::Words)),
        FunctionCode::ReadInputRegisters => Ok(ctx
            .read_input_registers(start, count)
            .await?
            .map(RegisterValues::Words)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tokio::sync::mpsc::error::TryRecvError;

    #[tokio::test]
    async fn open_rtu_without_port_is_a_configuration_error() {
        let (mut driver, mut events) = ModbusDriver::new(ConfigStore::ephemeral());
        // Default mode is RTU with the placeholder port selected.
        let result = driver.open().await;
        assert_matches!(result, Err(Error::Configuration(_)));
        assert_eq!(driver.state(), ConnectionState::Disconnected);
        // No transport was touched, so no state events and no data.
        assert_matches!(events.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn open_tcp_with_empty_host_is_a_configuration_error() {
        let (mut driver, mut events) = ModbusDriver::new(ConfigStore::ephemeral());
        assert!(driver.set_mode(Mode::Tcp));
        assert!(driver.set_tcp_host(""));
        let result = driver.open().await;
        assert_matches!(result, Err(Error::Configuration(_)));
        assert_matches!(events.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let (mut driver, _events) = ModbusDriver::new(ConfigStore::ephemeral());
        driver.close();
        driver.close();
        assert_eq!(driver.state(), ConnectionState::Disconnected);
        assert!(!driver.is_open());
    }

    #[tokio::test]
    async fn write_is_not_supported() {
        let (driver, _events) = ModbusDriver::new(ConfigStore::ephemeral());
        assert_matches!(driver.write(b"abc"), Err(Error::WriteNotSupported));
    }

    #[tokio::test]
    async fn connect_refused_is_surfaced_and_cleaned_up() {
        let (mut driver, mut events) = ModbusDriver::new(ConfigStore::ephemeral());
        assert!(driver.set_mode(Mode::Tcp));
        // Bind-then-drop guarantees nothing is listening on the port.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        driver.set_tcp_port(port);

        let result = driver.open().await;
        assert_matches!(result, Err(Error::Connect(_)));
        assert_eq!(driver.state(), ConnectionState::Disconnected);

        // Connecting and Disconnected transitions were reported.
        assert_eq!(
            events.try_recv().unwrap(),
            DriverEvent::StateChanged(ConnectionState::Connecting)
        );
        assert_eq!(
            events.try_recv().unwrap(),
            DriverEvent::StateChanged(ConnectionState::Disconnected)
        );
    }

    #[test]
    fn interval_change_below_minimum_is_ignored() {
        let (driver, _events) = ModbusDriver::new(ConfigStore::ephemeral());
        assert!(!driver.set_poll_interval(Duration::from_millis(50)));
        assert!(driver.set_poll_interval(Duration::from_millis(250)));
        assert_eq!(*driver.interval_tx.borrow(), Duration::from_millis(250));
    }

    #[test]
    fn default_configuration_is_not_ok_for_rtu() {
        let (driver, _events) = ModbusDriver::new(ConfigStore::ephemeral());
        assert!(!driver.configuration_ok());
    }
}
