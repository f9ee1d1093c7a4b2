//! Serial port session: config parsing, port opening, and the background
//! reader that feeds the receive buffer.
//!
//! The reader runs on a dedicated OS thread because the `serialport` crate
//! is blocking. Each successful `read()` becomes one
//! [`ReceiveBuffer::append`] call, made while holding the buffer's lock, so
//! appends happen in arrival order and run to completion.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::buffer::ReceiveBuffer;
use crate::config::SerialConfig;
use crate::errors::SessionError;

/// Line settings resolved into `serialport` types.
///
/// The reader thread keeps one of these for its whole life and reopens the
/// device from it after every disconnect.
#[derive(Debug, Clone)]
pub struct ParsedSerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: serialport::DataBits,
    pub stop_bits: serialport::StopBits,
    pub parity: serialport::Parity,
    pub flow_control: serialport::FlowControl,
}

/// Resolve the user-facing line settings.
///
/// Only the device name and the speed are checked; an unrecognised
/// framing value falls back to 8N1 with no flow control, the common case
/// for USB serial adapters.
pub fn parse_serial_config(config: &SerialConfig) -> Result<ParsedSerialConfig, SessionError> {
    if config.port.is_empty() {
        return Err(SessionError::InvalidConfig("no serial device given".into()));
    }
    if config.baud_rate == 0 {
        return Err(SessionError::InvalidConfig(format!(
            "{}: speed must be non-zero",
            config.port
        )));
    }

    Ok(ParsedSerialConfig {
        port: config.port.clone(),
        baud_rate: config.baud_rate,
        data_bits: data_bits(config.data_bits),
        stop_bits: stop_bits(config.stop_bits),
        parity: parity(&config.parity),
        flow_control: flow_control(&config.flow_control),
    })
}

fn data_bits(bits: u8) -> serialport::DataBits {
    use serialport::DataBits::*;
    match bits {
        5 => Five,
        6 => Six,
        7 => Seven,
        _ => Eight,
    }
}

fn stop_bits(bits: u8) -> serialport::StopBits {
    if bits == 2 {
        serialport::StopBits::Two
    } else {
        serialport::StopBits::One
    }
}

fn parity(name: &str) -> serialport::Parity {
    match name {
        "odd" => serialport::Parity::Odd,
        "even" => serialport::Parity::Even,
        _ => serialport::Parity::None,
    }
}

fn flow_control(name: &str) -> serialport::FlowControl {
    match name {
        "hardware" => serialport::FlowControl::Hardware,
        "software" => serialport::FlowControl::Software,
        _ => serialport::FlowControl::None,
    }
}

/// Open the device. Reads time out after [`READ_TIMEOUT`] so the reader
/// can poll for a close request between reads.
pub fn open_serial_port(
    config: &ParsedSerialConfig,
) -> Result<Box<dyn serialport::SerialPort>, SessionError> {
    let builder = serialport::new(&config.port, config.baud_rate)
        .data_bits(config.data_bits)
        .stop_bits(config.stop_bits)
        .parity(config.parity)
        .flow_control(config.flow_control)
        .timeout(READ_TIMEOUT);
    builder
        .open()
        .map_err(|e| SessionError::SpawnFailed(format!("cannot open {}: {e}", config.port)))
}

/// Names of the serial devices the OS reports, empty when enumeration is
/// unsupported or fails.
pub fn list_serial_ports() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|info| info.port_name).collect(),
        Err(e) => {
            debug!("Port enumeration failed: {e}");
            Vec::new()
        }
    }
}

/// Status of a serial port connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerialStatus {
    Connected,
    Disconnected,
    Reconnecting,
    Error(String),
}

/// Reconnect interval used by [`serial_reader_loop`].
const RECONNECT_INTERVAL: Duration = Duration::from_secs(3);

/// Granularity of the reconnect wait; bounds how long `close()` can block.
const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(50);

const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Size of the scratch buffer handed to each `read()`.
const READ_CHUNK_SIZE: usize = 1024;

type PortSlot = Arc<Mutex<Option<Box<dyn serialport::SerialPort>>>>;

/// Write half of a serial session.
///
/// Cheap to clone; all clones write to whichever port handle the reader
/// most recently opened. Writes fail with `NotConnected` while the port is
/// down.
#[derive(Clone)]
pub struct SerialWriter {
    slot: PortSlot,
}

impl Write for SerialWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|e| io::Error::other(format!("Failed to lock writer: {e}")))?;
        match guard.as_mut() {
            Some(port) => port.write(buf),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "serial port is not connected",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .slot
            .lock()
            .map_err(|e| io::Error::other(format!("Failed to lock writer: {e}")))?;
        match guard.as_mut() {
            Some(port) => port.flush(),
            None => Ok(()),
        }
    }
}

/// A running serial session: reader thread plus shared writer.
///
/// # Lifecycle
///
/// 1. [`SerialSession::start()`] spawns the reader, which opens the port.
/// 2. Use [`writer()`](Self::writer) / [`write()`](Self::write) to send.
/// 3. [`close()`](Self::close) stops the reader and releases the port.
pub struct SerialSession {
    port: String,
    writer: SerialWriter,
    alive: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl SerialSession {
    /// Spawn the reader thread for `config`, appending everything it
    /// receives to `buffer`.
    pub fn start(
        config: ParsedSerialConfig,
        buffer: Arc<Mutex<ReceiveBuffer>>,
        crlf_auto: bool,
        status_fn: impl Fn(SerialStatus) + Send + 'static,
    ) -> Result<Self, SessionError> {
        let slot: PortSlot = Arc::new(Mutex::new(None));
        let alive = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let port = config.port.clone();

        let ctx = ReaderContext {
            config,
            buffer,
            crlf_auto,
            slot: slot.clone(),
            alive: alive.clone(),
            closed: closed.clone(),
        };
        let reader = std::thread::Builder::new()
            .name("serial-reader".into())
            .spawn(move || serial_reader_loop(&ctx, &status_fn))
            .map_err(|e| SessionError::SpawnFailed(format!("Failed to spawn reader: {e}")))?;

        info!(port = %port, "Serial session started");

        Ok(Self {
            port,
            writer: SerialWriter { slot },
            alive,
            closed,
            reader: Some(reader),
        })
    }

    /// Handle for writing to the device (e.g. for file transfers).
    pub fn writer(&self) -> SerialWriter {
        self.writer.clone()
    }

    /// Write and flush `data` to the device.
    pub fn write(&self, data: &[u8]) -> Result<(), SessionError> {
        if !self.is_alive() {
            return Err(SessionError::NotRunning(self.port.clone()));
        }
        let mut writer = self.writer.clone();
        writer.write_all(data)?;
        writer.flush()?;
        Ok(())
    }

    /// Whether the port is currently open.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Stop the reader thread and release the port.
    pub fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!(port = %self.port, "Serial reader thread panicked");
            }
        }
        self.writer
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.alive.store(false, Ordering::SeqCst);
        info!(port = %self.port, "Serial session closed");
    }
}

impl Drop for SerialSession {
    fn drop(&mut self) {
        if self.reader.is_some() {
            self.close();
        }
    }
}

/// State shared by the reader thread's loops.
struct ReaderContext {
    config: ParsedSerialConfig,
    buffer: Arc<Mutex<ReceiveBuffer>>,
    crlf_auto: bool,
    slot: PortSlot,
    alive: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl ReaderContext {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Open the port, publish its write half, and return the read half.
    fn connect(&self) -> Result<Box<dyn serialport::SerialPort>, SessionError> {
        let port = open_serial_port(&self.config)?;
        let reader = port
            .try_clone()
            .map_err(|e| SessionError::SpawnFailed(format!("Failed to clone serial port: {e}")))?;
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(port);
        self.alive.store(true, Ordering::SeqCst);
        Ok(reader)
    }

    /// Sleep for [`RECONNECT_INTERVAL`], waking early if the session is
    /// closed. Returns whether it was.
    fn wait_for_retry(&self) -> bool {
        let mut waited = Duration::ZERO;
        while waited < RECONNECT_INTERVAL {
            if self.is_closed() {
                return true;
            }
            std::thread::sleep(CLOSE_POLL_INTERVAL);
            waited += CLOSE_POLL_INTERVAL;
        }
        self.is_closed()
    }

    fn disconnect(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Background serial port reader loop with automatic reconnection.
///
/// Opens the port, appends every chunk read to the receive buffer, and
/// calls `status_fn` on connection state changes. On read errors (other
/// than timeout), enters a reconnect loop that retries every 3 seconds
/// until the port reappears or `closed` is set.
fn serial_reader_loop(ctx: &ReaderContext, status_fn: &(impl Fn(SerialStatus) + Send)) {
    info!(
        port = %ctx.config.port,
        baud_rate = ctx.config.baud_rate,
        "Opening serial port"
    );

    match ctx.connect() {
        Ok(mut reader) => {
            status_fn(SerialStatus::Connected);
            read_loop(ctx, &mut reader, status_fn);
        }
        Err(e) => {
            status_fn(SerialStatus::Error(e.to_string()));
            reconnect_loop(ctx, status_fn);
        }
    }

    ctx.disconnect();
}

/// Core read loop, re-entered after every successful reconnection.
fn read_loop(
    ctx: &ReaderContext,
    reader: &mut Box<dyn serialport::SerialPort>,
    status_fn: &(impl Fn(SerialStatus) + Send),
) {
    let mut buf = [0u8; READ_CHUNK_SIZE];

    loop {
        if ctx.is_closed() {
            return;
        }

        match reader.read(&mut buf) {
            Ok(0) => {
                info!(port = %ctx.config.port, "Serial port closed (EOF)");
                ctx.disconnect();
                status_fn(SerialStatus::Disconnected);
                return;
            }
            Ok(n) => {
                ctx.buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .append(&buf[..n], ctx.crlf_auto);
            }
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                continue;
            }
            Err(e) => {
                warn!(port = %ctx.config.port, "Serial read failed: {}", e);
                ctx.disconnect();
                status_fn(SerialStatus::Disconnected);
                status_fn(SerialStatus::Error(e.to_string()));
                reconnect_loop(ctx, status_fn);
                return;
            }
        }
    }
}

/// Retry opening the serial port every [`RECONNECT_INTERVAL`] until
/// success or `closed` is set. On success, enters the read loop.
fn reconnect_loop(ctx: &ReaderContext, status_fn: &(impl Fn(SerialStatus) + Send)) {
    loop {
        if ctx.is_closed() {
            return;
        }

        if ctx.wait_for_retry() {
            return;
        }

        status_fn(SerialStatus::Reconnecting);

        match ctx.connect() {
            Ok(mut reader) => {
                info!(port = %ctx.config.port, "Serial port reconnected");
                status_fn(SerialStatus::Connected);
                read_loop(ctx, &mut reader, status_fn);
                return;
            }
            Err(e) => {
                debug!(port = %ctx.config.port, "Reconnect failed: {}", e);
                continue;
            }
        }
    }
}
