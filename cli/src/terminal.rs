//! Interactive session: serial reader feeding the receive buffer, stdin
//! lines and tilde commands going the other way.

use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use sellerie_core::buffer::ReceiveBuffer;
use sellerie_core::config::Settings;
use sellerie_core::errors::TransferError;
use sellerie_core::macros::MacroSet;
use sellerie_core::output::log::LogSink;
use sellerie_core::output::{SharedSink, TeeSink, WriterSink};
use sellerie_core::serial::{parse_serial_config, SerialSession, SerialStatus};
use sellerie_core::transfer::{self, TransferDelays};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands::{self, Command};
use crate::display::Display;

type StdoutDisplay = SharedSink<Display<io::Stdout>>;

/// Whether the command loop should keep going.
enum Flow {
    Continue,
    Quit,
}

pub struct Terminal {
    settings: Settings,
    buffer: Arc<Mutex<ReceiveBuffer>>,
    log: SharedSink<LogSink>,
    macros: MacroSet,
    session: SerialSession,
}

impl Terminal {
    /// Open the configured port and start displaying what it sends.
    pub fn start(settings: Settings) -> anyhow::Result<Self> {
        let parsed = parse_serial_config(&settings.serial)?;
        let macros = MacroSet::from_definitions(&settings.terminal.macros)
            .context("Invalid macro in settings")?;

        let display: StdoutDisplay =
            SharedSink::new(Display::from_config(io::stdout(), &settings.terminal));
        let log = SharedSink::new(LogSink::new());
        if let Some(path) = &settings.terminal.log_file {
            let path = expand_path(path);
            log.with(|l| l.start(&path))?
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
        }

        let buffer = Arc::new(Mutex::new(wire_buffer(
            settings.terminal.buffer_capacity,
            display,
            log.clone(),
        )));

        let port = parsed.port.clone();
        let session = SerialSession::start(
            parsed,
            buffer.clone(),
            settings.terminal.crlf_auto,
            move |status| report_status(&port, &status),
        )?;

        Ok(Self {
            settings,
            buffer,
            log,
            macros,
            session,
        })
    }

    /// Run the stdin command loop until `~.`, Ctrl-C or end of input.
    pub async fn run(mut self) -> anyhow::Result<()> {
        let mut lines = spawn_stdin_reader()?;
        eprintln!(
            "[sellerie: {} at {} baud, type ~? for commands]",
            self.session.port(),
            self.settings.serial.baud_rate
        );

        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else {
                        info!("Stdin closed, shutting down");
                        break;
                    };
                    let line = line?;
                    match self.handle_line(line.trim_end_matches('\r')).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Quit) => break,
                        Err(e) => eprintln!("[error: {e:#}]"),
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, shutting down");
                    break;
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    async fn handle_line(&mut self, line: &str) -> anyhow::Result<Flow> {
        let command = commands::parse_line(line)?;
        debug!(?command, "Handling input");

        match command {
            Command::Quit => return Ok(Flow::Quit),
            Command::Send(data) => self.send(&data)?,
            Command::Clear => {
                lock(&self.buffer).clear();
                eprintln!("[buffer cleared]");
            }
            Command::Save(name) => {
                let path = name
                    .map(|n| expand_path(&n))
                    .unwrap_or_else(default_save_path);
                let saved = save_buffer(&self.buffer, &path)?;
                eprintln!("[saved {saved} bytes to {}]", path.display());
            }
            Command::SendFile(name) => self.send_file(&expand_path(&name)).await?,
            Command::Macro(name) => {
                let data = self.macros.get(&name)?.to_vec();
                self.send(&data)?;
            }
            Command::LogStart(name) => {
                let path = expand_path(&name);
                self.log.with(|l| l.start(&path))??;
                eprintln!("[logging to {}]", path.display());
            }
            Command::LogToggle => {
                let state = self.log.with(|l| {
                    if !l.is_active() {
                        None
                    } else if l.is_paused() {
                        l.resume();
                        Some("resumed")
                    } else {
                        l.pause();
                        Some("paused")
                    }
                })?;
                match state {
                    Some(state) => eprintln!("[log {state}]"),
                    None => eprintln!("[no log open]"),
                }
            }
            Command::LogStop => {
                self.log.with(|l| l.stop())?;
                eprintln!("[log closed]");
            }
            Command::Help => {
                for (cmd, what) in commands::HELP {
                    eprintln!("  {cmd:<12} {what}");
                }
            }
        }

        Ok(Flow::Continue)
    }

    /// Write `data` to the device, echoing it locally when enabled.
    fn send(&self, data: &[u8]) -> anyhow::Result<()> {
        self.session.write(data)?;
        if self.settings.terminal.local_echo {
            lock(&self.buffer).append(data, self.settings.terminal.crlf_auto);
        }
        Ok(())
    }

    async fn send_file(&self, path: &Path) -> anyhow::Result<()> {
        let delays = TransferDelays::from_millis(
            self.settings.terminal.char_delay_ms,
            self.settings.terminal.line_delay_ms,
        );
        let cancel = CancellationToken::new();
        let mut writer = self.session.writer();

        eprintln!("[sending {}, Ctrl-C to cancel]", path.display());
        let transfer = transfer::send_file(path, &mut writer, delays, &cancel, |sent, total| {
            debug!(sent, total, "Transfer progress")
        });
        tokio::pin!(transfer);

        let result = loop {
            tokio::select! {
                result = &mut transfer => break result,
                _ = tokio::signal::ctrl_c() => cancel.cancel(),
            }
        };

        match result {
            Ok(sent) => eprintln!("[sent {sent} bytes]"),
            Err(TransferError::Cancelled { sent }) => {
                eprintln!("[transfer cancelled after {sent} bytes]")
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    fn shutdown(mut self) {
        self.session.close();
        if let Err(e) = self.log.with(|l| l.stop()) {
            warn!("Failed to close log: {e}");
        }
    }
}

/// Build a receive buffer whose live sink is the display tee'd into the
/// log. Clearing the buffer also restarts the display.
pub fn wire_buffer<W>(
    capacity: usize,
    display: SharedSink<Display<W>>,
    log: SharedSink<LogSink>,
) -> ReceiveBuffer
where
    W: io::Write + Send + 'static,
{
    let mut buffer = ReceiveBuffer::new(capacity);
    buffer.set_sink(Some(Box::new(TeeSink::new(display.clone(), log))));
    buffer.set_clear_callback(Some(Box::new(move || {
        if let Err(e) = display.with(|d| d.reset()).and_then(|reset| reset) {
            warn!("Failed to reset display: {e}");
        }
    })));
    buffer
}

/// Write the buffer contents to `path`, leaving the live sink in place.
/// Returns the number of bytes written.
pub fn save_buffer(buffer: &Mutex<ReceiveBuffer>, path: &Path) -> anyhow::Result<usize> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let mut sink = WriterSink::new(file);
    let mut buffer = lock(buffer);
    buffer.replay_with_temporary_sink(&mut sink)?;
    Ok(buffer.len())
}

/// `sellerie-YYYYmmdd-HHMMSS.txt` in the current directory.
pub fn default_save_path() -> PathBuf {
    PathBuf::from(
        chrono::Local::now()
            .format("sellerie-%Y%m%d-%H%M%S.txt")
            .to_string(),
    )
}

pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn lock(buffer: &Mutex<ReceiveBuffer>) -> MutexGuard<'_, ReceiveBuffer> {
    buffer.lock().unwrap_or_else(PoisonError::into_inner)
}

fn report_status(port: &str, status: &SerialStatus) {
    match status {
        SerialStatus::Connected => eprintln!("[connected to {port}]"),
        SerialStatus::Disconnected => eprintln!("[{port} disconnected]"),
        SerialStatus::Reconnecting => eprintln!("[waiting for {port}...]"),
        SerialStatus::Error(e) => eprintln!("[{port}: {e}]"),
    }
}

/// Read stdin on a dedicated thread so a pending read never holds up
/// runtime shutdown.
fn spawn_stdin_reader() -> io::Result<mpsc::UnboundedReceiver<io::Result<String>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sellerie_core::config::{TerminalConfig, View};
    use tempfile::TempDir;

    fn hex_display() -> SharedSink<Display<Vec<u8>>> {
        let config = TerminalConfig {
            view: View::Hex,
            hex_bytes_per_line: 4,
            ..TerminalConfig::default()
        };
        SharedSink::new(Display::from_config(Vec::new(), &config))
    }

    fn rendered(display: &SharedSink<Display<Vec<u8>>>) -> String {
        display
            .with(|d| String::from_utf8(d.get_ref().clone()).unwrap())
            .unwrap()
    }

    #[test]
    fn wired_buffer_feeds_display_and_log() {
        let tmp = TempDir::new().unwrap();
        let log_path = tmp.path().join("rx.log");
        let display = hex_display();
        let log = SharedSink::new(LogSink::new());
        log.with(|l| l.start(&log_path)).unwrap().unwrap();

        let mut buffer = wire_buffer(64, display.clone(), log.clone());
        buffer.append(b"AB\n", true);
        log.with(|l| l.stop()).unwrap();

        assert_eq!(rendered(&display), "00000000  41 42 0D 0A\n");
        assert_eq!(std::fs::read(&log_path).unwrap(), b"AB\r\n");
    }

    #[test]
    fn clearing_restarts_the_display() {
        let display = hex_display();
        let mut buffer = wire_buffer(64, display.clone(), SharedSink::new(LogSink::new()));
        buffer.append(b"AB", false);
        buffer.clear();
        buffer.append(b"C", false);

        assert_eq!(rendered(&display), "00000000  41 42 \n00000000  43 ");
    }

    #[test]
    fn save_writes_buffer_contents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("capture.txt");
        let display = hex_display();
        let buffer = Mutex::new(wire_buffer(
            4,
            display.clone(),
            SharedSink::new(LogSink::new()),
        ));
        lock(&buffer).append(b"012345", false);

        let saved = save_buffer(&buffer, &path).unwrap();
        assert_eq!(saved, 4);
        assert_eq!(std::fs::read(&path).unwrap(), b"2345");

        // The display is still the live sink afterwards.
        lock(&buffer).append(b"6", false);
        assert!(rendered(&display).ends_with("36 "));
    }

    #[test]
    fn save_to_missing_directory_fails() {
        let tmp = TempDir::new().unwrap();
        let buffer = Mutex::new(ReceiveBuffer::new(8));
        let err = save_buffer(&buffer, &tmp.path().join("nope/out.txt")).unwrap_err();
        assert!(err.to_string().contains("Failed to create"));
    }

    #[test]
    fn default_save_name_is_timestamped() {
        let name = default_save_path().display().to_string();
        assert!(name.starts_with("sellerie-"));
        assert!(name.ends_with(".txt"));
        assert_eq!(name.len(), "sellerie-YYYYmmdd-HHMMSS.txt".len());
    }

    #[test]
    fn expand_path_leaves_plain_paths_alone() {
        assert_eq!(expand_path("logs/rx.log"), PathBuf::from("logs/rx.log"));
    }
}
