//! Raw capture of received bytes to a log file.
//!
//! The log is opened in append mode so restarting a capture on the same
//! path never truncates earlier sessions. While paused or stopped the sink
//! accepts and drops data.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::errors::SinkError;
use crate::output::Sink;

/// Attempts made for a single chunk before giving up on a transient error.
const MAX_WRITE_ATTEMPTS: usize = 3;

/// Log-file sink with start/pause/resume/stop control.
#[derive(Debug, Default)]
pub struct LogSink {
    file: Option<File>,
    path: Option<PathBuf>,
    paused: bool,
}

impl LogSink {
    /// Create an inactive log sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path` for appending and start capturing. Any previous log is
    /// closed first.
    pub fn start(&mut self, path: impl AsRef<Path>) -> Result<(), SinkError> {
        let path = path.as_ref();
        self.stop();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!(path = %path.display(), "Logging started");
        self.file = Some(file);
        self.path = Some(path.to_path_buf());
        self.paused = false;
        Ok(())
    }

    /// Stop capturing and close the file.
    pub fn stop(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.flush() {
                warn!("Failed to flush log file: {}", e);
            }
            if let Some(path) = self.path.take() {
                info!(path = %path.display(), "Logging stopped");
            }
        }
        self.paused = false;
    }

    /// Temporarily drop incoming data without closing the file.
    pub fn pause(&mut self) {
        if self.file.is_some() {
            debug!("Logging paused");
            self.paused = true;
        }
    }

    /// Resume capturing after [`pause`](Self::pause).
    pub fn resume(&mut self) {
        if self.file.is_some() {
            debug!("Logging resumed");
            self.paused = false;
        }
    }

    /// True when a file is open and capture is not paused.
    pub fn is_active(&self) -> bool {
        self.file.is_some() && !self.paused
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Path of the open log file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Sink for LogSink {
    fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        if self.paused || data.is_empty() {
            return Ok(());
        }
        match self.file.as_mut() {
            Some(file) => write_with_retry(file, data).map_err(SinkError::from),
            None => Ok(()),
        }
    }
}

/// Write all of `data`, retrying `Interrupted`/`WouldBlock` up to
/// [`MAX_WRITE_ATTEMPTS`] times in a row.
fn write_with_retry<W: Write>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    let mut written = 0;
    let mut attempts = 0;
    while written < data.len() {
        match writer.write(&data[written..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "log file accepted no data",
                ))
            }
            Ok(n) => {
                written += n;
                attempts = 0;
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
                ) =>
            {
                attempts += 1;
                if attempts >= MAX_WRITE_ATTEMPTS {
                    warn!(written, total = data.len(), "Giving up on log write");
                    return Err(e);
                }
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
