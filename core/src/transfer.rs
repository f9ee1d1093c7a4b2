//! Paced sending of files and raw byte blocks to the device.
//!
//! Slow devices drop characters when a whole file arrives at line rate, so
//! a transfer can wait after every character, after every line, or both.
//! Unpaced data goes out in [`UNPACED_CHUNK_SIZE`] pieces. The task yields
//! between pieces and races every wait against a [`CancellationToken`], so
//! a transfer can be abandoned promptly. Transfers write to the device only
//! and never touch the receive buffer.

use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use tokio::runtime::{Handle, RuntimeFlavor};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::TransferError;

/// Largest piece written in one go when no delays are configured.
pub const UNPACED_CHUNK_SIZE: usize = 1024;

/// Pauses inserted between pieces of a transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferDelays {
    /// Wait after each character.
    pub char_delay: Duration,
    /// Wait after each `\n` (replaces the character delay for that byte).
    pub line_delay: Duration,
}

impl TransferDelays {
    pub fn from_millis(char_delay_ms: u64, line_delay_ms: u64) -> Self {
        Self {
            char_delay: Duration::from_millis(char_delay_ms),
            line_delay: Duration::from_millis(line_delay_ms),
        }
    }

    fn is_unpaced(&self) -> bool {
        self.char_delay.is_zero() && self.line_delay.is_zero()
    }

    /// Split `data` into the pieces written between pauses.
    fn segments<'a>(&self, data: &'a [u8]) -> Vec<&'a [u8]> {
        if self.is_unpaced() {
            data.chunks(UNPACED_CHUNK_SIZE).collect()
        } else if !self.char_delay.is_zero() {
            data.chunks(1).collect()
        } else {
            data.split_inclusive(|&b| b == b'\n').collect()
        }
    }

    fn pause_after(&self, segment: &[u8]) -> Duration {
        if segment.ends_with(b"\n") && !self.line_delay.is_zero() {
            self.line_delay
        } else {
            self.char_delay
        }
    }
}

/// Write `data` to `writer`, pacing it according to `delays`.
///
/// `progress` is called with `(sent, total)` after each piece. Returns the
/// number of bytes written. Cancellation is checked before every piece and
/// during every pause.
pub async fn send_bytes<W, P>(
    writer: &mut W,
    data: &[u8],
    delays: TransferDelays,
    cancel: &CancellationToken,
    mut progress: P,
) -> Result<usize, TransferError>
where
    W: Write + ?Sized,
    P: FnMut(usize, usize),
{
    let total = data.len();
    let mut sent = 0;

    for segment in delays.segments(data) {
        if cancel.is_cancelled() {
            info!(sent, total, "Transfer cancelled");
            return Err(TransferError::Cancelled { sent });
        }

        write_segment(writer, segment)?;
        sent += segment.len();
        progress(sent, total);

        if sent == total {
            break;
        }
        let pause = delays.pause_after(segment);
        if pause.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(sent, total, "Transfer cancelled");
                    return Err(TransferError::Cancelled { sent });
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    debug!(sent, "Transfer complete");
    Ok(sent)
}

/// Serial writes block, so on a multi-threaded runtime the worker is
/// handed off for the duration of the write.
fn write_segment<W: Write + ?Sized>(writer: &mut W, segment: &[u8]) -> io::Result<()> {
    let mut write = || -> io::Result<()> {
        writer.write_all(segment)?;
        writer.flush()
    };
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            tokio::task::block_in_place(write)
        }
        _ => write(),
    }
}

/// Read the file at `path` and send it with [`send_bytes`].
pub async fn send_file<W, P>(
    path: &Path,
    writer: &mut W,
    delays: TransferDelays,
    cancel: &CancellationToken,
    progress: P,
) -> Result<usize, TransferError>
where
    W: Write + ?Sized,
    P: FnMut(usize, usize),
{
    let data = tokio::fs::read(path)
        .await
        .map_err(|source| TransferError::Read {
            path: path.display().to_string(),
            source,
        })?;
    info!(path = %path.display(), bytes = data.len(), "Sending file");
    send_bytes(writer, &data, delays, cancel, progress).await
}
