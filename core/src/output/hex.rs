//! Hex view: renders received bytes as rows of two-digit hex values.
//!
//! ```text
//! 00000000  48 65 6C 6C 6F 0D 0A 57
//! 00000008  6F 72 6C 64
//! ```
//!
//! Row position and the running offset survive across calls, so a stream
//! delivered in many small chunks renders exactly like one large write.

use std::fmt::Write as _;
use std::io::Write;

use crate::errors::SinkError;
use crate::output::Sink;

/// Default number of bytes rendered per row.
pub const DEFAULT_BYTES_PER_LINE: usize = 16;

/// Sink that formats bytes as a hex dump before writing them out.
#[derive(Debug)]
pub struct HexDumpSink<W> {
    inner: W,
    bytes_per_line: usize,
    show_index: bool,
    /// Bytes already printed on the current row.
    column: usize,
    /// Total bytes rendered since the last reset.
    offset: usize,
}

impl<W: Write + Send> HexDumpSink<W> {
    /// Create a hex view writing to `inner`.
    ///
    /// A `bytes_per_line` of zero is treated as one.
    pub fn new(inner: W, bytes_per_line: usize, show_index: bool) -> Self {
        Self {
            inner,
            bytes_per_line: bytes_per_line.max(1),
            show_index,
            column: 0,
            offset: 0,
        }
    }

    /// Render `data` into the hex layout without writing it.
    pub fn format(&mut self, data: &[u8]) -> String {
        let mut out = String::with_capacity(data.len() * 3 + 16);
        for &byte in data {
            if self.column == 0 && self.show_index {
                let _ = write!(out, "{:08X}  ", self.offset);
            }
            let _ = write!(out, "{byte:02X}");
            self.column += 1;
            self.offset += 1;
            if self.column == self.bytes_per_line {
                out.push('\n');
                self.column = 0;
            } else {
                out.push(' ');
            }
        }
        out
    }

    /// Start a fresh dump at offset zero, terminating any partial row.
    pub fn reset(&mut self) -> Result<(), SinkError> {
        if self.column != 0 {
            self.inner.write_all(b"\n")?;
            self.inner.flush()?;
        }
        self.column = 0;
        self.offset = 0;
        Ok(())
    }

    /// Total bytes rendered since the last reset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

impl<W: Write + Send> Sink for HexDumpSink<W> {
    fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        if data.is_empty() {
            return Ok(());
        }
        let rendered = self.format(data);
        self.inner.write_all(rendered.as_bytes())?;
        self.inner.flush()?;
        Ok(())
    }
}
