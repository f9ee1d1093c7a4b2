//! The terminal's view of received data: raw text or a hex dump.

use std::io::Write;

use sellerie_core::config::{TerminalConfig, View};
use sellerie_core::errors::SinkError;
use sellerie_core::output::hex::HexDumpSink;
use sellerie_core::output::{Sink, WriterSink};

pub enum Display<W> {
    Ascii(WriterSink<W>),
    Hex(HexDumpSink<W>),
}

impl<W: Write + Send> Display<W> {
    pub fn from_config(out: W, config: &TerminalConfig) -> Self {
        match config.view {
            View::Ascii => Self::Ascii(WriterSink::new(out)),
            View::Hex => Self::Hex(HexDumpSink::new(
                out,
                config.hex_bytes_per_line,
                config.hex_show_index,
            )),
        }
    }

    /// Called when the receive buffer is cleared. The hex view restarts
    /// its offset on a fresh row; raw text needs nothing.
    pub fn reset(&mut self) -> Result<(), SinkError> {
        match self {
            Self::Ascii(_) => Ok(()),
            Self::Hex(hex) => hex.reset(),
        }
    }

    pub fn get_ref(&self) -> &W {
        match self {
            Self::Ascii(sink) => sink.get_ref(),
            Self::Hex(hex) => hex.get_ref(),
        }
    }
}

impl<W: Write + Send> Sink for Display<W> {
    fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        match self {
            Self::Ascii(sink) => sink.write(data),
            Self::Hex(hex) => hex.write(data),
        }
    }
}
