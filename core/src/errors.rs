//! Error types for the Sellerie core crate.
//!
//! The receive buffer itself is total; the only errors it can surface come
//! from sinks during a replay. Everything around it (serial sessions, file
//! transfers, macro parsing, settings) has its own enum, and [`CoreError`]
//! collects them for callers that just want one type.

use thiserror::Error;

/// Top-level error type encompassing all core error categories.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A sink failed while consuming bytes.
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// A serial-session error.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// A file transfer to the device failed or was cancelled.
    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    /// A macro definition could not be parsed.
    #[error("Macro error: {0}")]
    Macro(#[from] MacroError),

    /// A configuration error (invalid values, missing fields, parse failures).
    #[error("Config error: {0}")]
    Config(String),

    /// A low-level I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by a [`Sink`](crate::output::Sink).
#[derive(Error, Debug)]
pub enum SinkError {
    /// The underlying writer failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The sink no longer accepts data (e.g. a stopped log file).
    #[error("Sink closed")]
    Closed,

    /// Catch-all for sink-specific failures.
    #[error("{0}")]
    Other(String),
}

/// Errors related to the serial session lifecycle.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The session configuration is invalid.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// The serial port could not be opened.
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    /// The session exists but is no longer running.
    #[error("Session not running: {0}")]
    NotRunning(String),

    /// A low-level I/O error during session operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while sending a file or macro to the device.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The transfer was cancelled after `sent` bytes reached the device.
    #[error("Transfer cancelled after {sent} bytes")]
    Cancelled { sent: usize },

    /// The source file could not be read.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Writing to the device failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors in a macro definition string.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MacroError {
    /// A backslash escape that is not recognised.
    #[error("Unknown escape '\\{escape}' at offset {offset}")]
    UnknownEscape { escape: char, offset: usize },

    /// A `\x` escape not followed by two hex digits.
    #[error("Invalid hex escape at offset {offset}")]
    InvalidHex { offset: usize },

    /// The definition ends with a lone backslash.
    #[error("Dangling backslash at end of macro")]
    DanglingEscape,

    /// No macro with the given name is defined.
    #[error("Macro not found: {0}")]
    NotFound(String),
}
