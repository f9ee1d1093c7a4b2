//! The [`Sink`] capability and the general-purpose sinks built on it.
//!
//! A sink consumes byte slices pushed to it by the receive buffer: once per
//! appended chunk while it is the live sink, and once or twice per replay.
//! Implementations must be `Send` so a buffer holding one can be shared
//! with the serial reader thread.

use std::io::Write;
use std::sync::{Arc, Mutex};

use crate::errors::SinkError;

/// Consumer of byte chunks coming out of the receive buffer.
pub trait Sink: Send {
    /// Consume `data`. An empty slice is a valid, trivial write.
    fn write(&mut self, data: &[u8]) -> Result<(), SinkError>;
}

/// Any `FnMut(&[u8])` closure is an infallible sink.
impl<F> Sink for F
where
    F: FnMut(&[u8]) + Send,
{
    fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self(data);
        Ok(())
    }
}

/// Sink that forwards bytes to an [`std::io::Write`] implementation and
/// flushes after every chunk.
#[derive(Debug)]
pub struct WriterSink<W> {
    inner: W,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> Sink for WriterSink<W> {
    fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.inner.write_all(data)?;
        self.inner.flush()?;
        Ok(())
    }
}

/// Writes every chunk to two sinks, e.g. the display and a log file.
///
/// Both sinks always see the chunk; if either fails, the first error is
/// returned.
#[derive(Debug)]
pub struct TeeSink<A, B> {
    primary: A,
    secondary: B,
}

impl<A: Sink, B: Sink> TeeSink<A, B> {
    pub fn new(primary: A, secondary: B) -> Self {
        Self { primary, secondary }
    }
}

impl<A: Sink, B: Sink> Sink for TeeSink<A, B> {
    fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        let first = self.primary.write(data);
        let second = self.secondary.write(data);
        first.and(second)
    }
}

/// A sink shared between the buffer and whoever else needs to reach it
/// (to reset a hex view on clear, or to pause a log file).
///
/// Cloning yields another handle to the same sink.
#[derive(Debug)]
pub struct SharedSink<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for SharedSink<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Sink> SharedSink<S> {
    pub fn new(sink: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(sink)),
        }
    }

    /// Run `f` with exclusive access to the wrapped sink.
    pub fn with<R>(&self, f: impl FnOnce(&mut S) -> R) -> Result<R, SinkError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|e| SinkError::Other(format!("Failed to lock shared sink: {e}")))?;
        Ok(f(&mut guard))
    }
}

impl<S: Sink> Sink for SharedSink<S> {
    fn write(&mut self, data: &[u8]) -> Result<(), SinkError> {
        self.with(|sink| sink.write(data))?
    }
}
