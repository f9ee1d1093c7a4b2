//! Sinks that consume bytes leaving the receive buffer: display rendering,
//! log capture and file export.

pub mod hex;
pub mod log;
pub mod sink;

pub use sink::{SharedSink, Sink, TeeSink, WriterSink};
