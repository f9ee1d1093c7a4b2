//! Local receive buffer.
//!
//! [`ReceiveBuffer`] owns the ring storage, the CRLF normalizer state and
//! two callback slots: the single live sink that sees every appended chunk,
//! and an optional clear notification. It is not synchronized internally;
//! callers that share it across threads wrap it in a `Mutex` and hold the
//! lock for each call.

pub mod crlf;
pub mod ring;

use tracing::{debug, warn};

use crate::errors::SinkError;
use crate::output::Sink;

pub use crlf::CrlfNormalizer;
pub use ring::{RingBuffer, DEFAULT_BUFFER_CAPACITY};

/// Owned live sink.
pub type BoxedSink = Box<dyn Sink>;

/// Callback run after the buffer has been cleared.
pub type ClearCallback = Box<dyn FnMut() + Send>;

/// Most recent bytes received from the device plus the sink they are
/// dispatched to.
pub struct ReceiveBuffer {
    ring: RingBuffer,
    normalizer: CrlfNormalizer,
    sink: Option<BoxedSink>,
    on_clear: Option<ClearCallback>,
}

impl ReceiveBuffer {
    /// Create an empty buffer retaining at most `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RingBuffer::new(capacity),
            normalizer: CrlfNormalizer::new(),
            sink: None,
            on_clear: None,
        }
    }

    /// Append a chunk received from (or echoed to) the device.
    ///
    /// With `crlf_auto` the chunk is normalized first. Only the last
    /// `capacity` bytes of the result are kept, and the live sink, if any,
    /// is called exactly once with those kept bytes. A failing live sink is
    /// logged and otherwise ignored.
    pub fn append(&mut self, chunk: &[u8], crlf_auto: bool) {
        let normalized;
        let data = if crlf_auto {
            normalized = self.normalizer.normalize(chunk);
            normalized.as_slice()
        } else {
            chunk
        };

        let kept = self.ring.write(data);

        if let Some(sink) = self.sink.as_mut() {
            if let Err(e) = sink.write(kept) {
                warn!(bytes = kept.len(), "Live sink rejected data: {}", e);
            }
        }
    }

    /// Drop all retained bytes and the pending CR, then run the clear
    /// callback. The live sink stays registered.
    pub fn clear(&mut self) {
        self.ring.clear();
        self.normalizer.reset();
        debug!("Receive buffer cleared");
        if let Some(on_clear) = self.on_clear.as_mut() {
            on_clear();
        }
    }

    /// Stream the retained history, oldest first, to `sink`.
    pub fn replay<S: Sink + ?Sized>(&self, sink: &mut S) -> Result<(), SinkError> {
        self.ring.replay(sink)
    }

    /// Replay the retained history to the live sink. Does nothing when no
    /// sink is registered.
    pub fn replay_to_sink(&mut self) -> Result<(), SinkError> {
        match self.sink.as_mut() {
            Some(sink) => self.ring.replay(sink.as_mut()),
            None => Ok(()),
        }
    }

    /// Replay the retained history to a one-off sink such as a file
    /// writer, leaving the live sink in place afterwards.
    ///
    /// The live sink is detached for the duration of the replay and put
    /// back before returning, whether or not `sink` failed.
    pub fn replay_with_temporary_sink<S: Sink + ?Sized>(
        &mut self,
        sink: &mut S,
    ) -> Result<(), SinkError> {
        let previous = self.sink.take();
        debug!(bytes = self.ring.len(), "Replaying receive buffer");
        let result = self.ring.replay(sink);
        self.sink = previous;
        if let Err(ref e) = result {
            warn!("Replay aborted: {}", e);
        }
        result
    }

    /// Register `sink` as the live sink (or clear the slot with `None`),
    /// returning whatever was registered before.
    pub fn set_sink(&mut self, sink: Option<BoxedSink>) -> Option<BoxedSink> {
        debug!(registered = sink.is_some(), "Live sink replaced");
        std::mem::replace(&mut self.sink, sink)
    }

    /// Remove the live sink, returning it.
    pub fn unset_sink(&mut self) -> Option<BoxedSink> {
        self.set_sink(None)
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Register (or remove) the callback run by [`clear`](Self::clear).
    pub fn set_clear_callback(&mut self, callback: Option<ClearCallback>) {
        self.on_clear = callback;
    }

    /// Retained bytes in chronological order.
    pub fn read_all(&self) -> Vec<u8> {
        self.ring.read_all()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity()
    }

    pub fn is_wrapped(&self) -> bool {
        self.ring.is_wrapped()
    }

    /// Whether the normalizer is holding an unresolved `\r`.
    pub fn pending_cr(&self) -> bool {
        self.normalizer.pending_cr()
    }
}

impl Default for ReceiveBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<Vec<u8>>>>;

    fn recording_sink() -> (BoxedSink, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let clone = calls.clone();
        let sink: BoxedSink =
            Box::new(move |data: &[u8]| clone.lock().unwrap().push(data.to_vec()));
        (sink, calls)
    }

    #[test]
    fn append_without_sink_still_stores() {
        let mut buf = ReceiveBuffer::new(16);
        buf.append(b"abc", false);
        assert_eq!(buf.read_all(), b"abc");
        assert!(!buf.has_sink());
    }

    #[test]
    fn sink_called_once_per_append_with_kept_bytes() {
        let mut buf = ReceiveBuffer::new(4);
        let (sink, calls) = recording_sink();
        buf.set_sink(Some(sink));

        buf.append(b"ab", false);
        buf.append(b"cdefgh", false);

        let calls = calls.lock().unwrap();
        assert_eq!(*calls, vec![b"ab".to_vec(), b"efgh".to_vec()]);
    }

    #[test]
    fn sink_sees_normalized_bytes() {
        let mut buf = ReceiveBuffer::new(64);
        let (sink, calls) = recording_sink();
        buf.set_sink(Some(sink));

        buf.append(b"A\nB", true);
        assert_eq!(calls.lock().unwrap()[0], b"A\r\nB");
        assert_eq!(buf.read_all(), b"A\r\nB");
    }

    #[test]
    fn empty_append_still_notifies() {
        let mut buf = ReceiveBuffer::new(8);
        let (sink, calls) = recording_sink();
        buf.set_sink(Some(sink));
        buf.append(b"", true);
        assert_eq!(*calls.lock().unwrap(), vec![Vec::<u8>::new()]);
        assert!(buf.is_empty());
    }

    #[test]
    fn crlf_state_follows_append_calls() {
        let mut buf = ReceiveBuffer::new(64);
        buf.append(b"A\r", true);
        assert!(buf.pending_cr());
        buf.append(b"\nB", true);
        assert!(!buf.pending_cr());
        assert_eq!(buf.read_all(), b"A\r\nB");
    }

    #[test]
    fn set_sink_replaces_previous() {
        let mut buf = ReceiveBuffer::new(16);
        let (first, first_calls) = recording_sink();
        let (second, second_calls) = recording_sink();

        assert!(buf.set_sink(Some(first)).is_none());
        let previous = buf.set_sink(Some(second));
        assert!(previous.is_some());

        buf.append(b"x", false);
        assert!(first_calls.lock().unwrap().is_empty());
        assert_eq!(second_calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn unset_sink_stops_notifications() {
        let mut buf = ReceiveBuffer::new(16);
        let (sink, calls) = recording_sink();
        buf.set_sink(Some(sink));
        assert!(buf.unset_sink().is_some());
        assert!(!buf.has_sink());
        buf.append(b"x", false);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn failing_live_sink_does_not_break_append() {
        let mut buf = ReceiveBuffer::new(16);
        struct Rejecting;
        impl Sink for Rejecting {
            fn write(&mut self, _data: &[u8]) -> Result<(), SinkError> {
                Err(SinkError::Closed)
            }
        }
        buf.set_sink(Some(Box::new(Rejecting)));
        buf.append(b"kept anyway", false);
        assert_eq!(buf.read_all(), b"kept anyway");
    }

    #[test]
    fn clear_resets_contents_and_crlf_state() {
        let mut buf = ReceiveBuffer::new(4);
        buf.append(b"abcdef\r", true);
        assert!(buf.is_wrapped());
        assert!(buf.pending_cr());

        buf.clear();
        assert!(buf.is_empty());
        assert!(!buf.is_wrapped());
        assert!(!buf.pending_cr());

        buf.append(b"\n", true);
        assert_eq!(buf.read_all(), b"\r\n");
    }

    #[test]
    fn clear_runs_callback_and_keeps_sink() {
        let mut buf = ReceiveBuffer::new(16);
        let cleared = Arc::new(AtomicUsize::new(0));
        let counter = cleared.clone();
        buf.set_clear_callback(Some(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })));
        let (sink, _calls) = recording_sink();
        buf.set_sink(Some(sink));

        buf.clear();
        buf.clear();
        assert_eq!(cleared.load(Ordering::SeqCst), 2);
        assert!(buf.has_sink());
    }

    #[test]
    fn clear_without_callback_is_fine() {
        let mut buf = ReceiveBuffer::new(16);
        buf.append(b"data", false);
        buf.set_clear_callback(None);
        buf.clear();
        assert!(buf.is_empty());
    }

    #[test]
    fn replay_to_sink_uses_live_sink() {
        let mut buf = ReceiveBuffer::new(4);
        buf.append(b"AB", false);
        buf.append(b"CDEFG", false);

        let (sink, calls) = recording_sink();
        buf.set_sink(Some(sink));
        buf.replay_to_sink().unwrap();
        assert_eq!(calls.lock().unwrap().concat(), b"DEFG");
    }

    #[test]
    fn replay_to_sink_without_sink_is_noop() {
        let mut buf = ReceiveBuffer::new(4);
        buf.append(b"AB", false);
        assert!(buf.replay_to_sink().is_ok());
    }

    #[test]
    fn temporary_sink_gets_history_and_live_sink_is_restored() {
        let mut buf = ReceiveBuffer::new(8);
        let (live, live_calls) = recording_sink();
        buf.set_sink(Some(live));
        buf.append(b"history", false);
        live_calls.lock().unwrap().clear();

        let mut exported = Vec::new();
        buf.replay_with_temporary_sink(&mut |data: &[u8]| exported.extend_from_slice(data))
            .unwrap();
        assert_eq!(exported, b"history");
        assert!(live_calls.lock().unwrap().is_empty());

        buf.append(b"!", false);
        assert_eq!(*live_calls.lock().unwrap(), vec![b"!".to_vec()]);
    }

    #[test]
    fn temporary_sink_error_restores_live_sink() {
        struct DiskFull;
        impl Sink for DiskFull {
            fn write(&mut self, _data: &[u8]) -> Result<(), SinkError> {
                Err(SinkError::Io(std::io::Error::other("disk full")))
            }
        }

        let mut buf = ReceiveBuffer::new(8);
        let (live, live_calls) = recording_sink();
        buf.set_sink(Some(live));

        let err = buf.replay_with_temporary_sink(&mut DiskFull).unwrap_err();
        assert!(matches!(err, SinkError::Io(_)));
        assert!(buf.has_sink());

        buf.append(b"after", false);
        assert_eq!(live_calls.lock().unwrap().last().unwrap(), b"after");
    }

    #[test]
    fn default_uses_default_capacity() {
        let buf = ReceiveBuffer::default();
        assert_eq!(buf.capacity(), DEFAULT_BUFFER_CAPACITY);
        assert_eq!(buf.capacity(), 131_072);
    }
}
