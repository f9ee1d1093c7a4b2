use crate::errors::SinkError;
use crate::output::Sink;

/// Default buffer capacity: 128 KiB.
pub const DEFAULT_BUFFER_CAPACITY: usize = 131_072;

/// Fixed-capacity circular byte buffer holding the most recent bytes
/// received from the device.
///
/// When the buffer is full, oldest data is silently overwritten. The valid
/// bytes are either the single run `data[..write_pos]` or, once the cursor
/// has wrapped, `data[write_pos..]` followed by `data[..write_pos]`.
pub struct RingBuffer {
    data: Vec<u8>,
    capacity: usize,
    /// Next index to write to. Always `< capacity`.
    write_pos: usize,
    /// Number of valid bytes, capped at `capacity`.
    len: usize,
    /// Set once `write_pos` has wrapped since the last clear.
    wrapped: bool,
}

impl RingBuffer {
    /// Create a new ring buffer with the given capacity in bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");
        Self {
            data: vec![0u8; capacity],
            capacity,
            write_pos: 0,
            len: 0,
            wrapped: false,
        }
    }

    /// Append data to the buffer, overwriting the oldest data if full.
    ///
    /// Only the last `capacity` bytes of an oversized write are kept. The
    /// returned slice is exactly what was stored, so callers can forward
    /// it to a sink.
    pub fn write<'a>(&mut self, data: &'a [u8]) -> &'a [u8] {
        let kept = if data.len() > self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };

        let room = self.capacity - self.write_pos;
        if kept.len() >= room {
            let (head, tail) = kept.split_at(room);
            self.data[self.write_pos..].copy_from_slice(head);
            self.data[..tail.len()].copy_from_slice(tail);
            self.write_pos = tail.len();
            self.wrapped = true;
        } else {
            let end = self.write_pos + kept.len();
            self.data[self.write_pos..end].copy_from_slice(kept);
            self.write_pos = end;
        }

        self.len = std::cmp::min(self.capacity, self.len + kept.len());
        kept
    }

    /// The stored bytes as `(older, newer)` runs in chronological order.
    ///
    /// `newer` is empty until the buffer has wrapped.
    pub fn runs(&self) -> (&[u8], &[u8]) {
        if self.wrapped {
            (&self.data[self.write_pos..], &self.data[..self.write_pos])
        } else {
            (&self.data[..self.write_pos], &[])
        }
    }

    /// Stream the retained history to `sink`, oldest bytes first.
    ///
    /// A wrapped buffer is delivered as two calls (older run, then newer
    /// run); otherwise the sink is called once. The first sink error stops
    /// the replay and is returned.
    pub fn replay<S: Sink + ?Sized>(&self, sink: &mut S) -> Result<(), SinkError> {
        let (older, newer) = self.runs();
        sink.write(older)?;
        if self.wrapped {
            sink.write(newer)?;
        }
        Ok(())
    }

    /// Read all buffered data in order (oldest to newest).
    pub fn read_all(&self) -> Vec<u8> {
        let (older, newer) = self.runs();
        let mut result = Vec::with_capacity(self.len);
        result.extend_from_slice(older);
        result.extend_from_slice(newer);
        result
    }

    /// Return the number of bytes currently stored.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Return true if no data is buffered.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Fixed capacity chosen at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the write cursor has wrapped since the last clear.
    pub fn is_wrapped(&self) -> bool {
        self.wrapped
    }

    /// Zero the storage and start a new epoch.
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.write_pos = 0;
        self.len = 0;
        self.wrapped = false;
    }
}
