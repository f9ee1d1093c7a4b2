//! Shared helpers for the receive-buffer integration tests.

// Each integration test is compiled as its own crate, so not every test file
// uses every function from this shared module. Suppress dead_code warnings.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use sellerie_core::buffer::BoxedSink;

/// Every chunk a recording sink has received, one entry per call.
pub type Calls = Arc<Mutex<Vec<Vec<u8>>>>;

/// Build a boxed live sink that records each call, plus a handle to the
/// recorded calls.
pub fn recording_sink() -> (BoxedSink, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let clone = calls.clone();
    let sink: BoxedSink = Box::new(move |data: &[u8]| clone.lock().unwrap().push(data.to_vec()));
    (sink, calls)
}

/// All recorded bytes concatenated in call order.
pub fn concat(calls: &Calls) -> Vec<u8> {
    calls.lock().unwrap().concat()
}

/// Deterministic pseudo-random bytes (xorshift) biased towards CR/LF.
pub fn noisy_bytes(len: usize, mut seed: u32) -> Vec<u8> {
    (0..len)
        .map(|_| {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            match seed % 5 {
                0 => b'\r',
                1 => b'\n',
                _ => b'a' + (seed % 26) as u8,
            }
        })
        .collect()
}
