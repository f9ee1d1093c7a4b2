//! Streaming CRLF auto-normalization.
//!
//! Rewrites bare `\r`, bare `\n` and `\r\n` into canonical `\r\n` pairs.
//! One bit of state (an unresolved trailing `\r`) is carried between calls,
//! so the result does not depend on how the stream is chunked.
//!
//! Two consecutive carriage returns produce `\r\n\r`: the second `\r`
//! closes the first line and then stays pending itself.

const CR: u8 = b'\r';
const LF: u8 = b'\n';

/// Stateful CRLF filter. Create one per stream and feed it every chunk in
/// arrival order.
#[derive(Debug, Default, Clone)]
pub struct CrlfNormalizer {
    pending_cr: bool,
}

impl CrlfNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize `input` into a freshly allocated buffer.
    ///
    /// The output is between `input.len()` and `2 * input.len()` bytes.
    pub fn normalize(&mut self, input: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(input.len());
        self.normalize_into(input, &mut out);
        out
    }

    /// Normalize `input`, appending the result to `out`.
    pub fn normalize_into(&mut self, input: &[u8], out: &mut Vec<u8>) {
        for &byte in input {
            match byte {
                CR => {
                    if self.pending_cr {
                        out.push(LF);
                    }
                    self.pending_cr = true;
                    out.push(CR);
                }
                LF => {
                    if !self.pending_cr {
                        out.push(CR);
                    }
                    self.pending_cr = false;
                    out.push(LF);
                }
                other => {
                    if self.pending_cr {
                        out.push(LF);
                    }
                    self.pending_cr = false;
                    out.push(other);
                }
            }
        }
    }

    /// Whether the last byte seen was a `\r` still waiting for its `\n`.
    pub fn pending_cr(&self) -> bool {
        self.pending_cr
    }

    /// Forget any pending `\r`.
    pub fn reset(&mut self) {
        self.pending_cr = false;
    }
}
