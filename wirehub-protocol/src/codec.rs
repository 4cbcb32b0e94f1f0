//! Incremental frame decoder.

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::DEFAULT_MAX_PAYLOAD;
use bytes::BytesMut;

/// Decodes frames from an append-only byte buffer.
///
/// Feed socket reads with [`extend`](Decoder::extend) and drain complete
/// frames with [`decode_frame`](Decoder::decode_frame).
pub struct Decoder {
    buffer: BytesMut,
    max_payload: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
            max_payload: DEFAULT_MAX_PAYLOAD,
        }
    }

    /// Sets the maximum accepted payload length.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer, self.max_payload)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
