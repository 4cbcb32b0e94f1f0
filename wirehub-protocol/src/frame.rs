//! Binary frame format.
//!
//! Frame layout (5 byte header + payload):
//!
//! ```text
//! +--------+-------------+---------------------+
//! | opcode | payload_len | payload             |
//! | 1 byte | 4 bytes BE  | payload_len bytes   |
//! +--------+-------------+---------------------+
//! ```
//!
//! The payload length is an unsigned 32-bit big-endian integer. Declared
//! lengths above the configured maximum are rejected from the header alone,
//! before any payload is buffered.

use crate::error::ProtocolError;
use crate::DEFAULT_MAX_PAYLOAD;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the fixed frame header in bytes (1 opcode + 4 length).
pub const FRAME_HEADER_SIZE: usize = 5;

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xa,
}

impl OpCode {
    /// Returns true for control frames (Close, Ping, Pong).
    pub fn is_control(&self) -> bool {
        matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
    }

    /// Returns true for data frames delivered to the application.
    pub fn is_data(&self) -> bool {
        matches!(self, OpCode::Text | OpCode::Binary)
    }
}

impl TryFrom<u8> for OpCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x0 => Ok(OpCode::Continuation),
            0x1 => Ok(OpCode::Text),
            0x2 => Ok(OpCode::Binary),
            0x8 => Ok(OpCode::Close),
            0x9 => Ok(OpCode::Ping),
            0xa => Ok(OpCode::Pong),
            other => Err(ProtocolError::InvalidOpcode(other)),
        }
    }
}

/// A parsed frame: one opcode-tagged unit of the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame opcode.
    pub opcode: OpCode,
    /// Frame payload (opaque to this layer).
    pub payload: Bytes,
}

impl Frame {
    /// Creates a new frame.
    pub fn new(opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            opcode,
            payload: payload.into(),
        }
    }

    /// Creates a Text frame.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Text, payload)
    }

    /// Creates a Binary frame.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(OpCode::Binary, payload)
    }

    /// Creates an empty Close frame.
    pub fn close() -> Self {
        Self::new(OpCode::Close, Bytes::new())
    }

    /// Creates an empty Ping frame.
    pub fn ping() -> Self {
        Self::new(OpCode::Ping, Bytes::new())
    }

    /// Creates an empty Pong frame.
    pub fn pong() -> Self {
        Self::new(OpCode::Pong, Bytes::new())
    }

    /// Encodes the frame into bytes. Pure, no I/O.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        self.encode_with_max(DEFAULT_MAX_PAYLOAD)
    }

    /// Encodes the frame, rejecting payloads above `max_payload`.
    pub fn encode_with_max(&self, max_payload: usize) -> Result<BytesMut, ProtocolError> {
        let payload_len = self.payload.len();
        if payload_len > max_payload {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: max_payload,
            });
        }

        let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload_len);
        buf.put_u8(self.opcode as u8);
        buf.put_u32(payload_len as u32);
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a frame from the buffer.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    /// Oversized declared lengths fail from the header alone.
    pub fn decode(buf: &mut BytesMut, max_payload: usize) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the header without consuming
        let opcode = OpCode::try_from(buf[0])?;
        let payload_len = u32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]) as usize;

        if payload_len > max_payload {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: max_payload,
            });
        }

        if buf.len() < FRAME_HEADER_SIZE + payload_len {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(payload_len).freeze();

        Ok(Some(Self { opcode, payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frame_roundtrip() {
        let frame = Frame::text(&b"hello"[..]);
        let mut buf = frame.encode().unwrap();
        let decoded = Frame::decode(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();

        assert_eq!(decoded.opcode, OpCode::Text);
        assert_eq!(decoded.payload.as_ref(), b"hello");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_control_frame_roundtrip() {
        for frame in [Frame::close(), Frame::ping(), Frame::pong()] {
            let mut buf = frame.encode().unwrap();
            let decoded = Frame::decode(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
            assert_eq!(decoded, frame);
        }
    }

    #[test]
    fn test_invalid_opcode() {
        let mut buf = BytesMut::from(&b"\x07\x00\x00\x00\x00"[..]);
        let result = Frame::decode(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(result, Err(ProtocolError::InvalidOpcode(0x7))));
    }

    #[test]
    fn test_incomplete_header() {
        let mut buf = BytesMut::from(&b"\x01\x00"[..]);
        assert!(Frame::decode(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        // Nothing consumed while waiting for more data
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_incomplete_payload() {
        let frame = Frame::binary(&b"abcdef"[..]);
        let encoded = frame.encode().unwrap();

        let mut buf = BytesMut::from(&encoded[..7]);
        assert!(Frame::decode(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());

        buf.extend_from_slice(&encoded[7..]);
        let decoded = Frame::decode(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(decoded.payload.as_ref(), b"abcdef");
    }

    #[test]
    fn test_frame_too_large_on_decode() {
        // Header declares a 1 MiB payload against a 1 KiB limit; no payload
        // bytes are present, the header alone is enough to reject.
        let mut buf = BytesMut::new();
        buf.put_u8(OpCode::Binary as u8);
        buf.put_u32(1024 * 1024);

        let result = Frame::decode(&mut buf, 1024);
        assert!(matches!(
            result,
            Err(ProtocolError::FrameTooLarge { size, max: 1024 }) if size == 1024 * 1024
        ));
    }

    #[test]
    fn test_frame_too_large_on_encode() {
        let frame = Frame::binary(vec![0u8; 2048]);
        let result = frame.encode_with_max(1024);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_empty_payload() {
        let frame = Frame::text(Bytes::new());
        let mut buf = frame.encode().unwrap();
        let decoded = Frame::decode(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&Frame::text(&b"one"[..]).encode().unwrap());
        buf.extend_from_slice(&Frame::binary(&b"two"[..]).encode().unwrap());

        let first = Frame::decode(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(first.payload.as_ref(), b"one");

        let second = Frame::decode(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(second.opcode, OpCode::Binary);
        assert_eq!(second.payload.as_ref(), b"two");
    }

    #[test]
    fn test_opcode_classification() {
        assert!(OpCode::Ping.is_control());
        assert!(OpCode::Close.is_control());
        assert!(!OpCode::Text.is_control());

        assert!(OpCode::Text.is_data());
        assert!(OpCode::Binary.is_data());
        assert!(!OpCode::Pong.is_data());
    }

    proptest! {
        #[test]
        fn prop_roundtrip(opcode in prop_oneof![
            Just(OpCode::Continuation),
            Just(OpCode::Text),
            Just(OpCode::Binary),
            Just(OpCode::Close),
            Just(OpCode::Ping),
            Just(OpCode::Pong),
        ], payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let frame = Frame::new(opcode, payload.clone());
            let mut buf = frame.encode().unwrap();
            let decoded = Frame::decode(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();

            prop_assert_eq!(decoded.opcode, opcode);
            prop_assert_eq!(decoded.payload.as_ref(), &payload[..]);
            prop_assert!(buf.is_empty());
        }
    }
}
