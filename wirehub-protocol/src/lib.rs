//! # wirehub-protocol
//!
//! Wire protocol for wirehub gateways.
//!
//! This crate provides:
//! - Opcode-tagged binary framing with a length prefix
//! - An incremental decoder over a byte buffer
//! - Framed connections over TCP with read/write deadlines

pub mod codec;
pub mod conn;
pub mod error;
pub mod frame;

pub use codec::Decoder;
pub use conn::{Connection, FrameReader, FrameWriter};
pub use error::ProtocolError;
pub use frame::{Frame, OpCode, FRAME_HEADER_SIZE};

/// Default maximum frame payload size (16 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Default port for a wirehub gateway.
pub const DEFAULT_PORT: u16 = 7618;
