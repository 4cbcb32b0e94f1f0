//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while framing or reading/writing frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid opcode: {0:#04x}")]
    InvalidOpcode(u8),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("stream closed mid-frame")]
    ShortRead,

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("read timed out")]
    ReadTimeout,

    #[error("write timed out")]
    WriteTimeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns true for the errors that indicate the peer is gone rather
    /// than a malformed exchange.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            ProtocolError::ConnectionClosed | ProtocolError::ShortRead | ProtocolError::Io(_)
        )
    }

    /// Returns true when the error is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ProtocolError::ReadTimeout | ProtocolError::WriteTimeout
        )
    }
}
