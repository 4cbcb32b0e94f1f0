//! Client error types.

use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] wirehub_protocol::ProtocolError),

    #[error("not connected")]
    NotConnected,

    #[error("already connected")]
    AlreadyConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("connect timed out")]
    ConnectTimeout,

    #[error("handshake failed: {0}")]
    Handshake(String),
}

impl ClientError {
    /// Returns whether reconnecting is worth attempting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Io(_)
                | ClientError::ConnectionClosed
                | ClientError::ConnectTimeout
                | ClientError::NotConnected
        )
    }
}
