//! Server error types.

use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] wirehub_protocol::ProtocolError),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("readloop already running for channel {0}")]
    ReadloopRunning(String),

    #[error("server already started")]
    AlreadyStarted,

    #[error("shutdown deadline elapsed before channels drained")]
    ShutdownTimeout,
}

impl ServerError {
    /// Returns true when the error only means the peer went away, as opposed
    /// to a fault worth surfacing loudly.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ServerError::Protocol(e) => e.is_disconnect() || e.is_timeout(),
            ServerError::Io(_) => true,
            ServerError::ChannelClosed(_) => true,
            _ => false,
        }
    }
}
