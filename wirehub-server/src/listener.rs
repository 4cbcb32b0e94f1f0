//! Collaborator traits: handshake, message delivery, state notification.

use crate::error::ServerError;
use async_trait::async_trait;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use wirehub_protocol::Connection;

/// Performs the handshake on a newly accepted socket.
///
/// Invoked once per accepted socket. The acceptor owns whatever negotiation
/// the deployment requires (protocol upgrade, authentication) and yields the
/// channel identity plus a ready framed connection, or fails the socket.
/// Failing one socket never stops the accept loop.
#[async_trait]
pub trait Acceptor: Send + Sync {
    async fn accept(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(String, Connection), ServerError>;
}

/// The minimal capability a message handler gets for replying: the channel
/// identity and a push that does not depend on the server or registry.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;

    async fn push(&self, payload: Bytes) -> Result<(), ServerError>;
}

/// Receives inbound data frames.
///
/// Called inline from the channel's read loop, so a slow listener stalls
/// that one channel's reads (intentional back-pressure) but never any other
/// channel.
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn receive(&self, agent: Arc<dyn Agent>, payload: Bytes);
}

/// Observes channel termination.
///
/// `disconnect` fires exactly once per channel lifetime, after the channel
/// has been removed from the registry.
pub trait StateListener: Send + Sync {
    fn disconnect(&self, id: &str);
}
