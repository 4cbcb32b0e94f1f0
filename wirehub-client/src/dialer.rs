//! Pluggable outbound connection strategy.

use crate::error::ClientError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use wirehub_protocol::Connection;

/// One-shot dial parameters, consumed by [`Dialer::dial_and_handshake`] and
/// not retained after the call returns.
#[derive(Debug, Clone)]
pub struct DialerContext {
    /// Identity the client will present to the gateway.
    pub id: String,
    /// Human-readable client name.
    pub name: String,
    /// Address to dial.
    pub address: String,
    /// Bound on the dial plus handshake.
    pub timeout: Duration,
}

/// Establishes one outbound connection, handshake included.
///
/// Implementations own whatever negotiation the deployment requires and
/// return a framed connection ready for data frames.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial_and_handshake(&self, ctx: DialerContext) -> Result<Connection, ClientError>;
}

/// Plain TCP dialer with no application handshake.
#[derive(Debug, Default)]
pub struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial_and_handshake(&self, ctx: DialerContext) -> Result<Connection, ClientError> {
        tracing::debug!(address = %ctx.address, id = %ctx.id, "dialing");
        let stream = tokio::time::timeout(ctx.timeout, TcpStream::connect(&ctx.address))
            .await
            .map_err(|_| ClientError::ConnectTimeout)??;
        Ok(Connection::new(stream))
    }
}
