//! Gateway client: one connection, framed send/read.

use crate::dialer::{Dialer, DialerContext, TcpDialer};
use crate::error::ClientError;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use wirehub_protocol::{Frame, FrameReader, FrameWriter, OpCode, ProtocolError};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Identity presented to the gateway.
    pub id: String,
    /// Human-readable client name.
    pub name: String,
    /// Bound on dial plus handshake.
    pub connect_timeout: Duration,
    /// Read deadline for [`Client::read`]; `None` blocks indefinitely.
    pub read_wait: Option<Duration>,
    /// Write deadline for [`Client::send`].
    pub write_wait: Duration,
}

impl ClientConfig {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            connect_timeout: Duration::from_secs(10),
            read_wait: None,
            write_wait: Duration::from_secs(10),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = d;
        self
    }

    pub fn with_read_wait(mut self, d: Duration) -> Self {
        self.read_wait = Some(d);
        self
    }

    pub fn with_write_wait(mut self, d: Duration) -> Self {
        self.write_wait = d;
        self
    }
}

/// A client holding one connection to a gateway.
///
/// The framing and deadline contracts mirror the server-side channel:
/// serialized writes, a single reader, Pings answered internally.
pub struct Client {
    config: ClientConfig,
    dialer: Box<dyn Dialer>,
    reader: Mutex<Option<FrameReader>>,
    writer: Mutex<Option<FrameWriter>>,
    connected: AtomicBool,
}

impl Client {
    /// Creates a client with the default plain TCP dialer.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            dialer: Box::new(TcpDialer),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Replaces the dialer. Set before [`connect`](Client::connect).
    pub fn with_dialer(mut self, dialer: Box<dyn Dialer>) -> Self {
        self.dialer = dialer;
        self
    }

    /// Returns the client identity.
    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Returns the client name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Returns whether the client holds a live connection.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Dials the gateway through the configured dialer.
    pub async fn connect(&self, address: &str) -> Result<(), ClientError> {
        if self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::AlreadyConnected);
        }

        let ctx = DialerContext {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            address: address.to_string(),
            timeout: self.config.connect_timeout,
        };
        let conn = self.dialer.dial_and_handshake(ctx).await?;

        let (reader, writer) = conn.split();
        *self.reader.lock().await = Some(reader);
        *self.writer.lock().await = Some(writer);
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!(id = %self.config.id, %address, "connected");
        Ok(())
    }

    /// Sends a Binary frame, bounded by the write deadline.
    pub async fn send(&self, payload: Bytes) -> Result<(), ClientError> {
        self.write(Frame::binary(payload)).await
    }

    /// Sends a Ping frame, for callers running their own heartbeat schedule.
    pub async fn ping(&self) -> Result<(), ClientError> {
        self.write(Frame::ping()).await
    }

    async fn write(&self, frame: Frame) -> Result<(), ClientError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ClientError::NotConnected)?;
        match writer.send(&frame, Some(self.config.write_wait)).await {
            Ok(()) => Ok(()),
            Err(e) => {
                if e.is_disconnect() {
                    self.connected.store(false, Ordering::SeqCst);
                }
                Err(e.into())
            }
        }
    }

    /// Reads the next frame.
    ///
    /// Pings are answered with Pongs and Pongs are swallowed; neither is
    /// returned. A Close frame marks the client disconnected and is returned
    /// to the caller. With a configured read wait the call fails with
    /// `ReadTimeout` once the deadline elapses.
    pub async fn read(&self) -> Result<Frame, ClientError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(ClientError::NotConnected);
        }

        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(ClientError::NotConnected)?;

        loop {
            let frame = match reader.read_frame(self.config.read_wait).await {
                Ok(frame) => frame,
                Err(ProtocolError::ConnectionClosed) => {
                    self.connected.store(false, Ordering::SeqCst);
                    return Err(ClientError::ConnectionClosed);
                }
                Err(e) => {
                    if e.is_disconnect() {
                        self.connected.store(false, Ordering::SeqCst);
                    }
                    return Err(e.into());
                }
            };

            match frame.opcode {
                OpCode::Ping => {
                    tracing::debug!(id = %self.config.id, "ping, answering pong");
                    // Best-effort; a failed pong will surface on the next read.
                    let mut writer = self.writer.lock().await;
                    if let Some(writer) = writer.as_mut() {
                        let _ = writer
                            .send(&Frame::pong(), Some(self.config.write_wait))
                            .await;
                    }
                }
                OpCode::Pong => {}
                OpCode::Close => {
                    tracing::debug!(id = %self.config.id, "server sent close");
                    self.connected.store(false, Ordering::SeqCst);
                    return Ok(frame);
                }
                _ => return Ok(frame),
            }
        }
    }

    /// Tears the connection down. Idempotent.
    pub async fn close(&self) {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            // Announce the close, then shut the write side down.
            let _ = writer
                .send(&Frame::close(), Some(self.config.write_wait))
                .await;
            let _ = writer.shutdown().await;
        }
        // A concurrent read() may hold the reader lock while blocked on the
        // socket; never wait for it. The read unblocks when the gateway
        // answers the Close frame or drops the connection.
        if let Ok(mut reader) = self.reader.try_lock() {
            let _ = reader.take();
        }
        tracing::debug!(id = %self.config.id, "closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use wirehub_protocol::Connection;

    async fn connected_pair() -> (Client, Connection) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = Client::new(ClientConfig::new("c1").with_name("test"));
        let addr_str = addr.to_string();
        let connect = client.connect(&addr_str);
        let accept = listener.accept();
        let (connect_result, accept_result) = tokio::join!(connect, accept);
        connect_result.unwrap();
        let (stream, _) = accept_result.unwrap();
        (client, Connection::new(stream))
    }

    #[tokio::test]
    async fn test_send_and_read() {
        let (client, mut server) = connected_pair().await;

        client.send(Bytes::from_static(b"hi")).await.unwrap();
        let frame = server.read_frame(Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(frame.opcode, OpCode::Binary);
        assert_eq!(frame.payload.as_ref(), b"hi");

        server.write_frame(&Frame::text(&b"ok"[..])).await.unwrap();
        server.flush().await.unwrap();
        let frame = client.read().await.unwrap();
        assert_eq!(frame.opcode, OpCode::Text);
        assert_eq!(frame.payload.as_ref(), b"ok");
    }

    #[tokio::test]
    async fn test_read_answers_ping() {
        let (client, mut server) = connected_pair().await;

        server.write_frame(&Frame::ping()).await.unwrap();
        server.write_frame(&Frame::text(&b"after"[..])).await.unwrap();
        server.flush().await.unwrap();

        // The ping is answered, not delivered
        let frame = client.read().await.unwrap();
        assert_eq!(frame.payload.as_ref(), b"after");

        let pong = server.read_frame(Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(pong.opcode, OpCode::Pong);
    }

    #[tokio::test]
    async fn test_send_write_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = Client::new(
            ClientConfig::new("c1").with_write_wait(Duration::from_millis(100)),
        );
        let addr_str = addr.to_string();
        let connect = client.connect(&addr_str);
        let accept = listener.accept();
        let (connect_result, accept_result) = tokio::join!(connect, accept);
        connect_result.unwrap();
        let (_server, _) = accept_result.unwrap();

        // The server end never reads; a payload well past the socket
        // buffers cannot complete within the write wait.
        let result = client.send(Bytes::from(vec![0u8; 8 * 1024 * 1024])).await;
        assert!(matches!(
            result,
            Err(ClientError::Protocol(ProtocolError::WriteTimeout))
        ));
    }

    #[tokio::test]
    async fn test_double_connect_rejected() {
        let (client, _server) = connected_pair().await;
        let result = client.connect("127.0.0.1:1").await;
        assert!(matches!(result, Err(ClientError::AlreadyConnected)));
    }

    #[tokio::test]
    async fn test_send_before_connect() {
        let client = Client::new(ClientConfig::new("c1"));
        let result = client.send(Bytes::from_static(b"x")).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_close_idempotent_and_announced() {
        let (client, mut server) = connected_pair().await;

        client.close().await;
        client.close().await;
        assert!(!client.is_connected());

        let frame = server.read_frame(Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(frame.opcode, OpCode::Close);
    }

    #[tokio::test]
    async fn test_close_returns_while_read_blocked() {
        let (client, mut server) = connected_pair().await;
        let client = std::sync::Arc::new(client);

        // Park a read (no read wait, the gateway says nothing)
        let reader = client.clone();
        let read_task = tokio::spawn(async move { reader.read().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        tokio::time::timeout(Duration::from_secs(1), client.close())
            .await
            .expect("close must not wait for the blocked read");
        assert!(!client.is_connected());

        // The blocked read unblocks once the peer goes away
        let frame = server.read_frame(Some(Duration::from_secs(1))).await.unwrap();
        assert_eq!(frame.opcode, OpCode::Close);
        drop(server);
        let _ = tokio::time::timeout(Duration::from_secs(1), read_task)
            .await
            .expect("read did not unblock after the peer closed");
    }

    #[tokio::test]
    async fn test_read_wait_expires() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = Client::new(
            ClientConfig::new("c1").with_read_wait(Duration::from_millis(50)),
        );
        let addr_str = addr.to_string();
        let connect = client.connect(&addr_str);
        let accept = listener.accept();
        let (connect_result, _accept) = tokio::join!(connect, accept);
        connect_result.unwrap();

        let result = client.read().await;
        assert!(matches!(
            result,
            Err(ClientError::Protocol(ProtocolError::ReadTimeout))
        ));
    }

    #[tokio::test]
    async fn test_read_after_peer_close() {
        let (client, server) = connected_pair().await;
        drop(server);

        let result = client.read().await;
        assert!(matches!(result, Err(ClientError::ConnectionClosed)));
        assert!(!client.is_connected());
    }
}
