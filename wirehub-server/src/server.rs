//! Gateway server: accept loop, handshake dispatch, channel registration,
//! push by identity, graceful shutdown.

use crate::channel::{Channel, DEFAULT_READ_WAIT, DEFAULT_WRITE_WAIT};
use crate::error::ServerError;
use crate::listener::{Acceptor, MessageListener, StateListener};
use crate::registry::{ChannelMap, DashChannelMap};
use bytes::Bytes;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};

/// Default bound on one acceptor handshake.
pub const DEFAULT_ACCEPT_WAIT: Duration = Duration::from_secs(10);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Read deadline applied to every channel; the heartbeat window.
    pub read_wait: Duration,
    /// Write deadline applied to every channel.
    pub write_wait: Duration,
    /// Bound on one acceptor handshake.
    pub accept_wait: Duration,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7618".parse().expect("valid default addr"),
            read_wait: DEFAULT_READ_WAIT,
            write_wait: DEFAULT_WRITE_WAIT,
            accept_wait: DEFAULT_ACCEPT_WAIT,
            max_connections: 10_000,
        }
    }
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            ..Default::default()
        }
    }

    pub fn with_read_wait(mut self, d: Duration) -> Self {
        self.read_wait = d;
        self
    }

    pub fn with_write_wait(mut self, d: Duration) -> Self {
        self.write_wait = d;
        self
    }

    pub fn with_accept_wait(mut self, d: Duration) -> Self {
        self.accept_wait = d;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }
}

/// Server statistics.
#[derive(Debug, Default)]
pub struct ServerStats {
    pub connections_total: AtomicU64,
    pub connections_active: AtomicU64,
    pub pushes_total: AtomicU64,
    pub errors_total: AtomicU64,
}

/// The gateway server.
///
/// Accepts sockets, delegates the handshake to the configured [`Acceptor`],
/// registers the resulting channels, and runs one read loop task per
/// channel. Collaborators are injected before [`start`](Server::start);
/// changing them afterwards is not supported.
///
/// Cloning is cheap and clones share all state; the accept loop and the
/// per-connection tasks each run on their own clone.
#[derive(Clone)]
pub struct Server {
    config: ServerConfig,
    acceptor: Arc<dyn Acceptor>,
    message_listener: Arc<dyn MessageListener>,
    state_listener: Option<Arc<dyn StateListener>>,
    channels: Arc<dyn ChannelMap>,
    stats: Arc<ServerStats>,
    shutdown_tx: broadcast::Sender<()>,
    /// Count of read loops in flight, watched by shutdown for draining.
    active_tx: Arc<watch::Sender<usize>>,
    running: Arc<AtomicBool>,
    local_addr: Arc<RwLock<Option<SocketAddr>>>,
}

impl Server {
    /// Creates a server with the default registry and no state listener.
    pub fn new(
        config: ServerConfig,
        acceptor: Arc<dyn Acceptor>,
        message_listener: Arc<dyn MessageListener>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (active_tx, _) = watch::channel(0usize);
        Self {
            config,
            acceptor,
            message_listener,
            state_listener: None,
            channels: Arc::new(DashChannelMap::new()),
            stats: Arc::new(ServerStats::default()),
            shutdown_tx,
            active_tx: Arc::new(active_tx),
            running: Arc::new(AtomicBool::new(false)),
            local_addr: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets the state listener notified on channel termination.
    pub fn with_state_listener(mut self, listener: Arc<dyn StateListener>) -> Self {
        self.state_listener = Some(listener);
        self
    }

    /// Replaces the channel registry.
    pub fn with_channel_map(mut self, channels: Arc<dyn ChannelMap>) -> Self {
        self.channels = channels;
        self
    }

    /// Binds the listening socket and spawns the accept loop.
    pub async fn start(&self) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyStarted);
        }

        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let addr = listener.local_addr()?;
        *self.local_addr.write() = Some(addr);
        tracing::info!("server listening on {}", addr);

        let server = self.clone();
        tokio::spawn(server.accept_loop(listener));
        Ok(())
    }

    async fn accept_loop(self, listener: TcpListener) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            if self.stats.connections_active.load(Ordering::Relaxed)
                                >= self.config.max_connections as u64
                            {
                                tracing::warn!("connection limit reached, rejecting {}", addr);
                                continue;
                            }

                            self.stats.connections_total.fetch_add(1, Ordering::Relaxed);
                            self.stats.connections_active.fetch_add(1, Ordering::Relaxed);

                            let server = self.clone();
                            tokio::spawn(async move {
                                server.handle_connection(stream, addr).await;
                                server
                                    .stats
                                    .connections_active
                                    .fetch_sub(1, Ordering::Relaxed);
                            });
                        }
                        Err(e) => {
                            tracing::error!("accept error: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("accept loop stopped");
                    break;
                }
            }
        }
    }

    /// One accepted socket: handshake, register, read loop, deregister.
    async fn handle_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let handshake = tokio::time::timeout(
            self.config.accept_wait,
            self.acceptor.accept(stream, addr),
        )
        .await;

        let (id, conn) = match handshake {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => {
                tracing::warn!("[{}] handshake failed: {}", addr, e);
                self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Err(_) => {
                tracing::warn!("[{}] handshake timed out", addr);
                self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let channel = Arc::new(Channel::new(id.clone(), conn));
        channel.set_read_wait(self.config.read_wait);
        channel.set_write_wait(self.config.write_wait);

        self.channels.add(channel.clone());
        if !self.running.load(Ordering::SeqCst) {
            // Lost the race with shutdown's close-all sweep.
            channel.close();
        }
        tracing::info!(id = %id, %addr, "channel connected");

        self.active_tx.send_modify(|n| *n += 1);

        let result = channel
            .clone()
            .readloop(self.message_listener.clone())
            .await;
        match &result {
            Ok(()) => tracing::info!(id = %id, "channel disconnected"),
            Err(e) if e.is_disconnect() => {
                tracing::info!(id = %id, "channel disconnected: {}", e);
            }
            Err(e) => {
                tracing::warn!(id = %id, "readloop failed: {}", e);
                self.stats.errors_total.fetch_add(1, Ordering::Relaxed);
            }
        }

        channel.close();
        self.channels.remove_if_same(&id, &channel);
        if let Some(listener) = &self.state_listener {
            listener.disconnect(&id);
        }

        self.active_tx.send_modify(|n| *n -= 1);
    }

    /// Pushes a payload to the channel with the given identity.
    ///
    /// Fails with `ChannelNotFound` for an unknown identity and propagates
    /// `ChannelClosed` if the channel died between lookup and push; neither
    /// affects any other channel.
    pub async fn push(&self, id: &str, payload: Bytes) -> Result<(), ServerError> {
        let channel = self
            .channels
            .get(id)
            .ok_or_else(|| ServerError::ChannelNotFound(id.to_string()))?;
        channel.push(payload).await?;
        self.stats.pushes_total.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Stops accepting, closes every channel, and waits for read loops to
    /// drain, bounded by `timeout`.
    ///
    /// On `ShutdownTimeout` the sockets have still been force-closed; only
    /// the drain confirmation is missing.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ServerError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("server shutting down");

        let _ = self.shutdown_tx.send(());
        for channel in self.channels.all() {
            channel.close();
        }

        let mut active = self.active_tx.subscribe();
        let result = match tokio::time::timeout(timeout, active.wait_for(|n| *n == 0)).await {
            Ok(_) => {
                tracing::info!("all channels drained");
                Ok(())
            }
            Err(_) => {
                tracing::warn!(
                    "shutdown deadline elapsed with {} read loops outstanding",
                    *self.active_tx.borrow()
                );
                Err(ServerError::ShutdownTimeout)
            }
        };
        result
    }

    /// Returns whether the server is accepting connections.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Returns the bound address once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.read()
    }

    /// Returns server statistics.
    pub fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// Returns the channel registry.
    pub fn channels(&self) -> &Arc<dyn ChannelMap> {
        &self.channels
    }
}
