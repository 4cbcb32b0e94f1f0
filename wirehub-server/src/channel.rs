//! Per-connection actor.
//!
//! A [`Channel`] owns one framed connection and one string identity. Its
//! read loop is the sole consumer of the socket's read side; pushes from any
//! number of tasks are serialized on the write side. The read deadline is
//! the sole heartbeat mechanism: a peer that stays silent longer than the
//! read wait is treated as dead.

use crate::error::ServerError;
use crate::listener::{Agent, MessageListener};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use wirehub_protocol::{Connection, Frame, FrameReader, FrameWriter, OpCode};

/// Default read wait: the peer must send something (a Ping suffices) within
/// this window or the channel is closed.
pub const DEFAULT_READ_WAIT: Duration = Duration::from_secs(3 * 60);

/// Default write wait for one push.
pub const DEFAULT_WRITE_WAIT: Duration = Duration::from_secs(10);

/// Channel lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChannelState {
    /// Read loop running, pushes accepted.
    Active = 0,
    /// Close frame exchanged, draining.
    Closing = 1,
    /// Terminal.
    Closed = 2,
}

impl ChannelState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ChannelState::Active,
            1 => ChannelState::Closing,
            _ => ChannelState::Closed,
        }
    }
}

/// A server-side per-connection actor with a stable identity.
pub struct Channel {
    id: String,
    /// Read half, taken exactly once by the read loop.
    reader: parking_lot::Mutex<Option<FrameReader>>,
    /// Write half; the async mutex serializes pushes and control replies.
    writer: Mutex<FrameWriter>,
    state: AtomicU8,
    read_wait: RwLock<Duration>,
    write_wait: RwLock<Duration>,
    /// Wakes a blocked read loop when the channel is closed locally.
    closed: Notify,
}

impl Channel {
    /// Wraps a negotiated connection under the given identity.
    pub fn new(id: impl Into<String>, conn: Connection) -> Self {
        let (reader, writer) = conn.split();
        Self {
            id: id.into(),
            reader: parking_lot::Mutex::new(Some(reader)),
            writer: Mutex::new(writer),
            state: AtomicU8::new(ChannelState::Active as u8),
            read_wait: RwLock::new(DEFAULT_READ_WAIT),
            write_wait: RwLock::new(DEFAULT_WRITE_WAIT),
            closed: Notify::new(),
        }
    }

    /// Returns the channel identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Reconfigures the read deadline; takes effect on the next read.
    pub fn set_read_wait(&self, d: Duration) {
        *self.read_wait.write() = d;
    }

    /// Reconfigures the write deadline; takes effect on the next write.
    pub fn set_write_wait(&self, d: Duration) {
        *self.write_wait.write() = d;
    }

    /// Closes the channel. Idempotent, callable from any task; a blocked
    /// read loop observes the closure promptly.
    pub fn close(&self) {
        let prev = self.state.swap(ChannelState::Closed as u8, Ordering::SeqCst);
        if prev != ChannelState::Closed as u8 {
            tracing::debug!(id = %self.id, "channel closed");
            // notify_one stores a permit, so a read loop that has not yet
            // reached its select still sees the closure.
            self.closed.notify_one();
        }
    }

    fn transition_closing(&self) {
        let _ = self.state.compare_exchange(
            ChannelState::Active as u8,
            ChannelState::Closing as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Writes one frame on the write side, bounded by the write wait.
    async fn write(&self, frame: Frame) -> Result<(), ServerError> {
        let write_wait = *self.write_wait.read();
        let mut writer = self.writer.lock().await;
        writer.send(&frame, Some(write_wait)).await?;
        Ok(())
    }

    /// Pushes a Binary frame to the peer.
    ///
    /// Safe to call concurrently with the read loop and with other pushes.
    /// Fails with `ChannelClosed` unless the channel is Active; a failed
    /// write closes the channel.
    pub async fn push(&self, payload: Bytes) -> Result<(), ServerError> {
        if self.state() != ChannelState::Active {
            return Err(ServerError::ChannelClosed(self.id.clone()));
        }
        match self.write(Frame::binary(payload)).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // The socket is no good anymore; let the read loop unwind.
                self.close();
                Err(e)
            }
        }
    }

    /// Runs the read loop until the channel terminates.
    ///
    /// The sole consumer of the read side; at most one call per channel
    /// lifetime. Pings are answered with Pongs and not delivered; a peer
    /// Close is acknowledged and ends the loop cleanly; Text and Binary
    /// payloads are handed to the listener inline, in wire order. Any read
    /// error or deadline expiry closes the channel and is returned to the
    /// caller, which owns registry removal and disconnect notification.
    pub async fn readloop(
        self: Arc<Self>,
        listener: Arc<dyn MessageListener>,
    ) -> Result<(), ServerError> {
        let mut reader = self
            .reader
            .lock()
            .take()
            .ok_or_else(|| ServerError::ReadloopRunning(self.id.clone()))?;

        loop {
            let read_wait = *self.read_wait.read();

            let result = tokio::select! {
                res = reader.read_frame(Some(read_wait)) => res,
                _ = self.closed.notified() => {
                    tracing::debug!(id = %self.id, "readloop exiting on local close");
                    return Ok(());
                }
            };

            let frame = match result {
                Ok(frame) => frame,
                Err(e) => {
                    self.close();
                    return Err(e.into());
                }
            };

            match frame.opcode {
                OpCode::Ping => {
                    tracing::debug!(id = %self.id, "ping, answering pong");
                    if let Err(e) = self.write(Frame::pong()).await {
                        self.close();
                        return Err(e);
                    }
                }
                OpCode::Pong => {}
                OpCode::Close => {
                    tracing::debug!(id = %self.id, "peer sent close");
                    self.transition_closing();
                    // Best-effort acknowledgement; the peer may already be gone.
                    let _ = self.write(Frame::close()).await;
                    self.close();
                    return Ok(());
                }
                OpCode::Text | OpCode::Binary => {
                    let agent: Arc<dyn Agent> = Arc::<Channel>::clone(&self);
                    listener.receive(agent, frame.payload).await;
                }
                OpCode::Continuation => {
                    tracing::debug!(id = %self.id, "skipping continuation frame");
                }
            }
        }
    }
}

#[async_trait]
impl Agent for Channel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn push(&self, payload: Bytes) -> Result<(), ServerError> {
        Channel::push(self, payload).await
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
