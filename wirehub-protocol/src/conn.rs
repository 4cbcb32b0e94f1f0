//! Framed connections over TCP.
//!
//! A [`Connection`] wraps one TCP stream and exchanges [`Frame`]s over it.
//! It can be split into a [`FrameReader`] and a [`FrameWriter`] so the read
//! loop and concurrent writers each own their side of the socket exclusively.
//! Neither half serializes concurrent access by itself; the owner does.

use crate::codec::Decoder;
use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::DEFAULT_MAX_PAYLOAD;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::trace;

/// Socket read buffer size (8 KiB).
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// The read side of a framed connection.
pub struct FrameReader {
    io: OwnedReadHalf,
    decoder: Decoder,
    buf: Vec<u8>,
}

impl FrameReader {
    /// Reads the next frame, bounded by `deadline` if one is given.
    ///
    /// Fails with `ReadTimeout` when the deadline elapses before a complete
    /// frame arrives, `ConnectionClosed` on a clean EOF between frames, and
    /// `ShortRead` when the stream closes mid-frame.
    pub async fn read_frame(&mut self, deadline: Option<Duration>) -> Result<Frame, ProtocolError> {
        match deadline {
            Some(d) => tokio::time::timeout(d, self.read_frame_inner())
                .await
                .map_err(|_| ProtocolError::ReadTimeout)?,
            None => self.read_frame_inner().await,
        }
    }

    async fn read_frame_inner(&mut self) -> Result<Frame, ProtocolError> {
        loop {
            if let Some(frame) = self.decoder.decode_frame()? {
                trace!(opcode = ?frame.opcode, len = frame.payload.len(), "frame in");
                return Ok(frame);
            }

            let n = self.io.read(&mut self.buf).await?;
            if n == 0 {
                return if self.decoder.buffered() > 0 {
                    Err(ProtocolError::ShortRead)
                } else {
                    Err(ProtocolError::ConnectionClosed)
                };
            }
            self.decoder.extend(&self.buf[..n]);
        }
    }
}

/// The write side of a framed connection.
pub struct FrameWriter {
    io: BufWriter<OwnedWriteHalf>,
    max_payload: usize,
}

impl FrameWriter {
    /// Encodes and writes one frame. Does not flush.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        let encoded = frame.encode_with_max(self.max_payload)?;
        self.io.write_all(&encoded).await?;
        trace!(opcode = ?frame.opcode, len = frame.payload.len(), "frame out");
        Ok(())
    }

    /// Forces buffered bytes onto the wire.
    pub async fn flush(&mut self) -> Result<(), ProtocolError> {
        self.io.flush().await?;
        Ok(())
    }

    /// Writes one frame and flushes, bounded by `deadline` if one is given.
    pub async fn send(
        &mut self,
        frame: &Frame,
        deadline: Option<Duration>,
    ) -> Result<(), ProtocolError> {
        match deadline {
            Some(d) => tokio::time::timeout(d, self.send_inner(frame))
                .await
                .map_err(|_| ProtocolError::WriteTimeout)?,
            None => self.send_inner(frame).await,
        }
    }

    async fn send_inner(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        self.write_frame(frame).await?;
        self.flush().await
    }

    /// Shuts down the write direction of the socket.
    pub async fn shutdown(&mut self) -> Result<(), ProtocolError> {
        self.io.shutdown().await?;
        Ok(())
    }
}

/// A framed duplex connection over one TCP stream.
pub struct Connection {
    reader: FrameReader,
    writer: FrameWriter,
}

impl Connection {
    /// Wraps a TCP stream with the default payload limit.
    pub fn new(stream: TcpStream) -> Self {
        Self::with_max_payload(stream, DEFAULT_MAX_PAYLOAD)
    }

    /// Wraps a TCP stream, rejecting frames above `max_payload`.
    pub fn with_max_payload(stream: TcpStream, max_payload: usize) -> Self {
        stream.set_nodelay(true).ok();
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: FrameReader {
                io: read_half,
                decoder: Decoder::new().with_max_payload(max_payload),
                buf: vec![0u8; READ_BUFFER_SIZE],
            },
            writer: FrameWriter {
                io: BufWriter::new(write_half),
                max_payload,
            },
        }
    }

    /// Reads the next frame. See [`FrameReader::read_frame`].
    pub async fn read_frame(&mut self, deadline: Option<Duration>) -> Result<Frame, ProtocolError> {
        self.reader.read_frame(deadline).await
    }

    /// Encodes and writes one frame. Does not flush.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), ProtocolError> {
        self.writer.write_frame(frame).await
    }

    /// Forces buffered bytes onto the wire.
    pub async fn flush(&mut self) -> Result<(), ProtocolError> {
        self.writer.flush().await
    }

    /// Splits into independently owned read and write halves.
    pub fn split(self) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }
}
