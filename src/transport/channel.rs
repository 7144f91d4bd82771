//! Framed channel over the accepted peer connection.
//!
//! [`FramedChannel`] is the single resource bundle a session acquires when the
//! peer connects: a [`FramedRead`] over the read half, a [`FramedWrite`] over
//! the write half, and the peer address. The halves are split from one
//! [`TcpStream`], so the bundle is created in one step and torn down in one
//! step by [`FramedChannel::close`]; there is no state where only part of it
//! is held.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::debug;

use crate::transport::codec::FrameCodec;
use crate::{AppError, Result};

/// Accepted connection with length-prefixed framing in both directions.
#[derive(Debug)]
pub struct FramedChannel {
    reader: FramedRead<OwnedReadHalf, FrameCodec>,
    writer: FramedWrite<OwnedWriteHalf, FrameCodec>,
    peer_addr: SocketAddr,
}

impl FramedChannel {
    /// Wrap an accepted stream.
    ///
    /// `max_frame_bytes` bounds inbound frames; outbound frames are not limited.
    #[must_use]
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, max_frame_bytes: usize) -> Self {
        // Request/reply traffic is small and latency-bound.
        if let Err(err) = stream.set_nodelay(true) {
            debug!(%peer_addr, %err, "failed to set TCP_NODELAY");
        }

        let (read_half, write_half) = stream.into_split();
        Self {
            reader: FramedRead::new(read_half, FrameCodec::with_max_frame_bytes(max_frame_bytes)),
            writer: FramedWrite::new(write_half, FrameCodec::with_max_frame_bytes(max_frame_bytes)),
            peer_addr,
        }
    }

    /// Address the peer connected from.
    #[must_use]
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Frame and write one raw message, flushing before returning.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` if the peer has gone away or the write
    /// fails, or `AppError::Codec` if the message is too long to prefix.
    pub async fn write(&mut self, raw: &str) -> Result<()> {
        self.writer.send(raw).await.map_err(into_transport("write failed"))
    }

    /// Wait for the next complete frame and return its text.
    ///
    /// # Errors
    ///
    /// - `AppError::Transport("peer disconnected")` on end-of-stream between frames.
    /// - `AppError::Transport("stream closed mid-frame …")` on end-of-stream inside a frame.
    /// - `AppError::Transport(…)` for read failures and malformed frames.
    pub async fn read(&mut self) -> Result<String> {
        match self.reader.next().await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(err)) => Err(into_transport("read failed")(err)),
            None => Err(AppError::Transport("peer disconnected".into())),
        }
    }

    /// Release the bundle: the reader first, then the writer (sending FIN),
    /// which closes the underlying socket.
    pub async fn close(self) {
        let Self {
            reader,
            writer,
            peer_addr,
        } = self;

        drop(reader);

        let mut write_half = writer.into_inner();
        if let Err(err) = write_half.shutdown().await {
            debug!(%peer_addr, %err, "channel shutdown on already-closed socket");
        }
        drop(write_half);

        debug!(%peer_addr, "framed channel closed");
    }
}

/// Map I/O-level failures to transport errors, leaving other kinds intact.
fn into_transport(context: &'static str) -> impl Fn(AppError) -> AppError {
    move |err| match err {
        AppError::Io(msg) => AppError::Transport(format!("{context}: {msg}")),
        other => other,
    }
}
