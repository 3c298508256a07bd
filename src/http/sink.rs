//! Byte sinks the forwarding client streams into.
//!
//! A sink has no seek or undo: a chunk it accepted is gone to the caller.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use tokio::sync::mpsc;

/// Item type of the caller-facing response body.
pub type BodyChunk = Result<Bytes, io::Error>;

/// Append-only byte destination.
#[async_trait]
pub trait ResponseSink: Send {
    /// Hand a chunk to the destination. On error nothing of the chunk was accepted.
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()>;
}

#[async_trait]
impl ResponseSink for Vec<u8> {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.extend_from_slice(&chunk);
        Ok(())
    }
}

/// Sink feeding a live HTTP response body through a bounded channel.
///
/// The bound gives backpressure: a slow caller slows down the copy from the remote.
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<BodyChunk>,
}

impl ChannelSink {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<BodyChunk>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// Fail the caller's body stream, which makes the server drop the connection.
    pub async fn abort(self, error: io::Error) {
        let _ = self.tx.send(Err(error)).await;
    }
}

#[async_trait]
impl ResponseSink for ChannelSink {
    async fn write_chunk(&mut self, chunk: Bytes) -> io::Result<()> {
        self.tx
            .send(Ok(chunk))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "caller closed the response"))
    }
}
