// Length-prefixed message framing over a byte stream.
//
// Wire layout per frame: [len:4B big-endian][payload:lenB]. The prefix
// decouples message boundaries from TCP segmentation, so a frame arrives
// intact whether the peer's bytes come in one packet or twenty.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DhexWireError, Result};

/// Upper bound on a single frame. Handshake messages are a few kilobytes
/// at most, even with 2048-bit keys in decimal.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// One complete message per send/receive over any async byte stream.
#[derive(Debug)]
pub struct FramedStream<S> {
    io: S,
    max_frame_len: usize,
}

impl<S: AsyncRead + AsyncWrite + Unpin> FramedStream<S> {
    pub fn new(io: S) -> Self {
        Self::with_max_frame_len(io, MAX_FRAME_LEN)
    }

    pub fn with_max_frame_len(io: S, max_frame_len: usize) -> Self {
        Self { io, max_frame_len }
    }

    /// Write one frame: length prefix, then the payload, then flush.
    pub async fn send_frame(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_frame_len {
            return Err(DhexWireError::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame_len,
            });
        }
        let mut buf = BytesMut::with_capacity(4 + payload.len());
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(payload);
        self.io.write_all(&buf).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Read exactly one frame, blocking until it is complete. A closed
    /// stream mid-frame surfaces as a connection error.
    pub async fn recv_frame(&mut self) -> Result<Bytes> {
        let mut len_buf = [0u8; 4];
        self.io.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.max_frame_len {
            return Err(DhexWireError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        let mut payload = vec![0u8; len];
        self.io.read_exact(&mut payload).await?;
        Ok(Bytes::from(payload))
    }

    /// Shut down the write side, signalling end of session to the peer.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}
