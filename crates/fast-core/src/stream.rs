//! Framing over async byte streams.
//!
//! [`FrameReader`] accumulates bytes and decodes frames with the slice
//! codec from `fast-proto`, so the wire layout is defined in one place.
//! While a frame is partial only its length fields are re-read; the frame
//! is decoded once, when all of it is buffered. A frame declaring more than
//! [`fast_proto::MAX_FRAME_SIZE`] bytes fails before its body is read.
//! The bytes of an AUTHENTICATE frame are wiped once decoded or written.
//! [`write_loop`] drains a channel's outbound queue into the write half.
//!
//! Both are cancel-safe at frame boundaries: a `read_frame` future dropped
//! mid-read keeps the bytes it already received in the reader's buffer.

use bytes::{Buf, BytesMut};
use fast_proto::{Command, ConnectionHeader, Frame, ProtocolError};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    sync::mpsc,
};
use tracing::{debug, trace};
use zeroize::Zeroize;

use crate::{
    channel::{Channel, Outbound},
    error::{FastError, ReadError},
};

const INITIAL_CAPACITY: usize = 4 * 1024;

/// Most buffer growth reserved ahead of one read
const MAX_RESERVE: usize = 64 * 1024;

/// Buffered frame decoder over the read half of a connection
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buffer: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a read half
    pub fn new(inner: R) -> Self {
        Self { inner, buffer: BytesMut::with_capacity(INITIAL_CAPACITY) }
    }

    /// Bytes received but not yet decoded
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Read and validate the connection header.
    ///
    /// Nothing past the header is interpreted if it is invalid.
    pub async fn read_header(&mut self) -> Result<(), ReadError> {
        loop {
            let parsed = ConnectionHeader::from_bytes(&self.buffer).map(|_| ());
            match parsed {
                Ok(()) => {
                    self.buffer.advance(ConnectionHeader::SIZE);
                    return Ok(());
                },
                Err(err) if err.is_incomplete() => {
                    if !self.fill(&err).await? {
                        return Err(self.eof_error());
                    }
                },
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, ReadError> {
        loop {
            let incomplete = if self.buffer.is_empty() {
                ProtocolError::Incomplete { needed: 1 }
            } else {
                match Frame::decode(&self.buffer) {
                    Ok((frame, used)) => {
                        if matches!(frame, Frame::Authenticate(_)) {
                            self.buffer[..used].zeroize();
                        }
                        self.buffer.advance(used);
                        trace!(command = ?frame.command(), used, "decoded frame");
                        return Ok(Some(frame));
                    },
                    Err(err) if err.is_incomplete() => err,
                    Err(err) => return Err(err.into()),
                }
            };

            if !self.fill(&incomplete).await? {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(self.eof_error());
            }
        }
    }

    /// Read more bytes. Returns `false` at end of stream.
    async fn fill(&mut self, incomplete: &ProtocolError) -> Result<bool, ReadError> {
        if let ProtocolError::Incomplete { needed } = incomplete {
            self.buffer.reserve((*needed).min(MAX_RESERVE));
        }
        Ok(self.inner.read_buf(&mut self.buffer).await? > 0)
    }

    fn eof_error(&self) -> ReadError {
        if self.buffer.is_empty() {
            ReadError::UnexpectedEof
        } else {
            ReadError::Truncated { buffered: self.buffer.len() }
        }
    }
}

/// Write queued frames until the channel closes.
///
/// Every frame is flushed as soon as it is written, and an AUTHENTICATE
/// frame is wiped once written. A write failure is raised on the channel,
/// which closes it.
pub async fn write_loop<W>(mut writer: W, mut outbound: mpsc::UnboundedReceiver<Outbound>, channel: Channel)
where
    W: AsyncWrite + Unpin,
{
    while let Some(item) = outbound.recv().await {
        match item {
            Outbound::Frame(bytes) => {
                let result = async {
                    writer.write_all(&bytes).await?;
                    writer.flush().await
                }
                .await;
                if bytes.first() == Some(&Command::Authenticate.to_u8()) {
                    if let Ok(mut written) = bytes.try_into_mut() {
                        written[..].zeroize();
                    }
                }
                if let Err(err) = result {
                    debug!(channel = %channel.id(), %err, "write failed");
                    channel.raise(FastError::Write(err.to_string()));
                    channel.close();
                    break;
                }
            },
            Outbound::Close => {
                let _ = writer.shutdown().await;
                break;
            },
        }
    }
    trace!(channel = %channel.id(), "writer stopped");
}
