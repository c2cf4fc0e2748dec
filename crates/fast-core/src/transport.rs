//! Transport abstraction for accepting byte-stream connections.
//!
//! FAST runs over any reliable, ordered byte stream. Production accepts TCP
//! connections; tests accept turmoil's simulated TCP so whole networks can
//! run deterministically in one process.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Source of inbound connections
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Bidirectional byte stream for one connection.
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    /// Accept the next connection.
    ///
    /// Blocks until a peer connects and returns the stream and the peer's
    /// address.
    async fn accept(&self) -> io::Result<(Self::Stream, SocketAddr)>;

    /// Local address the transport is listening on
    fn local_addr(&self) -> io::Result<SocketAddr>;
}
