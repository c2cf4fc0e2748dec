//! Turmoil-based Transport implementation using TCP streams.

use std::{io, net::SocketAddr};

use async_trait::async_trait;
use fast_core::Transport;
use turmoil::net::{TcpListener, TcpStream};

/// Simulation transport using Turmoil's deterministic TCP streams.
///
/// Turmoil controls delivery order and latency and can partition hosts, so
/// whole client/server exchanges replay identically from a seed.
pub struct SimTransport {
    listener: TcpListener,
}

impl SimTransport {
    /// Bind a listener inside the current simulated host, e.g.
    /// `"0.0.0.0:4857"`.
    pub async fn bind(address: &str) -> io::Result<Self> {
        Ok(Self { listener: TcpListener::bind(address).await? })
    }

    /// Open a stream to another simulated host, e.g. `"server:4857"`.
    pub async fn connect(address: &str) -> io::Result<TcpStream> {
        TcpStream::connect(address).await
    }
}

#[async_trait]
impl Transport for SimTransport {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        self.listener.accept().await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    #[test]
    fn accepted_stream_carries_bytes_both_ways() {
        let mut sim = turmoil::Builder::new().build();

        sim.host("server", || async {
            let transport = SimTransport::bind("0.0.0.0:4857").await?;
            let (mut stream, _peer) = transport.accept().await?;

            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await?;
            stream.write_all(&buf).await?;
            Ok(())
        });

        sim.client("client", async {
            let mut stream = SimTransport::connect("server:4857").await?;
            stream.write_all(b"FAST").await?;

            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).await?;
            assert_eq!(&buf, b"FAST");
            Ok(())
        });

        sim.run().unwrap();
    }
}
