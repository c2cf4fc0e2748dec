//! FAST server: accept loop and per-connection pipeline wiring.
//!
//! One [`Server`] owns the routing [`Registry`] and the pluggable policies.
//! Every accepted stream gets its own channel, its own reliability ledger
//! and a freshly wired pipeline; the registry is the only state shared
//! between connections.

use std::{future::Future, io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use fast_core::{
    Channel, Environment, Outbound, Pipeline, Registry, Role, Session, Transport,
    capabilities::{
        AcceptAnyAddress, AddressVerifier, AddressWhitelist, Authenticator, AutomaticAuthenticator,
        PacketListener, RandomSessionFactory, SessionFactory,
    },
    reactors::{
        AddressFilter, CredentialAuthenticator, DetachOnException, EventLog, FlushOnFetch, PacketDelivery,
        PacketObserver, ReliableDelivery, RouteAttachment, SessionCreator,
    },
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    sync::{mpsc, watch},
};
use tracing::{debug, info, warn};

use crate::{config::ServerConfig, connection};

/// FAST server
pub struct Server<E> {
    config: ServerConfig,
    env: E,
    registry: Arc<Registry>,
    verifier: Arc<dyn AddressVerifier>,
    authenticator: Arc<dyn Authenticator>,
    sessions: Arc<dyn SessionFactory>,
    packets: Option<Arc<dyn PacketListener>>,
    shutdown: watch::Sender<bool>,
}

impl<E: Environment> Server<E> {
    /// Server with the default policies: the configured realm whitelist
    /// (or any address), automatic registration and random session ids.
    pub fn new(config: ServerConfig, env: E) -> Self {
        let verifier: Arc<dyn AddressVerifier> = if config.realms.is_empty() {
            Arc::new(AcceptAnyAddress)
        } else {
            Arc::new(AddressWhitelist::new(config.realms.iter().cloned()))
        };
        let (shutdown, _) = watch::channel(false);

        Self {
            verifier,
            authenticator: Arc::new(AutomaticAuthenticator::new()),
            sessions: Arc::new(RandomSessionFactory::new(env.clone())),
            packets: None,
            registry: Arc::new(Registry::new()),
            config,
            env,
            shutdown,
        }
    }

    /// Replace the address verifier
    #[must_use]
    pub fn with_address_verifier(mut self, verifier: Arc<dyn AddressVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Replace the authenticator
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Replace the session id factory
    #[must_use]
    pub fn with_session_factory(mut self, sessions: Arc<dyn SessionFactory>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Observe every packet sent or received on any connection
    #[must_use]
    pub fn with_packet_listener(mut self, listener: Arc<dyn PacketListener>) -> Self {
        self.packets = Some(listener);
        self
    }

    /// Configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Routing state shared by all connections
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Pipeline for one new connection.
    pub fn pipeline(&self) -> Pipeline {
        let mut pipeline = Pipeline::new().with(EventLog).with(DetachOnException).with(ReliableDelivery::new());
        if let Some(listener) = &self.packets {
            pipeline = pipeline.with(PacketObserver::new(listener.clone()));
        }
        pipeline
            .with(AddressFilter::new(self.verifier.clone()))
            .with(SessionCreator::new(self.sessions.clone()))
            .with(CredentialAuthenticator::new(self.authenticator.clone()))
            .with(PacketDelivery::new(self.registry.clone()))
            .with(FlushOnFetch::new(self.registry.clone()))
            .with(RouteAttachment::new(self.registry.clone()))
    }

    /// Responder channel wired with [`Self::pipeline`]
    pub fn open_channel(&self) -> (Channel, mpsc::UnboundedReceiver<Outbound>) {
        let session = Session::new(Role::Responder, self.env.now(), self.config.session.clone());
        Channel::new(session, self.pipeline())
    }

    /// Serve one connection to completion.
    pub async fn serve<S>(&self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (channel, outbound) = self.open_channel();
        let shutdown = self.shutdown.subscribe();
        connection::drive(stream, channel, outbound, self.env.clone(), stopped(shutdown)).await;
    }

    /// Ask every connection and the accept loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Accept connections until [`Self::shutdown`] is called or `stop`
    /// resolves, spawning one task per connection.
    pub async fn run<T>(self: Arc<Self>, transport: T, stop: impl Future<Output = ()>) -> io::Result<()>
    where
        T: Transport,
    {
        info!(address = %transport.local_addr()?, "server listening");
        let shutdown = stopped(self.shutdown.subscribe());
        tokio::pin!(stop, shutdown);

        loop {
            tokio::select! {
                () = &mut stop => break,
                () = &mut shutdown => break,
                accepted = transport.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(%peer, "accepted connection");
                        let server = Arc::clone(&self);
                        tokio::spawn(async move { server.serve(stream).await });
                    },
                    Err(err) => warn!(%err, "accept failed"),
                },
            }
        }

        info!("server stopping");
        self.shutdown();
        Ok(())
    }
}

async fn stopped(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Plain TCP listener
#[derive(Debug)]
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Listen on `address`
    pub async fn bind(address: SocketAddr) -> io::Result<Self> {
        Ok(Self { listener: TcpListener::bind(address).await? })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok((stream, peer))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}
